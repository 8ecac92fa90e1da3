//! Port declaration during filter setup.

use super::{FieldHandle, FieldTarget, InputKind, InputPort, OutputPort, ProgramTarget};
use crate::error::{Error, Result};
use crate::format::FrameFormat;
use crate::gpu::ShaderProgram;
use crate::value::FieldValue;

/// The ports of one filter, in declaration order.
///
/// Passed to [`Filter::setup_ports`](crate::filter::Filter::setup_ports);
/// afterwards owned by the filter's node.
#[derive(Debug)]
pub struct PortSet {
    filter: String,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
}

impl PortSet {
    /// Create an empty set for `filter`.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Name of the owning filter.
    pub fn filter_name(&self) -> &str {
        &self.filter
    }

    fn duplicate(&self, direction: &str, name: &str) -> Error {
        Error::InvalidState(format!(
            "filter '{}' already has an {direction} port named '{name}'",
            self.filter
        ))
    }

    fn check_input_free(&self, name: &str) -> Result<()> {
        match self.input(name) {
            Some(_) => Err(self.duplicate("input", name)),
            None => Ok(()),
        }
    }

    fn check_output_free(&self, name: &str) -> Result<()> {
        match self.output(name) {
            Some(_) => Err(self.duplicate("output", name)),
            None => Ok(()),
        }
    }

    /// Declare a stream input accepting frames matching `format`.
    pub fn add_input(&mut self, name: &str, format: FrameFormat) -> Result<InputPort> {
        self.check_input_free(name)?;
        let port = InputPort::stream(&self.filter, name, format);
        self.inputs.push(port.clone());
        Ok(port)
    }

    /// Declare an output emitting `format`.
    pub fn add_output(&mut self, name: &str, format: FrameFormat) -> Result<OutputPort> {
        self.check_output_free(name)?;
        let port = OutputPort::new(&self.filter, name, format);
        self.outputs.push(port.clone());
        Ok(port)
    }

    /// Declare an output whose format is inferred from `input`'s upstream
    /// format by [`Filter::output_format`](crate::filter::Filter::output_format).
    pub fn add_output_based_on_input(&mut self, name: &str, input: &str) -> Result<OutputPort> {
        self.check_output_free(name)?;
        if self.input(input).is_none() {
            return Err(Error::unknown_input(&self.filter, input));
        }
        let port = OutputPort::with_base(
            &self.filter,
            name,
            FrameFormat::unspecified(),
            Some(input.to_string()),
        );
        self.outputs.push(port.clone());
        Ok(port)
    }

    /// Declare a field port with a default value.
    ///
    /// The returned handle is the filter's view of the parameter; values
    /// pushed to the port land in it at the next transfer (or immediately for
    /// final ports).
    pub fn declare_field_port<T: FieldValue>(
        &mut self,
        name: &str,
        default: T,
        is_final: bool,
    ) -> Result<FieldHandle<T>> {
        self.declare_field(name, FieldHandle::new(default), true, is_final)
    }

    /// Declare a field port that must be assigned before the filter can run.
    pub fn declare_required_field_port<T: FieldValue + Default>(
        &mut self,
        name: &str,
        is_final: bool,
    ) -> Result<FieldHandle<T>> {
        self.declare_field(name, FieldHandle::default(), false, is_final)
    }

    /// Bind an existing handle to a new field port.
    ///
    /// With `has_default` the handle's current value counts as assigned.
    pub fn bind_field_port<T: FieldValue>(
        &mut self,
        name: &str,
        handle: &FieldHandle<T>,
        has_default: bool,
        is_final: bool,
    ) -> Result<()> {
        self.declare_field(name, handle.clone(), has_default, is_final)
            .map(drop)
    }

    fn declare_field<T: FieldValue>(
        &mut self,
        name: &str,
        handle: FieldHandle<T>,
        has_default: bool,
        is_final: bool,
    ) -> Result<FieldHandle<T>> {
        self.check_input_free(name)?;
        let kind = if is_final {
            InputKind::Final
        } else {
            InputKind::Field
        };
        let target = FieldTarget {
            name: name.to_string(),
            handle: handle.clone(),
        };
        self.inputs.push(InputPort::value_bound(
            &self.filter,
            name,
            kind,
            Box::new(target),
            has_default,
        ));
        Ok(handle)
    }

    /// Declare a port bound to a shader program host variable.
    pub fn declare_program_port(
        &mut self,
        name: &str,
        program: &ShaderProgram,
        variable: &str,
        has_default: bool,
    ) -> Result<InputPort> {
        self.check_input_free(name)?;
        let target = ProgramTarget {
            program: program.clone(),
            variable: variable.to_string(),
        };
        let port = InputPort::value_bound(
            &self.filter,
            name,
            InputKind::Program,
            Box::new(target),
            has_default,
        );
        self.inputs.push(port.clone());
        Ok(port)
    }

    /// Set whether input `name` requires a frame to be ready.
    pub fn set_input_blocking(&mut self, name: &str, blocking: bool) -> Result<()> {
        self.input(name)
            .ok_or_else(|| Error::unknown_input(&self.filter, name))?
            .set_blocking(blocking);
        Ok(())
    }

    /// Set whether output `name` requires downstream room to be ready.
    pub fn set_output_blocking(&mut self, name: &str, blocking: bool) -> Result<()> {
        self.output(name)
            .ok_or_else(|| Error::unknown_output(&self.filter, name))?
            .set_blocking(blocking);
        Ok(())
    }

    /// Look up an input port.
    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    /// Look up an output port.
    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    /// Input ports in declaration order.
    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    /// Output ports in declaration order.
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_duplicate_port_names_rejected() {
        let mut ports = PortSet::new("f");
        ports.add_input("frame", FrameFormat::unspecified()).unwrap();
        ports.add_output("frame", FrameFormat::unspecified()).unwrap();
        assert!(matches!(
            ports.add_output("frame", FrameFormat::unspecified()),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            ports.declare_field_port("frame", 1i64, false),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            ports.set_input_blocking("missing", false),
            Err(Error::UnknownPort { .. })
        ));
    }

    #[test]
    fn test_output_based_on_unknown_input() {
        let mut ports = PortSet::new("f");
        assert!(matches!(
            ports.add_output_based_on_input("out", "missing"),
            Err(Error::UnknownPort { .. })
        ));
        ports.add_input("in", FrameFormat::unspecified()).unwrap();
        let out = ports.add_output_based_on_input("out", "in").unwrap();
        assert_eq!(out.base_input().as_deref(), Some("in"));
    }

    #[test]
    fn test_field_defaults_make_port_ready() {
        let mut ports = PortSet::new("f");
        let gain = ports.declare_field_port("gain", 2.0f32, false).unwrap();
        let size = ports.declare_required_field_port::<i64>("size", true).unwrap();
        assert_eq!(gain.get(), 2.0);
        assert!(ports.input("gain").unwrap().is_ready());
        assert!(!ports.input("size").unwrap().is_ready());
        assert_eq!(ports.input("size").unwrap().kind(), InputKind::Final);
        assert_eq!(size.get(), 0);
    }

    #[test]
    fn test_program_port_sets_host_variable() {
        let program = ShaderProgram::new("blend");
        let mut ports = PortSet::new("f");
        let port = ports
            .declare_program_port("alpha", &program, "u_alpha", false)
            .unwrap();
        port.open();
        port.push_value(Value::Float(0.5)).unwrap();
        assert!(!program.has_host_value("u_alpha"));
        assert!(port.transfer().unwrap());
        assert_eq!(program.host_value("u_alpha"), Some(Value::Float(0.5)));
    }
}
