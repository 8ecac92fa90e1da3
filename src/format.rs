//! Frame format descriptions and compatibility checks.
//!
//! A [`FrameFormat`] describes what a frame holds: its element type, bytes per
//! element, target backing store, dimensions, and optional object-class and
//! metadata constraints. The same type is used both for concrete frame formats
//! and for port masks, where unspecified fields act as wildcards.
//!
//! # Compatibility
//!
//! - [`FrameFormat::is_compatible_with`] is strict and one-directional: the
//!   candidate must satisfy every field the required format sets.
//! - [`FrameFormat::may_be_compatible_with`] is the relaxed check used for
//!   dynamic type checking: a field only conflicts when *both* sides specify it.
//!
//! ```rust
//! use framegraph::format::{BaseType, FrameFormat, FrameTarget};
//!
//! let required = FrameFormat::new(BaseType::Float, FrameTarget::Unspecified);
//! let candidate = FrameFormat::new(BaseType::Float, FrameTarget::Simple).with_dimensions(&[4, 4]);
//!
//! assert!(candidate.is_compatible_with(&required));
//! assert!(!required.is_compatible_with(&candidate));
//! assert!(required.may_be_compatible_with(&candidate));
//! ```

use crate::error::{Error, Result};
use crate::value::{Bitmap, MetadataValue, ObjectClass, Value};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// Dimension value meaning "any size" inside a mask.
pub const SIZE_UNSPECIFIED: usize = 0;

/// Bytes-per-sample value that never constrains a mask.
pub const BYTES_PER_SAMPLE_UNSPECIFIED: usize = 1;

/// Dimension storage; most formats have at most four dimensions.
pub type Dimensions = SmallVec<[usize; 4]>;

/// Element type of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaseType {
    /// No constraint.
    #[default]
    Unspecified,
    /// Single bits, stored one per byte.
    Bit,
    /// Unsigned bytes.
    Byte,
    /// 16-bit integers.
    Int16,
    /// 32-bit integers.
    Int32,
    /// 32-bit floats.
    Float,
    /// 64-bit floats.
    Double,
    /// Opaque pointers.
    Pointer,
    /// Arbitrary object values.
    Object,
}

impl BaseType {
    /// Default bytes per sample for the type.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            BaseType::Bit | BaseType::Byte => 1,
            BaseType::Int16 => 2,
            BaseType::Int32 | BaseType::Float | BaseType::Pointer => 4,
            BaseType::Double => 8,
            BaseType::Unspecified | BaseType::Object => BYTES_PER_SAMPLE_UNSPECIFIED,
        }
    }
}

/// Backing store a frame lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameTarget {
    /// No constraint.
    #[default]
    Unspecified,
    /// Plain host memory owned by the frame.
    Simple,
    /// Fixed-capacity off-heap buffer.
    Native,
    /// GPU texture and/or framebuffer.
    Gpu,
    /// GPU vertex buffer (write + draw only).
    VertexBuffer,
}

impl fmt::Display for FrameTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameTarget::Unspecified => "unspecified",
            FrameTarget::Simple => "simple",
            FrameTarget::Native => "native",
            FrameTarget::Gpu => "gpu",
            FrameTarget::VertexBuffer => "vertex",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FrameTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unspecified" => Ok(FrameTarget::Unspecified),
            "simple" => Ok(FrameTarget::Simple),
            "native" => Ok(FrameTarget::Native),
            "gpu" => Ok(FrameTarget::Gpu),
            "vertex" | "vertex_buffer" => Ok(FrameTarget::VertexBuffer),
            other => Err(Error::UnsupportedValue(format!(
                "unknown frame target '{other}'"
            ))),
        }
    }
}

/// An immutable frame format.
///
/// Cloning is deep: dimensions and metadata are copied. The byte size is
/// computed once on construction.
#[derive(Clone, PartialEq)]
pub struct FrameFormat {
    base_type: BaseType,
    bytes_per_sample: usize,
    target: FrameTarget,
    dimensions: Option<Dimensions>,
    object_class: Option<ObjectClass>,
    metadata: Option<BTreeMap<String, MetadataValue>>,
    // None when the byte size overflows usize.
    size: Option<usize>,
}

impl FrameFormat {
    /// Create a format with the type's default bytes per sample.
    pub fn new(base_type: BaseType, target: FrameTarget) -> Self {
        Self {
            base_type,
            bytes_per_sample: base_type.bytes_per_sample(),
            target,
            dimensions: None,
            object_class: None,
            metadata: None,
            size: Some(0),
        }
    }

    /// A format with every field unspecified; accepts anything as a mask.
    pub fn unspecified() -> Self {
        Self::new(BaseType::Unspecified, FrameTarget::Unspecified)
    }

    /// Format of an object-typed frame with the given class.
    pub fn object<T: std::any::Any>(target: FrameTarget) -> Self {
        let mut format = Self::new(BaseType::Object, target);
        format.object_class = Some(ObjectClass::of::<T>());
        format
    }

    /// Format of an RGBA8 image of the given size.
    pub fn image(width: usize, height: usize, target: FrameTarget) -> Self {
        Self::new(BaseType::Byte, target)
            .with_bytes_per_sample(Bitmap::BYTES_PER_PIXEL)
            .with_dimensions(&[width, height])
    }

    /// Derive a format describing `value`.
    ///
    /// Arrays get one dimension equal to their length, bitmaps get
    /// `[width, height]` with 4 bytes per sample, and everything else is an
    /// object format carrying the value's class.
    pub fn for_value(value: &Value, target: FrameTarget) -> Self {
        let mut format = match value {
            Value::Ints(v) => Self::new(BaseType::Int32, target).with_dimensions(&[v.len()]),
            Value::Floats(v) => Self::new(BaseType::Float, target).with_dimensions(&[v.len()]),
            Value::Bytes(v) => Self::new(BaseType::Byte, target).with_dimensions(&[v.len()]),
            Value::Bitmap(b) => return Self::image(b.width, b.height, target),
            _ => Self::new(BaseType::Object, target),
        };
        format.object_class = Some(value.object_class());
        format
    }

    /// Builder: set dimensions.
    pub fn with_dimensions(mut self, dims: &[usize]) -> Self {
        self.dimensions = Some(dims.iter().copied().collect());
        self.size = Self::calc_size(self.bytes_per_sample, self.dimensions.as_deref());
        self
    }

    /// Builder: set bytes per sample.
    pub fn with_bytes_per_sample(mut self, bytes: usize) -> Self {
        self.bytes_per_sample = bytes;
        self.size = Self::calc_size(self.bytes_per_sample, self.dimensions.as_deref());
        self
    }

    /// Builder: set the target store.
    pub fn with_target(mut self, target: FrameTarget) -> Self {
        self.target = target;
        self
    }

    /// Builder: set the object class.
    pub fn with_object_class(mut self, class: ObjectClass) -> Self {
        self.object_class = Some(class);
        self
    }

    /// Builder: add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    fn calc_size(bytes_per_sample: usize, dims: Option<&[usize]>) -> Option<usize> {
        match dims {
            Some(dims) if !dims.is_empty() => dims
                .iter()
                .try_fold(bytes_per_sample, |acc, &d| acc.checked_mul(d)),
            _ => Some(0),
        }
    }

    /// Element type.
    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    /// Bytes per element.
    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    /// Target backing store.
    pub fn target(&self) -> FrameTarget {
        self.target
    }

    /// Dimension vector, if specified.
    pub fn dimensions(&self) -> Option<&[usize]> {
        self.dimensions.as_deref()
    }

    /// Number of dimensions (0 if unspecified).
    pub fn dimension_count(&self) -> usize {
        self.dimensions.as_ref().map_or(0, |d| d.len())
    }

    /// Size of dimension `i`, or [`SIZE_UNSPECIFIED`].
    pub fn dimension(&self, i: usize) -> usize {
        self.dimensions
            .as_ref()
            .and_then(|d| d.get(i).copied())
            .unwrap_or(SIZE_UNSPECIFIED)
    }

    /// First dimension, conventionally the width.
    pub fn width(&self) -> usize {
        self.dimension(0)
    }

    /// Second dimension, conventionally the height.
    pub fn height(&self) -> usize {
        self.dimension(1)
    }

    /// Number of elements (product of dimensions), 0 if unspecified.
    ///
    /// Saturates at `usize::MAX`.
    pub fn length(&self) -> usize {
        Self::calc_size(1, self.dimensions.as_deref()).unwrap_or(usize::MAX)
    }

    /// Total size in bytes: bytes per sample × product of dimensions.
    ///
    /// Saturates at `usize::MAX`; use [`checked_size`](Self::checked_size)
    /// before allocating.
    pub fn size(&self) -> usize {
        self.size.unwrap_or(usize::MAX)
    }

    /// Total size in bytes, or [`Error::UnsupportedValue`] if it does not
    /// fit in `usize`.
    pub fn checked_size(&self) -> Result<usize> {
        self.size.ok_or_else(|| {
            Error::UnsupportedValue(format!(
                "frame size overflows: {} bytes per sample x {:?}",
                self.bytes_per_sample,
                self.dimensions.as_deref().unwrap_or_default()
            ))
        })
    }

    /// Object-class constraint.
    pub fn object_class(&self) -> Option<&ObjectClass> {
        self.object_class.as_ref()
    }

    /// Metadata value for `key`.
    pub fn metadata(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// Whether any metadata is attached.
    pub fn has_metadata(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Strict check that `self` satisfies every constraint `required` sets.
    pub fn is_compatible_with(&self, required: &FrameFormat) -> bool {
        if required.base_type != BaseType::Unspecified && self.base_type != required.base_type {
            return false;
        }
        if required.target != FrameTarget::Unspecified && self.target != required.target {
            return false;
        }
        if required.bytes_per_sample != BYTES_PER_SAMPLE_UNSPECIFIED
            && self.bytes_per_sample != required.bytes_per_sample
        {
            return false;
        }
        if required.dimension_count() > 0 && self.dimension_count() != required.dimension_count() {
            return false;
        }
        for i in 0..required.dimension_count() {
            let want_dim = required.dimension(i);
            if want_dim != SIZE_UNSPECIFIED && self.dimension(i) != want_dim {
                return false;
            }
        }
        if let Some(want_class) = &required.object_class {
            match &self.object_class {
                Some(class) if want_class.is_assignable_from(class) => {}
                _ => return false,
            }
        }
        if let Some(want_meta) = &required.metadata {
            for (key, value) in want_meta {
                if self.metadata(key) != Some(value) {
                    return false;
                }
            }
        }
        true
    }

    /// Relaxed symmetric check: a field conflicts only if both sides set it.
    ///
    /// Metadata keys present on one side only never conflict. This is
    /// intentionally permissive and can let mismatches through that
    /// [`is_compatible_with`](Self::is_compatible_with) would reject.
    pub fn may_be_compatible_with(&self, required: &FrameFormat) -> bool {
        if required.base_type != BaseType::Unspecified
            && self.base_type != BaseType::Unspecified
            && self.base_type != required.base_type
        {
            return false;
        }
        if required.target != FrameTarget::Unspecified
            && self.target != FrameTarget::Unspecified
            && self.target != required.target
        {
            return false;
        }
        if required.bytes_per_sample != BYTES_PER_SAMPLE_UNSPECIFIED
            && self.bytes_per_sample != BYTES_PER_SAMPLE_UNSPECIFIED
            && self.bytes_per_sample != required.bytes_per_sample
        {
            return false;
        }
        if required.dimension_count() > 0
            && self.dimension_count() > 0
            && self.dimension_count() != required.dimension_count()
        {
            return false;
        }
        for i in 0..required.dimension_count() {
            let want_dim = required.dimension(i);
            let dim = self.dimension(i);
            if want_dim != SIZE_UNSPECIFIED && dim != SIZE_UNSPECIFIED && dim != want_dim {
                return false;
            }
        }
        if let (Some(want_class), Some(class)) = (&required.object_class, &self.object_class) {
            if !want_class.is_assignable_from(class) {
                return false;
            }
        }
        if let (Some(want_meta), Some(_)) = (&required.metadata, &self.metadata) {
            for (key, value) in want_meta {
                if let Some(own) = self.metadata(key) {
                    if own != value {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Whether a cached frame of this format can be reused for `format`:
    /// same target, same byte size and identical dimensions.
    pub fn is_replaceable_by(&self, format: &FrameFormat) -> bool {
        self.target == format.target
            && self.size() == format.size()
            && self.dimensions == format.dimensions
    }

    /// Mutable deep copy.
    pub fn mutable_copy(&self) -> MutableFrameFormat {
        MutableFrameFormat {
            base_type: self.base_type,
            bytes_per_sample: self.bytes_per_sample,
            target: self.target,
            dimensions: self.dimensions.clone(),
            object_class: self.object_class,
            metadata: self.metadata.clone(),
        }
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl fmt::Debug for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.base_type, self.target)?;
        if self.bytes_per_sample != self.base_type.bytes_per_sample() {
            write!(f, "x{}", self.bytes_per_sample)?;
        }
        match &self.dimensions {
            Some(dims) => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "[{}]", dims.join(","))?;
            }
            None => f.write_str("[?]")?,
        }
        if let Some(class) = &self.object_class {
            write!(f, " class={}", class.name())?;
        }
        if let Some(meta) = &self.metadata {
            let keys: Vec<&str> = meta.keys().map(String::as_str).collect();
            write!(f, " meta={{{}}}", keys.join(","))?;
        }
        Ok(())
    }
}

/// Field-by-field format construction.
#[derive(Debug, Clone, Default)]
pub struct MutableFrameFormat {
    base_type: BaseType,
    bytes_per_sample: usize,
    target: FrameTarget,
    dimensions: Option<Dimensions>,
    object_class: Option<ObjectClass>,
    metadata: Option<BTreeMap<String, MetadataValue>>,
}

impl MutableFrameFormat {
    /// Start from a base type and target.
    pub fn new(base_type: BaseType, target: FrameTarget) -> Self {
        Self {
            base_type,
            bytes_per_sample: base_type.bytes_per_sample(),
            target,
            ..Default::default()
        }
    }

    /// Set the base type; bytes per sample follows the type's default.
    pub fn set_base_type(&mut self, base_type: BaseType) -> &mut Self {
        self.base_type = base_type;
        self.bytes_per_sample = base_type.bytes_per_sample();
        self
    }

    /// Set bytes per sample.
    pub fn set_bytes_per_sample(&mut self, bytes: usize) -> &mut Self {
        self.bytes_per_sample = bytes;
        self
    }

    /// Set the target store.
    pub fn set_target(&mut self, target: FrameTarget) -> &mut Self {
        self.target = target;
        self
    }

    /// Set dimensions (copied).
    pub fn set_dimensions(&mut self, dims: &[usize]) -> &mut Self {
        self.dimensions = Some(dims.iter().copied().collect());
        self
    }

    /// Remove the dimension constraint.
    pub fn clear_dimensions(&mut self) -> &mut Self {
        self.dimensions = None;
        self
    }

    /// Set the object class.
    pub fn set_object_class(&mut self, class: Option<ObjectClass>) -> &mut Self {
        self.object_class = class;
        self
    }

    /// Set a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: MetadataValue) -> &mut Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Current size in bytes, saturating at `usize::MAX`.
    pub fn size(&self) -> usize {
        FrameFormat::calc_size(self.bytes_per_sample, self.dimensions.as_deref())
            .unwrap_or(usize::MAX)
    }

    /// Freeze into an immutable format.
    pub fn build(&self) -> FrameFormat {
        FrameFormat {
            base_type: self.base_type,
            bytes_per_sample: self.bytes_per_sample,
            target: self.target,
            dimensions: self.dimensions.clone(),
            object_class: self.object_class,
            metadata: self.metadata.clone(),
            size: FrameFormat::calc_size(self.bytes_per_sample, self.dimensions.as_deref()),
        }
    }
}

impl From<MutableFrameFormat> for FrameFormat {
    fn from(mutable: MutableFrameFormat) -> Self {
        mutable.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_target() {
        assert_eq!("Native".parse::<FrameTarget>().unwrap(), FrameTarget::Native);
        assert_eq!("vertex".parse::<FrameTarget>().unwrap(), FrameTarget::VertexBuffer);
        assert!("disk".parse::<FrameTarget>().is_err());
    }

    fn float_mask() -> FrameFormat {
        FrameFormat::new(BaseType::Float, FrameTarget::Unspecified)
    }

    #[test]
    fn test_size_is_bytes_times_dimensions() {
        let format = FrameFormat::new(BaseType::Int32, FrameTarget::Native).with_dimensions(&[3, 5]);
        assert_eq!(format.size(), 60);
        assert_eq!(format.length(), 15);
    }

    #[test]
    fn test_oversized_dimensions_saturate() {
        let format = FrameFormat::new(BaseType::Byte, FrameTarget::Native)
            .with_dimensions(&[usize::MAX, 4]);
        assert_eq!(format.size(), usize::MAX);
        assert_eq!(format.length(), usize::MAX);
        assert!(matches!(format.checked_size(), Err(Error::UnsupportedValue(_))));

        let mut mutable = MutableFrameFormat::new(BaseType::Int32, FrameTarget::Native);
        mutable.set_dimensions(&[usize::MAX / 2, 2]);
        assert_eq!(mutable.size(), usize::MAX);
        assert!(mutable.build().checked_size().is_err());
    }

    #[test]
    fn test_zero_dimension_format_has_size_zero() {
        let format = FrameFormat::new(BaseType::Double, FrameTarget::Simple);
        assert_eq!(format.size(), 0);
        let format = format.with_dimensions(&[]);
        assert_eq!(format.size(), 0);
    }

    #[test]
    fn test_compatibility_is_not_symmetric() {
        let required = float_mask();
        let candidate = FrameFormat::new(BaseType::Float, FrameTarget::Unspecified).with_dimensions(&[4, 4]);
        assert!(candidate.is_compatible_with(&required));
        assert!(!required.is_compatible_with(&candidate));
    }

    #[test]
    fn test_unspecified_dimension_is_wildcard() {
        let required = float_mask().with_dimensions(&[SIZE_UNSPECIFIED, 8]);
        let ok = float_mask().with_dimensions(&[640, 8]);
        let wrong = float_mask().with_dimensions(&[640, 9]);
        assert!(ok.is_compatible_with(&required));
        assert!(!wrong.is_compatible_with(&required));
    }

    #[test]
    fn test_target_conflicts_only_in_strict_mode() {
        let required = FrameFormat::new(BaseType::Byte, FrameTarget::Gpu);
        let unspecified = FrameFormat::new(BaseType::Byte, FrameTarget::Unspecified);
        assert!(!unspecified.is_compatible_with(&required));
        assert!(unspecified.may_be_compatible_with(&required));
        assert!(required.may_be_compatible_with(&unspecified));

        let native = FrameFormat::new(BaseType::Byte, FrameTarget::Native);
        assert!(!native.may_be_compatible_with(&required));
    }

    #[test]
    fn test_object_class_constraint() {
        let required = FrameFormat::object::<String>(FrameTarget::Simple);
        let text = FrameFormat::for_value(&Value::Text("hi".into()), FrameTarget::Simple);
        let number = FrameFormat::for_value(&Value::Int(1), FrameTarget::Simple);
        assert!(text.is_compatible_with(&required));
        assert!(!number.is_compatible_with(&required));
        assert!(!FrameFormat::new(BaseType::Object, FrameTarget::Simple).is_compatible_with(&required));
    }

    #[test]
    fn test_metadata_must_match_in_strict_mode() {
        let required = float_mask().with_metadata("colorspace", MetadataValue::String("rgb".into()));
        let matching = float_mask().with_metadata("colorspace", MetadataValue::String("rgb".into()));
        let missing = float_mask();
        let different = float_mask().with_metadata("colorspace", MetadataValue::String("yuv".into()));
        assert!(matching.is_compatible_with(&required));
        assert!(!missing.is_compatible_with(&required));
        assert!(!different.is_compatible_with(&required));
    }

    /// The relaxed check deliberately lets one-sided metadata through.
    #[test]
    fn test_relaxed_check_is_intentionally_lossy_for_metadata() {
        let required = float_mask().with_metadata("colorspace", MetadataValue::String("rgb".into()));
        let missing = float_mask();
        let other_key = float_mask().with_metadata("gamma", MetadataValue::Float(2.2));
        let different = float_mask().with_metadata("colorspace", MetadataValue::String("yuv".into()));
        assert!(missing.may_be_compatible_with(&required));
        assert!(other_key.may_be_compatible_with(&required));
        assert!(!different.may_be_compatible_with(&required));
    }

    #[test]
    fn test_replaceable_requires_same_target_size_and_dims() {
        let a = FrameFormat::new(BaseType::Int32, FrameTarget::Native).with_dimensions(&[4, 4]);
        let same_bytes = FrameFormat::new(BaseType::Float, FrameTarget::Native).with_dimensions(&[4, 4]);
        let transposed_size = FrameFormat::new(BaseType::Int32, FrameTarget::Native).with_dimensions(&[2, 8]);
        let other_target = FrameFormat::new(BaseType::Int32, FrameTarget::Simple).with_dimensions(&[4, 4]);
        assert!(a.is_replaceable_by(&same_bytes));
        assert!(!a.is_replaceable_by(&transposed_size));
        assert!(!a.is_replaceable_by(&other_target));
    }

    #[test]
    fn test_mutable_copy_is_deep() {
        let original = float_mask()
            .with_dimensions(&[2, 2])
            .with_metadata("k", MetadataValue::Int(1));
        let mut copy = original.mutable_copy();
        copy.set_dimensions(&[3, 3]).set_metadata("k", MetadataValue::Int(2));
        assert_eq!(original.dimensions(), Some(&[2, 2][..]));
        assert_eq!(original.metadata("k"), Some(&MetadataValue::Int(1)));
        let rebuilt = copy.build();
        assert_eq!(rebuilt.size(), 36);
    }

    #[test]
    fn test_for_value_bitmap() {
        let format = FrameFormat::for_value(&Value::Bitmap(Bitmap::new(3, 2)), FrameTarget::Gpu);
        assert_eq!(format.dimensions(), Some(&[3, 2][..]));
        assert_eq!(format.size(), 24);
    }
}
