//! Assignment string parser using winnow.
//!
//! Parses initial filter values written as
//!
//! ```text
//! key=value; other = "quoted value"; rate=1.5; enabled=true
//! ```
//!
//! # Syntax
//!
//! - Assignments are separated by `;`; a trailing `;` is allowed
//! - Keys are identifiers (letters, digits, `_`, `-`, `.`)
//! - Values can be quoted strings, booleans, integers, floats, or bare text
//!   running up to the next `;`
//! - Whitespace is optional around `=` and `;`

use crate::error::{Error, Result};
use crate::value::{Value, ValueMap};
use winnow::Parser;
use winnow::ascii::{alpha1, digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, terminated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// Parse an assignment string into a value map.
///
/// # Example
///
/// ```rust
/// use framegraph::graph::parse_assignments;
/// use framegraph::value::Value;
///
/// let values = parse_assignments("repeat=true; key = last frame; size=3").unwrap();
/// assert_eq!(values.get("repeat"), Some(&Value::Bool(true)));
/// assert_eq!(values.get("key"), Some(&Value::Text("last frame".into())));
/// assert_eq!(values.get("size"), Some(&Value::Int(3)));
/// ```
pub fn parse_assignments(input: &str) -> Result<ValueMap> {
    assignments
        .parse(input)
        .map(|entries| entries.into_iter().collect())
        .map_err(|e| Error::InvalidAssignment(format!("parse error: {e}")))
}

/// Parse all assignments.
fn assignments(input: &mut &str) -> WResult<Vec<(String, Value)>> {
    let mut entries = Vec::new();
    loop {
        let _ = multispace0.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        entries.push(assignment.parse_next(input)?);
        let _ = multispace0.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        let _ = ';'.parse_next(input)?;
    }
    Ok(entries)
}

/// Parse one `key=value` pair.
fn assignment(input: &mut &str) -> WResult<(String, Value)> {
    let key: &str = identifier.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let _ = '='.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let value = value.parse_next(input)?;
    Ok((key.to_string(), value))
}

/// Parse a key.
fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| {
            c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
        }),
    )
        .take()
        .parse_next(input)
}

/// Parse a value; typed forms must be followed by the end of the assignment.
fn value(input: &mut &str) -> WResult<Value> {
    alt((
        terminated(quoted_string, end_of_value).map(Value::Text),
        terminated(boolean, end_of_value).map(Value::Bool),
        terminated(float, end_of_value).map(Value::Float),
        terminated(integer, end_of_value).map(Value::Int),
        bare_string.map(Value::Text),
    ))
    .parse_next(input)
}

/// Succeed without consuming if only whitespace remains before `;` or the end.
fn end_of_value(input: &mut &str) -> WResult<()> {
    let rest = input.trim_start();
    if rest.is_empty() || rest.starts_with(';') {
        Ok(())
    } else {
        Err(ContextError::new())
    }
}

/// Parse a quoted string.
fn quoted_string(input: &mut &str) -> WResult<String> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Parse a boolean.
fn boolean(input: &mut &str) -> WResult<bool> {
    alt(("true".map(|_| true), "false".map(|_| false))).parse_next(input)
}

/// Parse an integer.
fn integer(input: &mut &str) -> WResult<i64> {
    let negative = opt('-').parse_next(input)?;
    let digits: &str = digit1.parse_next(input)?;
    let value: i64 = digits.parse().map_err(|_| ContextError::new())?;
    Ok(if negative.is_some() { -value } else { value })
}

/// Parse a float.
fn float(input: &mut &str) -> WResult<f64> {
    let negative = opt('-').parse_next(input)?;
    let int_part: &str = digit1.parse_next(input)?;
    let _ = '.'.parse_next(input)?;
    let frac_part: &str = digit1.parse_next(input)?;

    let s = format!(
        "{}{}.{}",
        if negative.is_some() { "-" } else { "" },
        int_part,
        frac_part
    );
    s.parse().map_err(|_| ContextError::new())
}

/// Parse bare text up to the next `;`, trimming trailing whitespace.
fn bare_string(input: &mut &str) -> WResult<String> {
    take_till(1.., ';')
        .map(|s: &str| s.trim_end().to_string())
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_assignment() {
        let values = parse_assignments("count=100").unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("count"), Some(&Value::Int(100)));
    }

    #[test]
    fn test_parse_typed_values() {
        let values =
            parse_assignments("a=true; b=-4; c=1.5; d=\"x; y\"; e='quoted'; f=native").unwrap();
        assert_eq!(values.get("a"), Some(&Value::Bool(true)));
        assert_eq!(values.get("b"), Some(&Value::Int(-4)));
        assert_eq!(values.get("c"), Some(&Value::Float(1.5)));
        assert_eq!(values.get("d"), Some(&Value::Text("x; y".into())));
        assert_eq!(values.get("e"), Some(&Value::Text("quoted".into())));
        assert_eq!(values.get("f"), Some(&Value::Text("native".into())));
    }

    #[test]
    fn test_typed_prefix_falls_back_to_text() {
        let values = parse_assignments("name=12abc; flag=trueish").unwrap();
        assert_eq!(values.get("name"), Some(&Value::Text("12abc".into())));
        assert_eq!(values.get("flag"), Some(&Value::Text("trueish".into())));
    }

    #[test]
    fn test_whitespace_and_trailing_separator() {
        let values = parse_assignments("  key = last frame ;  size=3 ; ").unwrap();
        assert_eq!(values.get("key"), Some(&Value::Text("last frame".into())));
        assert_eq!(values.get("size"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_empty_input_is_empty_map() {
        assert!(parse_assignments("").unwrap().is_empty());
        assert!(parse_assignments("   ").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_assignments() {
        assert!(matches!(
            parse_assignments("novalue"),
            Err(Error::InvalidAssignment(_))
        ));
        assert!(parse_assignments("=3").is_err());
        assert!(parse_assignments("a=1;;b=2").is_err());
        assert!(parse_assignments("a=").is_err());
    }
}
