//! Sign conversion of raw batch values against declared types.
//!
//! Batch rows arrive with whatever signedness the caller wrote. Each bits leaf
//! is reinterpreted with the signedness of the declared type; the pattern and
//! width are never changed, so a width mismatch is an error rather than a resize.

use crate::error::{Error, Result};
use crate::types::ConcreteType;
use crate::value::Value;

pub fn convert(value: &Value, ty: &ConcreteType) -> std::result::Result<Value, String> {
    match (value, ty) {
        (Value::Bits(bits), ConcreteType::Bits { signed, width }) => {
            if bits.width() != *width {
                return Err(format!("expected `{ty}`, got {}-bit value `{value}`", bits.width()));
            }
            Ok(Value::Bits(bits.with_signedness(*signed)))
        }
        (Value::Tuple(elements), ConcreteType::Tuple(types)) if elements.len() == types.len() => {
            elements
                .iter()
                .zip(types)
                .enumerate()
                .map(|(i, (element, ty))| {
                    convert(element, ty).map_err(|message| format!("in element {i}: {message}"))
                })
                .collect::<std::result::Result<_, _>>()
                .map(Value::Tuple)
        }
        (Value::Array(elements), ConcreteType::Array(element_type, size))
            if elements.len() == *size =>
        {
            elements
                .iter()
                .enumerate()
                .map(|(i, element)| {
                    convert(element, element_type)
                        .map_err(|message| format!("at index {i}: {message}"))
                })
                .collect::<std::result::Result<_, _>>()
                .map(Value::Array)
        }
        (Value::Channel(_), ConcreteType::Channel(..)) => Ok(value.clone()),
        _ => Err(format!("expected `{ty}`, got {} `{value}`", value.kind())),
    }
}

/// Converts one row positionally; `what` names the row's owner in messages.
pub fn convert_row(values: &[Value], types: &[ConcreteType], what: &str) -> Result<Vec<Value>> {
    if values.len() != types.len() {
        return Err(Error::Arity {
            row: None,
            what: what.to_owned(),
            expected: types.len(),
            found: values.len(),
        });
    }
    values
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (value, ty))| {
            convert(value, ty).map_err(|message| {
                Error::conversion(format!("{what}, argument {i}: {message}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reinterprets_without_resizing() {
        let converted = convert(&Value::ubits(8, 0xff), &ConcreteType::signed(8)).unwrap();
        assert_eq!(converted, Value::sbits(8, -1));
        let back = convert(&converted, &ConcreteType::unsigned(8)).unwrap();
        assert_eq!(back, Value::ubits(8, 0xff));
    }

    #[test]
    fn idempotent_on_matching_values() {
        let ty = ConcreteType::Tuple(vec![
            ConcreteType::signed(4),
            ConcreteType::Array(Box::new(ConcreteType::unsigned(2)), 2),
        ]);
        let value = Value::Tuple(vec![
            Value::ubits(4, 0b1110),
            Value::Array(vec![Value::ubits(2, 1), Value::ubits(2, 3)]),
        ]);
        let once = convert(&value, &ty).unwrap();
        let twice = convert(&once, &ty).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.to_string(), "(s4:-2, [u2:1, u2:3])");
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let error = convert(&Value::ubits(16, 1), &ConcreteType::unsigned(8)).unwrap_err();
        assert_eq!(error, "expected `u8`, got 16-bit value `u16:1`");
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let ty = ConcreteType::Array(Box::new(ConcreteType::unsigned(8)), 3);
        let error = convert(&Value::Array(vec![Value::ubits(8, 1)]), &ty).unwrap_err();
        assert!(error.starts_with("expected `u8[3]`"), "{error}");
    }

    #[test]
    fn rows_check_arity_before_values() {
        let types = [ConcreteType::unsigned(8), ConcreteType::unsigned(8)];
        let error = convert_row(&[Value::ubits(8, 1)], &types, "function `add`").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Arity);
        let error = convert_row(&[Value::ubits(8, 1), Value::bool(true)], &types, "function `add`")
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conversion);
        assert_eq!(
            error.to_string(),
            "function `add`, argument 1: expected `u8`, got 1-bit value `u1:1`"
        );
    }
}
