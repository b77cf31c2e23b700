//! Method registry and parameter shape validation.
//!
//! The registry knows which operations the device understands and which
//! fields each one requires. It checks shape only; field *contents*
//! (addresses, signatures, derivation paths) are device business.

use serde_json::Value;

use crate::errors::{CoreError, Result};

struct MethodSpec {
    name: &'static str,
    required: &'static [&'static str],
}

const SUPPORTED: &[MethodSpec] = &[
    MethodSpec {
        name: "verifyMessage",
        required: &["coin", "address", "signature", "message"],
    },
    MethodSpec {
        name: "signMessage",
        required: &["coin", "path", "message"],
    },
    MethodSpec {
        name: "getAddress",
        required: &["coin", "path"],
    },
    MethodSpec {
        name: "getFeatures",
        required: &[],
    },
];

/// Whether the named method is in the registry
pub fn is_supported(method: &str) -> bool {
    SUPPORTED.iter().any(|spec| spec.name == method)
}

/// Validate a method name and its parameter shape.
///
/// Unknown names fail with `UnknownMethod`; known names with missing or
/// non-string required fields fail with `InvalidParams`. Methods without
/// required fields accept any parameter value, including none.
pub fn validate(method: &str, params: &Value) -> Result<()> {
    let spec = SUPPORTED
        .iter()
        .find(|spec| spec.name == method)
        .ok_or_else(|| CoreError::UnknownMethod {
            method: method.to_string(),
        })?;

    if spec.required.is_empty() {
        return Ok(());
    }

    let object = params.as_object().ok_or_else(|| CoreError::InvalidParams {
        reason: format!("parameters for `{}` must be an object", method),
    })?;

    for field in spec.required {
        match object.get(*field) {
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(CoreError::InvalidParams {
                    reason: format!("field `{}` must be a string", field),
                })
            }
            None => {
                return Err(CoreError::InvalidParams {
                    reason: format!("missing required field `{}`", field),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verify_message_shape() {
        let params = json!({
            "coin": "Bitcoin",
            "address": "3CwYaeWxhpXXiHue3ciQez1DLaTEAXcKa1",
            "signature": "249e23...",
            "message": "This is an example of a signed message.",
        });
        assert!(validate("verifyMessage", &params).is_ok());
    }

    #[test]
    fn test_unknown_method() {
        assert!(matches!(
            validate("selfDestruct", &json!({})),
            Err(CoreError::UnknownMethod { .. })
        ));
        assert!(!is_supported("selfDestruct"));
        assert!(is_supported("verifyMessage"));
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let missing = json!({ "coin": "Bitcoin" });
        assert!(matches!(
            validate("verifyMessage", &missing),
            Err(CoreError::InvalidParams { .. })
        ));

        let mistyped = json!({
            "coin": "Bitcoin",
            "address": 42,
            "signature": "x",
            "message": "y",
        });
        assert!(matches!(
            validate("verifyMessage", &mistyped),
            Err(CoreError::InvalidParams { .. })
        ));

        assert!(matches!(
            validate("verifyMessage", &json!("not an object")),
            Err(CoreError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_parameterless_method_accepts_anything() {
        assert!(validate("getFeatures", &Value::Null).is_ok());
        assert!(validate("getFeatures", &json!({ "extra": true })).is_ok());
    }
}
