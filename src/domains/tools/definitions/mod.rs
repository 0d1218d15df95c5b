//! Tool definitions module.
//!
//! This module exports all built-in tool definitions.
//! Each tool is defined in its own file for better maintainability.

use schemars::JsonSchema;
use serde_json::Value;

pub mod weather;

pub use weather::{GetWeatherParams, GetWeatherTool};

/// Derive a tool input schema from a parameters struct.
///
/// The `$schema` meta-schema URI is dropped; clients only need the shape.
pub fn input_schema<T: JsonSchema>() -> Value {
    let mut schema = schemars::schema_for!(T);
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema.to_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::schema::{Schema, ValidationOptions};
    use serde_json::json;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Stop {
        city: String,
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Trip {
        stop: Stop,
        #[schemars(range(min = 1))]
        days: u32,
        via: Option<Stop>,
    }

    #[test]
    fn test_input_schema_drops_meta_schema_uri() {
        let schema = input_schema::<Trip>();
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["properties"]["stop"]["$ref"], "#/$defs/Stop");
    }

    #[test]
    fn test_derived_schema_constraints_are_enforced() {
        let schema = Schema::from_value(&input_schema::<Trip>()).unwrap();
        let options = ValidationOptions::default();

        assert!(
            schema
                .validate(&json!({ "days": 2, "stop": { "city": "Oslo" } }), options)
                .is_ok()
        );
        assert!(
            schema
                .validate(
                    &json!({ "days": 2, "stop": { "city": "Oslo" }, "via": null }),
                    options
                )
                .is_ok()
        );

        let errors = schema
            .validate(&json!({ "days": 0, "stop": {} }), options)
            .unwrap_err();
        let paths: Vec<_> = errors.violations().iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["$.days", "$.stop.city"]);

        let errors = schema
            .validate(&json!({ "days": 1, "stop": { "city": "Oslo" }, "via": {} }), options)
            .unwrap_err();
        assert_eq!(errors.violations()[0].path, "$.via");
    }
}
