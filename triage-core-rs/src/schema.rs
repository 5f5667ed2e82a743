//! JSON Schema for the diagnosis contract, sent to the reasoning engine as
//! its structured-output format. [`crate::validation`] enforces the same
//! contract locally; the engine-side schema only makes conforming output
//! more likely.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::model::DiagnosisType;

/// Format name registered with the engine
pub const SCHEMA_NAME: &str = "cpi_error_analysis_v1";

static DIAGNOSIS_SCHEMA: Lazy<Value> = Lazy::new(|| {
    let non_empty_list = json!({
        "type": "array",
        "items": { "type": "string", "minLength": 1 },
        "minItems": 1
    });
    let type_names: Vec<&str> = DiagnosisType::ALL.iter().map(|kind| kind.as_str()).collect();

    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "flow": { "type": "string", "minLength": 1 },
            "type": { "type": "string", "enum": type_names },
            "description": { "type": "string", "minLength": 1 },
            "root_causes": non_empty_list,
            "suggested_fix": non_empty_list,
            "retry_hint": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "allowed": { "type": "boolean" },
                    "after_seconds": { "type": "integer", "minimum": 0 },
                    "max_attempts": { "type": "integer", "minimum": 0 }
                },
                "required": ["allowed", "after_seconds", "max_attempts"]
            },
            "requires_manual": { "type": "boolean" },
            "signals": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "http_status": { "type": "string" },
                    "target_system": { "type": "string" },
                    "step": { "type": "string" }
                },
                "required": ["http_status", "target_system", "step"]
            }
        },
        "required": crate::validation::DIAGNOSIS_KEYS
    })
});

/// The diagnosis JSON Schema document
pub fn diagnosis_schema() -> &'static Value {
    &DIAGNOSIS_SCHEMA
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::DIAGNOSIS_KEYS;

    #[test]
    fn test_schema_matches_validator_keys() {
        let schema = diagnosis_schema();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), DIAGNOSIS_KEYS.len());
        for key in DIAGNOSIS_KEYS {
            assert!(properties.contains_key(key), "missing property {}", key);
        }
        assert_eq!(schema["required"].as_array().unwrap().len(), DIAGNOSIS_KEYS.len());
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_schema_enumerates_every_type() {
        let names = diagnosis_schema()["properties"]["type"]["enum"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(names.len(), DiagnosisType::ALL.len());
        assert!(names.contains(&json!("payload_mapping")));
    }
}
