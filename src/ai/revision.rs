//! Plan Revision Parsing
//!
//! Turns a validated LLM reply into a typed RFC 6902 patch. The LLM is asked
//! for `{"revision": [...]}` but a bare operation array is accepted too.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Result, TrainError};

const ALLOWED_OPS: &[&str] = &["add", "remove", "replace", "move", "copy", "test"];

/// A single RFC 6902 operation as proposed by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, rename = "from", skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// A validated list of patch operations ready to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanRevision {
    operations: Vec<PatchOperation>,
}

impl PlanRevision {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    /// Serialize to the compact JSON array stored in the revision log.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.operations)?)
    }

    /// Convert into a `json_patch::Patch` for application. Structural
    /// requirements the pre-validation doesn't cover (e.g. a missing `value`
    /// on `add`) surface here as JSON errors.
    pub fn to_patch(&self) -> Result<json_patch::Patch> {
        let value = serde_json::to_value(&self.operations)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Parse and validate the LLM reply content into a [`PlanRevision`].
pub fn parse_revision(content: &Value) -> Result<PlanRevision> {
    let ops_value = match content {
        Value::Object(map) => map
            .get("revision")
            .ok_or_else(|| TrainError::Revision("reply has no 'revision' key".to_string()))?,
        Value::Array(_) => content,
        other => {
            return Err(TrainError::Revision(format!(
                "expected an object or array, got {}",
                value_kind(other)
            )));
        }
    };

    let operations: Vec<PatchOperation> = serde_json::from_value(ops_value.clone())
        .map_err(|e| TrainError::Revision(format!("malformed patch operations: {}", e)))?;

    for (i, op) in operations.iter().enumerate() {
        if !ALLOWED_OPS.contains(&op.op.as_str()) {
            return Err(TrainError::Revision(format!(
                "operation {} has unknown op '{}'",
                i, op.op
            )));
        }
        if !op.path.is_empty() && !op.path.starts_with('/') {
            return Err(TrainError::Revision(format!(
                "operation {} path '{}' is not a JSON pointer",
                i, op.path
            )));
        }
        if matches!(op.op.as_str(), "move" | "copy") && op.from.is_none() {
            return Err(TrainError::Revision(format!(
                "operation {} ({}) is missing 'from'",
                i, op.op
            )));
        }
    }

    Ok(PlanRevision { operations })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_revision() {
        let content = json!({
            "revision": [
                { "op": "replace", "path": "/workouts/0/intensity", "value": "easy" },
                { "op": "add", "path": "/notes/-", "value": "reduced after low HRV" }
            ]
        });

        let revision = parse_revision(&content).unwrap();
        assert_eq!(revision.len(), 2);
        assert_eq!(revision.operations()[0].op, "replace");
    }

    #[test]
    fn test_parse_bare_array() {
        let content = json!([{ "op": "remove", "path": "/workouts/3" }]);
        let revision = parse_revision(&content).unwrap();
        assert_eq!(revision.len(), 1);
    }

    #[test]
    fn test_empty_revision_is_ok() {
        let revision = parse_revision(&json!({ "revision": [] })).unwrap();
        assert!(revision.is_empty());
    }

    #[test]
    fn test_missing_revision_key_rejected() {
        assert!(parse_revision(&json!({ "patch": [] })).is_err());
    }

    #[test]
    fn test_unknown_op_rejected() {
        let content = json!({ "revision": [{ "op": "merge", "path": "/a" }] });
        let err = parse_revision(&content).unwrap_err();
        assert!(matches!(err, TrainError::Revision(_)));
    }

    #[test]
    fn test_bad_pointer_rejected() {
        let content = json!({ "revision": [{ "op": "remove", "path": "workouts/0" }] });
        assert!(parse_revision(&content).is_err());
    }

    #[test]
    fn test_move_without_from_rejected() {
        let content = json!({ "revision": [{ "op": "move", "path": "/a" }] });
        assert!(parse_revision(&content).is_err());
    }

    #[test]
    fn test_scalar_reply_rejected() {
        assert!(parse_revision(&json!("just text")).is_err());
    }

    #[test]
    fn test_to_patch_roundtrip() {
        let content = json!({
            "revision": [
                { "op": "replace", "path": "/volume", "value": 40 },
                { "op": "copy", "path": "/b", "from": "/a" }
            ]
        });
        let revision = parse_revision(&content).unwrap();
        let patch = revision.to_patch().unwrap();
        assert_eq!(patch.0.len(), 2);
    }

    #[test]
    fn test_to_json_is_compact_array() {
        let content = json!({ "revision": [{ "op": "remove", "path": "/x" }] });
        let revision = parse_revision(&content).unwrap();
        let json = revision.to_json().unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"op\":\"remove\""));
    }
}
