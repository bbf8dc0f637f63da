//! Structured operation results for collaborators outside the crate

use serde::{Deserialize, Serialize};

use crate::application::error::{EngineError, ErrorCode};

/// `{ok, data}` on success, `{ok, error, code}` on failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl<T> Outcome<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
        }
    }
}

impl<T> From<Result<T, EngineError>> for Outcome<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::EntityId;
    use serde_json::json;

    #[test]
    fn test_failure_serializes_code() {
        let id = EntityId::new();
        let outcome: Outcome<()> = Err(EngineError::EntityNotFound(id)).into();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"ok": false, "error": format!("Entity {} not found", id), "code": "NotFound"})
        );
    }

    #[test]
    fn test_success_carries_data() {
        let outcome: Outcome<u32> = Ok(3).into();
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"ok": true, "data": 3}));
    }
}
