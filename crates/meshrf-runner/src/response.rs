//! Status envelope around every operation result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{ "status": "success", "result": ... }` or `{ "status": "error", "message": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ApiResponse {
    pub fn success(result: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            result: Some(result),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let ok = serde_json::to_value(ApiResponse::success(json!({"elevation": 12.0}))).unwrap();
        assert_eq!(ok, json!({"status": "success", "result": {"elevation": 12.0}}));

        let err = serde_json::to_value(ApiResponse::error("No tiles found for area")).unwrap();
        assert_eq!(err, json!({"status": "error", "message": "No tiles found for area"}));
    }
}
