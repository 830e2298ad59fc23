use crate::{CorrelationId, Result, RpcError};
use serde::{Deserialize, Serialize};

/// Method name of the sum call.
pub const SUM_METHOD: &str = "sum";

/// Request payload of the sum call. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumRequest {
    pub operand_a: i64,
    pub operand_b: i64,
    /// Selects the fine (checkpointed) wait on the server.
    pub interruptible: bool,
    pub call_id: CorrelationId,
}

impl SumRequest {
    /// Build a request with a freshly generated call id.
    pub fn new(operand_a: i64, operand_b: i64, interruptible: bool) -> Self {
        Self {
            operand_a,
            operand_b,
            interruptible,
            call_id: CorrelationId::generate(),
        }
    }
}

/// Response payload of the sum call. Exactly one is produced per request.
///
/// On the wire: `{"status":"ok","result":3}`, `{"status":"cancelled"}` or
/// `{"status":"error","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SumResponse {
    Ok { result: i64 },
    Cancelled,
    Error { message: String },
}

impl SumResponse {
    pub fn invalid_argument(message: impl std::fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    /// Collapse into the caller-facing result.
    ///
    /// Every server-side `Error` is a per-call rejection of the request, so it
    /// surfaces as [`RpcError::InvalidArgument`].
    pub fn into_result(self) -> Result<i64> {
        match self {
            Self::Ok { result } => Ok(result),
            Self::Cancelled => Err(RpcError::Cancelled),
            Self::Error { message } => Err(RpcError::InvalidArgument(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_response_wire_format() {
        // ---
        let ok = serde_json::to_value(SumResponse::Ok { result: 300000 }).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok", "result": 300000}));

        let cancelled = serde_json::to_value(SumResponse::Cancelled).unwrap();
        assert_eq!(cancelled, serde_json::json!({"status": "cancelled"}));
    }

    #[test]
    fn test_non_integer_operand_is_rejected_by_decoder() {
        // ---
        let raw = br#"{"operand_a":"ten","operand_b":2,"interruptible":true,"call_id":"x"}"#;
        assert!(serde_json::from_slice::<SumRequest>(raw).is_err());
    }

    #[test]
    fn test_into_result_keeps_variants_distinct() {
        // ---
        assert_eq!(SumResponse::Ok { result: 3 }.into_result().unwrap(), 3);
        assert!(matches!(
            SumResponse::Cancelled.into_result(),
            Err(RpcError::Cancelled)
        ));
        assert!(matches!(
            SumResponse::invalid_argument("bad").into_result(),
            Err(RpcError::InvalidArgument(m)) if m == "bad"
        ));
    }
}
