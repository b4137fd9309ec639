use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// JSON envelope every tool returns as its single text content.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub content: String,
    /// "text" for prose, "json" when `content` is a serialized value.
    pub content_type: &'static str,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl ToolResponse {
    pub fn success(content: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "success",
            content,
            content_type: "text",
            metadata,
        }
    }

    pub fn data<T: Serialize>(value: &T, metadata: ToolMetadata) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => Self {
                status: "success",
                content: json,
                content_type: "json",
                metadata,
            },
            Err(e) => Self::error(format!("serialization failed: {e}"), metadata),
        }
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "error",
            content: message,
            content_type: "text",
            metadata,
        }
    }

    /// Always a transport-level success: tool failures travel inside the
    /// payload (`"status": "error"`) so clients read them as data.
    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","content":"serialization failed: {escaped}","content_type":"text","metadata":{{}}}}"#
                ))])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ToolMetadata {
        ToolMetadata {
            tool_name: "profile".to_string(),
            duration_seconds: f64::NAN,
        }
    }

    #[test]
    fn data_is_serialized_as_json_content() {
        let response = ToolResponse::data(&serde_json::json!({"liked": true}), meta());
        assert_eq!(response.status, "success");
        assert_eq!(response.content_type, "json");
        assert_eq!(response.content, r#"{"liked":true}"#);
    }

    #[test]
    fn non_finite_duration_serializes_as_zero() {
        let json = serde_json::to_value(ToolResponse::error("sign in first".into(), meta())).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["metadata"]["duration_seconds"], 0.0);
    }

    #[test]
    fn errors_are_still_tool_successes() {
        let result = ToolResponse::error("nope".into(), meta()).into_call_tool_result();
        assert_ne!(result.is_error, Some(true));
    }
}
