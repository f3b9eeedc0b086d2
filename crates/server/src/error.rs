//! Errors raised by the tool layer itself.
//!
//! Worker errors are `swcache_core::Error` and convert on their own; these
//! cover what only the host surface can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., an unknown header name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The client id was never opened or is already closed.
    #[error("UNKNOWN_CLIENT: {0}")]
    UnknownClient(u64),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::UnknownClient(_) => -32007,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
