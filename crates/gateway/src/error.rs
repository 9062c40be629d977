//! API-plane error taxonomy: JSON-RPC 2.0 error codes, plus the mapping
//! from internal faults (unauthenticated, rate limited, permission denied,
//! correlation timeout, …) onto them.
//!
//! These never affect a router link — a bad API request is reported back
//! to the one session that sent it and nothing else.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    NotAuthenticated,
    RateLimited,
    PermissionDenied,
    SessionExpired,
    GatewayTimeout,
    GatewayShuttingDown,
}

impl ApiErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ApiErrorCode::ParseError => -32700,
            ApiErrorCode::InvalidRequest => -32600,
            ApiErrorCode::MethodNotFound => -32601,
            ApiErrorCode::InvalidParams => -32602,
            ApiErrorCode::InternalError => -32603,
            ApiErrorCode::NotAuthenticated => -32000,
            ApiErrorCode::RateLimited => -32001,
            ApiErrorCode::PermissionDenied => -32002,
            ApiErrorCode::SessionExpired => -32003,
            ApiErrorCode::GatewayTimeout => -32004,
            ApiErrorCode::GatewayShuttingDown => -32005,
        }
    }
}

/// An API-plane fault, carrying enough to build a JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ApiErrorCode::MethodNotFound, format!("unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidParams, message)
    }

    pub fn not_authenticated() -> Self {
        Self::new(ApiErrorCode::NotAuthenticated, "authenticate before calling this method")
    }

    pub fn rate_limited(method_class: &str) -> Self {
        Self::new(ApiErrorCode::RateLimited, format!("rate limit exceeded for {method_class}"))
    }

    pub fn permission_denied(permission: &str) -> Self {
        Self::new(
            ApiErrorCode::PermissionDenied,
            format!("session lacks permission: {permission}"),
        )
    }

    pub fn session_expired() -> Self {
        Self::new(ApiErrorCode::SessionExpired, "session has expired, authenticate again")
    }

    pub fn gateway_timeout() -> Self {
        Self::new(ApiErrorCode::GatewayTimeout, "no reply from router within the correlation deadline")
    }

    pub fn gateway_shutting_down() -> Self {
        Self::new(ApiErrorCode::GatewayShuttingDown, "gateway is shutting down")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InternalError, message)
    }
}
