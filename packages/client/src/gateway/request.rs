//! Request and response values passed through the gateway.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::ClientError;

/// Path of the logout endpoint; a 401 on it is never retried
pub const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// One REST call, relative to `{API_BASE_URL}/api/v1`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Bearer token, attached by the gateway
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn is_logout(&self) -> bool {
        self.path.split('?').next() == Some(LOGOUT_PATH)
    }
}

/// Raw HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Human-readable error taken from `{ message }` / `{ error }` bodies, else the raw text
    pub fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            for field in ["message", "error"] {
                if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                    return text.to_string();
                }
            }
        }
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        if text.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            text.chars().take(200).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_logout_matches_path_only() {
        // テスト項目: ログアウトエンドポイントのみが is_logout と判定される
        // given (前提条件):
        let logout = ApiRequest::post("/auth/logout");
        let logout_with_query = ApiRequest::post("/auth/logout?all=true");
        let refresh = ApiRequest::post("/auth/refresh-token");

        // when (操作) / then (期待する結果):
        assert!(logout.is_logout());
        assert!(logout_with_query.is_logout());
        assert!(!refresh.is_logout());
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        // テスト項目: エラーメッセージは JSON の message、error、生テキストの順に取り出される
        // given (前提条件):
        let with_message = ApiResponse::new(400, r#"{"message":"title is required"}"#);
        let with_error = ApiResponse::new(403, r#"{"error":"forbidden"}"#);
        let plain = ApiResponse::new(502, "Bad Gateway");
        let empty = ApiResponse::new(500, "");

        // when (操作) / then (期待する結果):
        assert_eq!(with_message.error_message(), "title is required");
        assert_eq!(with_error.error_message(), "forbidden");
        assert_eq!(plain.error_message(), "Bad Gateway");
        assert_eq!(empty.error_message(), "HTTP 500");
    }
}
