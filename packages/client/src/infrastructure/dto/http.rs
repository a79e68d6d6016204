//! REST request and response bodies.

use serde::{Deserialize, Serialize};

use crate::domain::{TokenPair, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensDto {
    pub access_token: String,
    pub refresh_token: String,
}

/// `{ tokens: { accessToken, refreshToken } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub tokens: TokensDto,
}

/// Login and registration answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokensDto,
}

impl From<TokensDto> for TokenPair {
    fn from(dto: TokensDto) -> Self {
        TokenPair::issued(dto.access_token, dto.refresh_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_response_to_token_pair() {
        // テスト項目: リフレッシュ応答の tokens が TokenPair に変換される
        // given (前提条件):
        let body = r#"{"tokens":{"accessToken":"a.b.c","refreshToken":"r-2"}}"#;

        // when (操作):
        let response: RefreshResponse = serde_json::from_str(body).unwrap();
        let pair: TokenPair = response.tokens.into();

        // then (期待する結果):
        assert_eq!(pair.access_token.as_deref(), Some("a.b.c"));
        assert_eq!(pair.refresh_token.as_deref(), Some("r-2"));
        assert_eq!(pair.expires_at, None);
    }

    #[test]
    fn test_refresh_request_uses_camel_case() {
        // テスト項目: リフレッシュ要求のボディは refreshToken キーを使う
        // given (前提条件):
        let request = RefreshRequest {
            refresh_token: "r-1".to_string(),
        };

        // when (操作):
        let json = serde_json::to_value(&request).unwrap();

        // then (期待する結果):
        assert_eq!(json, serde_json::json!({"refreshToken": "r-1"}));
    }
}
