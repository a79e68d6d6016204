//! Access/refresh token pair and expiry decoding.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair held by the session.
///
/// `access_token == None` means unauthenticated, whatever else is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// `exp` claim of the access token (seconds since epoch)
    pub expires_at: Option<i64>,
}

impl TokenPair {
    /// Build a pair from freshly issued tokens, decoding the expiry from the access token
    pub fn issued(access_token: String, refresh_token: String) -> Self {
        let expires_at = decode_expiry(&access_token);
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_at,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Decode the `exp` claim of a JWT without verifying its signature.
///
/// Returns `None` when the token is not a three-part JWT, the payload is not
/// base64url JSON, or the claim is missing or not a number.
pub fn decode_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;

    exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64))
}

/// Whether `token` is expired at `now_secs`.
///
/// A token without a decodable `exp` claim is treated as expired.
pub fn is_expired_at(token: &str, now_secs: i64) -> bool {
    match decode_expiry(token) {
        Some(exp) => now_secs >= exp,
        None => true,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

    /// Unsigned JWT carrying the given `exp` claim
    pub fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{}}}"#, exp));
        format!("{}.{}.signature", header, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::jwt_with_exp;
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_token_expired_one_second_ago() {
        // テスト項目: exp = now - 1s のトークンは期限切れと判定される
        // given (前提条件):
        let token = jwt_with_exp(NOW - 1);

        // when (操作):
        let result = is_expired_at(&token, NOW);

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_token_valid_for_one_more_second() {
        // テスト項目: exp = now + 1s のトークンは有効と判定される
        // given (前提条件):
        let token = jwt_with_exp(NOW + 1);

        // when (操作):
        let result = is_expired_at(&token, NOW);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_token_expired_exactly_at_exp() {
        // テスト項目: exp と現在時刻が等しい場合は期限切れと判定される
        // given (前提条件):
        let token = jwt_with_exp(NOW);

        // when (操作) / then (期待する結果):
        assert!(is_expired_at(&token, NOW));
    }

    #[test]
    fn test_undecodable_token_is_expired() {
        // テスト項目: デコードできないトークンは期限切れとして扱われる（fail closed）
        // given (前提条件):
        let garbage = "not-a-jwt";
        let bad_payload = "aGVhZGVy.!!!.sig";
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let no_exp = format!("{}.{}.sig", header, URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#));

        // when (操作) / then (期待する結果):
        assert!(is_expired_at(garbage, NOW));
        assert!(is_expired_at(bad_payload, NOW));
        assert!(is_expired_at(&no_exp, NOW));
        assert!(is_expired_at("", NOW));
    }

    #[test]
    fn test_issued_pair_decodes_expiry() {
        // テスト項目: 発行されたトークンペアはアクセストークンの exp を保持する
        // given (前提条件):
        let access = jwt_with_exp(NOW + 900);

        // when (操作):
        let pair = TokenPair::issued(access.clone(), "refresh-1".to_string());

        // then (期待する結果):
        assert!(pair.is_authenticated());
        assert_eq!(pair.expires_at, Some(NOW + 900));
        assert_eq!(pair.access_token, Some(access));
    }

    #[test]
    fn test_default_pair_is_unauthenticated() {
        // テスト項目: 空のトークンペアは未認証
        // given (前提条件):
        let pair = TokenPair {
            access_token: None,
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(NOW + 10),
        };

        // when (操作) / then (期待する結果):
        assert!(!pair.is_authenticated());
        assert!(!TokenPair::default().is_authenticated());
    }
}
