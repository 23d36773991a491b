//! HMAC-signed bearer token auth (spec.md §9): "HMAC-signed JSON with
//! `user_id`, `login_name`, `exp`, `iat`. Any equivalent signed-token
//! scheme satisfies the contract." Grounded on the teacher's
//! `hmac`+`sha2`+`hex` dependency (already used for webhook signature
//! verification in `skynet-gateway/src/http/webhooks.rs`), applied here to
//! a compact `<hex(payload)>.<hex(signature)>` token shape instead of a
//! full JWT library, since the spec only asks for signature+expiry, not
//! the JOSE header/alg-negotiation machinery a JWT crate would add.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub login_name: String,
    /// Unix seconds.
    pub exp: i64,
    pub iat: i64,
}

/// Sign `claims` as `<hex(json)>.<hex(hmac)>`.
pub fn issue_token(secret: &str, claims: &Claims) -> String {
    let payload = serde_json::to_vec(claims).expect("claims serialization is infallible");
    let payload_hex = hex::encode(&payload);
    let signature = sign(secret, payload_hex.as_bytes());
    format!("{payload_hex}.{signature}")
}

/// Verify `token`'s signature and expiry against `secret` and the
/// process clock, returning the embedded claims on success (spec.md §4.4:
/// "verify signature and expiry").
pub fn verify_token(secret: &str, token: &str, now_unix: i64) -> Result<Claims> {
    let (payload_hex, signature) = token
        .split_once('.')
        .ok_or_else(|| GatewayError::AuthFailed("malformed token".to_string()))?;

    let expected = sign(secret, payload_hex.as_bytes());
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(GatewayError::AuthFailed("invalid signature".to_string()));
    }

    let payload = hex::decode(payload_hex)
        .map_err(|_| GatewayError::AuthFailed("malformed token payload".to_string()))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|_| GatewayError::AuthFailed("malformed token claims".to_string()))?;

    if claims.exp <= now_unix {
        return Err(GatewayError::AuthFailed("token expired".to_string()));
    }

    Ok(claims)
}

fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Byte-for-byte comparison that doesn't short-circuit on the first
/// mismatch, so signature comparison can't leak timing information about
/// how many leading bytes matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_token() {
        let claims = Claims {
            user_id: 7,
            login_name: "nova".to_string(),
            exp: 2_000_000_000,
            iat: 1_000_000_000,
        };
        let token = issue_token("secret", &claims);
        let verified = verify_token("secret", &token, 1_500_000_000).expect("verifies");
        assert_eq!(verified.user_id, 7);
        assert_eq!(verified.login_name, "nova");
    }

    #[test]
    fn rejects_expired_token() {
        let claims = Claims {
            user_id: 1,
            login_name: "a".to_string(),
            exp: 100,
            iat: 1,
        };
        let token = issue_token("secret", &claims);
        assert!(verify_token("secret", &token, 200).is_err());
    }

    #[test]
    fn rejects_tampered_signature() {
        let claims = Claims {
            user_id: 1,
            login_name: "a".to_string(),
            exp: 2_000_000_000,
            iat: 1,
        };
        let token = issue_token("secret", &claims);
        let (payload, _sig) = token.split_once('.').unwrap();
        let tampered = format!("{payload}.{:0>64}", "0");
        assert!(verify_token("secret", &tampered, 2).is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let claims = Claims {
            user_id: 1,
            login_name: "a".to_string(),
            exp: 2_000_000_000,
            iat: 1,
        };
        let token = issue_token("secret", &claims);
        assert!(verify_token("other-secret", &token, 2).is_err());
    }
}
