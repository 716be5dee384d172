//! Compact signed tokens.
//!
//! Identity credentials and operation tokens share one format:
//!
//! ```text
//! <claims-hex>.<signature-hex>
//! ```
//!
//! `claims` is the UTF-8 JSON encoding of the payload object, optionally
//! carrying a numeric `exp` (Unix seconds). The Ed25519 signature covers the
//! ASCII bytes of `claims-hex`, so verification never re-serializes JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::crypto::{Keypair, PublicKey, Signature};
use crate::error::TokenError;

const EXPIRY_CLAIM: &str = "exp";

/// Sign `payload` into a token.
///
/// The payload must serialize to a JSON object when `expires_at` is set.
pub fn sign_token<P: Serialize>(
    payload: &P,
    keypair: &Keypair,
    expires_at: Option<i64>,
) -> Result<String, TokenError> {
    let mut claims = serde_json::to_value(payload)?;
    if let Some(exp) = expires_at {
        let object = claims
            .as_object_mut()
            .ok_or_else(|| TokenError::Malformed("expiring payload must be an object".into()))?;
        object.insert(EXPIRY_CLAIM.to_string(), Value::from(exp));
    }

    let encoded = hex::encode(serde_json::to_vec(&claims)?);
    let signature = keypair.sign(encoded.as_bytes());
    Ok(format!("{encoded}.{}", signature.to_hex()))
}

/// Verify a token against `key` at the current time and decode its payload.
pub fn verify_token<P: DeserializeOwned>(token: &str, key: &PublicKey) -> Result<P, TokenError> {
    verify_token_at(token, key, now_secs())
}

/// Verify a token against `key` as of `now` (Unix seconds).
pub fn verify_token_at<P: DeserializeOwned>(
    token: &str,
    key: &PublicKey,
    now: i64,
) -> Result<P, TokenError> {
    let (encoded, signature) = split(token)?;
    let signature = Signature::from_hex(signature)
        .map_err(|e| TokenError::Malformed(format!("signature: {e}")))?;
    key.verify(encoded.as_bytes(), &signature)?;

    let claims = decode_claims(encoded)?;
    if let Some(exp) = claims.get(EXPIRY_CLAIM) {
        let expired_at = exp
            .as_i64()
            .ok_or_else(|| TokenError::Malformed("exp must be an integer".into()))?;
        if now > expired_at {
            return Err(TokenError::Expired { expired_at, now });
        }
    }

    Ok(serde_json::from_value(claims)?)
}

/// Decode a token's payload without checking its signature.
///
/// Only for reading a party's own credential; never use on received data.
pub fn decode_unverified<P: DeserializeOwned>(token: &str) -> Result<P, TokenError> {
    let (encoded, _) = split(token)?;
    Ok(serde_json::from_value(decode_claims(encoded)?)?)
}

fn split(token: &str) -> Result<(&str, &str), TokenError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(claims), Some(signature), None) if !claims.is_empty() => Ok((claims, signature)),
        _ => Err(TokenError::Malformed("expected <claims>.<signature>".into())),
    }
}

fn decode_claims(encoded: &str) -> Result<Value, TokenError> {
    let bytes = hex::decode(encoded).map_err(|e| TokenError::Malformed(format!("claims: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Current time in Unix seconds.
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Claims {
        name: String,
    }

    fn claims() -> Claims {
        Claims {
            name: "alice".into(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let token = sign_token(&claims(), &keypair, None).unwrap();

        let decoded: Claims = verify_token(&token, &keypair.public_key()).unwrap();
        assert_eq!(decoded, claims());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = sign_token(&claims(), &Keypair::generate(), None).unwrap();
        let result: Result<Claims, _> = verify_token(&token, &Keypair::generate().public_key());
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let keypair = Keypair::generate();
        let token = sign_token(&claims(), &keypair, None).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = hex::encode(br#"{"name":"mallory"}"#);
        let forged = format!("{forged_claims}.{signature}");

        let result: Result<Claims, _> = verify_token(&forged, &keypair.public_key());
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_expiry() {
        let keypair = Keypair::generate();
        let token = sign_token(&claims(), &keypair, Some(1_000)).unwrap();

        let ok: Claims = verify_token_at(&token, &keypair.public_key(), 1_000).unwrap();
        assert_eq!(ok, claims());

        let expired: Result<Claims, _> = verify_token_at(&token, &keypair.public_key(), 1_001);
        assert!(matches!(
            expired,
            Err(TokenError::Expired {
                expired_at: 1_000,
                now: 1_001
            })
        ));
    }

    #[test]
    fn test_malformed_structure() {
        let key = Keypair::generate().public_key();
        for token in ["", "abc", "a.b.c", ".deadbeef", "zz.zz"] {
            let result: Result<Claims, _> = verify_token(token, &key);
            assert!(result.is_err(), "{token:?} should be rejected");
        }
    }

    #[test]
    fn test_decode_unverified() {
        let token = sign_token(&claims(), &Keypair::generate(), Some(5)).unwrap();
        let decoded: Claims = decode_unverified(&token).unwrap();
        assert_eq!(decoded, claims());
    }
}
