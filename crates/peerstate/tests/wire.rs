//! Wire-format vectors for tokens and actions.
//!
//! Peers written against these formats must produce identical:
//! - token claims (hex of compact JSON)
//! - signatures (deterministic Ed25519 over the claims hex)
//! - action envelopes (camelCase JSON, sealing fields together)

use peerstate::core::{decode_unverified, sign_token, verify_token, verify_token_at, Iv};
use peerstate::{Action, EncryptionGroup, IdentityInfo, IdentityUser, Keypair, Operation};
use proptest::prelude::*;
use serde_json::{json, Value};

const BOB_SEED: [u8; 32] = [7u8; 32];

/// Hex of `{"op":"add","path":"/public/bob","value":"hello from bob"}`.
const HELLO_CLAIMS: &str = "7b226f70223a22616464222c2270617468223a222f7075626c69632f626f62222c2276616c7565223a2268656c6c6f2066726f6d20626f62227d";

fn hello() -> Operation {
    Operation::add("/public/bob", json!("hello from bob"))
}

#[test]
fn test_operation_token_claims() -> anyhow::Result<()> {
    let keypair = Keypair::from_seed(&BOB_SEED);
    let token = sign_token(&hello(), &keypair, None)?;

    let (claims, signature) = token.split_once('.').unwrap();
    assert_eq!(claims, HELLO_CLAIMS);
    assert_eq!(signature.len(), 128);

    // Deterministic signatures.
    assert_eq!(sign_token(&hello(), &keypair, None)?, token);

    let decoded: Operation = verify_token(&token, &keypair.public_key())?;
    assert_eq!(decoded, hello());
    Ok(())
}

#[test]
fn test_credential_expiry_claim() -> anyhow::Result<()> {
    let server = Keypair::from_seed(&[1u8; 32]);
    let info = IdentityInfo {
        user: IdentityUser {
            id: "bob".into(),
            public_key: Keypair::from_seed(&BOB_SEED).public_key().to_hex(),
        },
    };
    let token = sign_token(&info, &server, Some(1_700_000_000))?;

    let claims: Value = decode_unverified(&token)?;
    assert_eq!(claims["exp"], 1_700_000_000);
    assert_eq!(claims["user"]["id"], "bob");

    let at_expiry: IdentityInfo = verify_token_at(&token, &server.public_key(), 1_700_000_000)?;
    assert_eq!(at_expiry, info);
    assert!(verify_token_at::<IdentityInfo>(&token, &server.public_key(), 1_700_000_001).is_err());
    Ok(())
}

#[test]
fn test_plain_action_envelope() -> anyhow::Result<()> {
    let action = Action::new("cred", "op-token");
    let wire = serde_json::to_value(&action)?;
    assert_eq!(
        wire,
        json!({"senderToken": "cred", "operationToken": "op-token"})
    );
    assert_eq!(serde_json::from_value::<Action>(wire)?, action);
    Ok(())
}

#[test]
fn test_sealed_action_envelope() -> anyhow::Result<()> {
    let wire = json!({
        "senderToken": "cred",
        "operationToken": "deadbeef",
        "encryptionGroup": "alice,bob",
        "iv": "000102030405060708090a0b0c0d0e0f",
        "secretKeyId": "k1",
    });
    let action: Action = serde_json::from_value(wire.clone())?;

    let sealing = action.sealing.as_ref().unwrap();
    assert_eq!(
        sealing.encryption_group,
        EncryptionGroup::canonical(["bob"], "alice")
    );
    assert_eq!(
        sealing.iv,
        Iv::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15])
    );
    assert_eq!(sealing.secret_key_id.as_deref(), Some("k1"));
    assert_eq!(serde_json::to_value(&action)?, wire);
    Ok(())
}

#[test]
fn test_partial_sealing_rejected() {
    let missing_iv = json!({
        "senderToken": "cred",
        "operationToken": "deadbeef",
        "encryptionGroup": "alice,bob",
    });
    assert!(serde_json::from_value::<Action>(missing_iv).is_err());

    let short_iv = json!({
        "senderToken": "cred",
        "operationToken": "deadbeef",
        "encryptionGroup": "alice,bob",
        "iv": "0001",
    });
    assert!(serde_json::from_value::<Action>(short_iv).is_err());
}

proptest! {
    #[test]
    fn test_tampered_claims_fail_verification(index in 0..HELLO_CLAIMS.len(), nibble in 0u8..16) {
        let keypair = Keypair::from_seed(&BOB_SEED);
        let token = sign_token(&hello(), &keypair, None).unwrap();

        let mut bytes = token.into_bytes();
        let replacement = b"0123456789abcdef"[nibble as usize];
        prop_assume!(bytes[index] != replacement);
        bytes[index] = replacement;
        let tampered = String::from_utf8(bytes).unwrap();

        prop_assert!(verify_token::<Operation>(&tampered, &keypair.public_key()).is_err());
    }
}
