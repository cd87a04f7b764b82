//! Nostr event model, canonical hashing, and Schnorr signing.

use std::time::{SystemTime, UNIX_EPOCH};

use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Kind number for a plain short text note. Both the collected posts and the
/// published digest use this kind.
pub const KIND_NOTE: u32 = 1;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and
/// the following elements hold data. Digest events carry no tags, but incoming
/// notes may carry any, and each is preserved verbatim so an event's canonical
/// hash stays reproducible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

/// Signed Nostr event as carried on the wire, in both directions.
///
/// ```json
/// {
///   "id": "aa11..",
///   "pubkey": "9f3e..",
///   "kind": 1,
///   "created_at": 1700000000,
///   "tags": [],
///   "content": "1. ...",
///   "sig": "deadbeef.."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of the SHA-256 canonical hash).
    pub id: String,
    /// Author public key (hex, x-only).
    pub pubkey: String,
    /// Kind number, e.g. `1`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Arbitrary tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Unsigned envelope for an outgoing event. `id`, `pubkey`, and `sig` only
/// exist once [`finalize`] has run.
#[derive(Debug, Clone)]
pub struct EventTemplate {
    pub kind: u32,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
}

/// Compute the canonical event hash over
/// `[0, pubkey, created_at, kind, tags, content]`.
fn canonical_hash(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let data = serde_json::to_vec(&arr).map_err(|e| Error::Signing(e.to_string()))?;
    Ok(Sha256::digest(&data).into())
}

/// Sign a template with `secret`, producing a complete event.
///
/// The public key is derived from the secret, the id is the canonical hash of
/// the visible fields, and the signature uses the deterministic (no auxiliary
/// randomness) Schnorr form, so the same template and secret always yield the
/// same event.
pub fn finalize(template: EventTemplate, secret: &[u8; 32]) -> Result<Event> {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_seckey_slice(&secp, secret)
        .map_err(|_| Error::Config("signing secret is not a valid secp256k1 key".into()))?;
    let pubkey = hex::encode(keypair.x_only_public_key().0.serialize());
    let hash = canonical_hash(
        &pubkey,
        template.created_at,
        template.kind,
        &template.tags,
        &template.content,
    )?;
    let msg = Message::from_digest_slice(&hash).map_err(|e| Error::Signing(e.to_string()))?;
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &keypair);
    Ok(Event {
        id: hex::encode(hash),
        pubkey,
        kind: template.kind,
        created_at: template.created_at,
        tags: template.tags,
        content: template.content,
        sig: hex::encode(sig.as_ref()),
    })
}

/// Recompute an event's id and check its Schnorr signature against `pubkey`.
pub fn verify(ev: &Event) -> Result<()> {
    let hash = canonical_hash(&ev.pubkey, ev.created_at, ev.kind, &ev.tags, &ev.content)?;
    if hex::encode(hash) != ev.id {
        return Err(Error::Signing("id mismatch".into()));
    }
    let sig_bytes = hex::decode(&ev.sig).map_err(|e| Error::Signing(e.to_string()))?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    let pk_bytes = hex::decode(&ev.pubkey).map_err(|e| Error::Signing(e.to_string()))?;
    let pk = XOnlyPublicKey::from_slice(&pk_bytes).map_err(|e| Error::Signing(e.to_string()))?;
    let msg = Message::from_digest_slice(&hash).map_err(|e| Error::Signing(e.to_string()))?;
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(&sig, &msg, &pk)
        .map_err(|e| Error::Signing(e.to_string()))
}

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
