//! Deterministic entity fingerprints.
//!
//! A fingerprint is a SHA-256 digest over an entity kind tag plus the
//! canonicalized, key-sorted JSON serialization of the entity's
//! identity-bearing fields. Two entities with identical identity fields hash
//! identically regardless of field insertion order; any differing identity
//! field produces a different digest. The duplicate log stores these digests
//! to recognize entities that were already synchronized.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Computes the hex-encoded fingerprint of one entity.
///
/// `identity_fields` must already be normalized (trimmed values, one
/// canonical field set per entity kind); the BTreeMap guarantees key order,
/// so serialization is canonical without further sorting.
pub fn entity_fingerprint(kind: &str, identity_fields: &BTreeMap<String, String>) -> String {
    let canonical = serde_json::to_string(identity_fields)
        .unwrap_or_else(|_| String::from("{}"));
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
