//! One-shot content import into the incremental update model.
//!
//! An editing surface that loaded content from storage before
//! collaboration began hands it over here. The content is replayed into a
//! throwaway document and comes back out as an ordinary update delta, so
//! it enters the shared document through the same merge path as any peer
//! edit and cannot clobber concurrent changes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use yrs::updates::decoder::Decode;
use yrs::{Doc, GetString, Text, Transact, Update};

use crate::session::{SessionError, CONTENT_ROOT};

/// Derive the throwaway document's client id from the content itself.
///
/// Same content, same client id, same delta bytes: importing the same
/// snapshot twice is a merge no-op. Distinct contents get distinct client
/// ids, so two imports can never collide on (client, clock) pairs.
fn import_client_id(raw: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    hasher.finish()
}

/// Convert a content snapshot into an update delta equivalent to typing
/// it into an empty document.
pub fn import_content(raw: &str) -> Vec<u8> {
    let doc = Doc::with_client_id(import_client_id(raw));
    let text = doc.get_or_insert_text(CONTENT_ROOT);
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, raw);
    txn.encode_update_v1()
}

/// Apply a delta to a fresh document and return its text content.
///
/// Round-trip inspection helper: `materialize(import_content(c)) == c`.
pub fn materialize(update: &[u8]) -> Result<String, SessionError> {
    let doc = Doc::new();
    let text = doc.get_or_insert_text(CONTENT_ROOT);
    {
        let decoded =
            Update::decode_v1(update).map_err(|e| SessionError::MalformedDelta(e.to_string()))?;
        let mut txn = doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| SessionError::MalformedDelta(e.to_string()))?;
    }
    let txn = doc.transact();
    Ok(text.get_string(&txn))
}
