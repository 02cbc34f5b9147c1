//! Deterministic content identity derived from raw torrent descriptions.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::bencode::{self, Value};
use crate::error::{FleetError, FleetResult};
use crate::model::RecordKey;

/// Separator placed between announce tiers in the canonical serialization.
pub const TIER_SEPARATOR: char = ';';
/// Separator placed between URLs inside one tier.
pub const URL_SEPARATOR: char = ',';
/// Length of an uppercase hex SHA-1 digest.
pub const IDENTITY_HASH_LEN: usize = 40;

/// Identity of a torrent: its info hash plus the hash of its announce tiers.
///
/// Equality and hashing only consider the two hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentIdentity {
    /// Uppercase hex SHA-1 of the canonically encoded `info` dictionary.
    pub content_hash: String,
    /// Uppercase hex SHA-1 of the canonical announce serialization.
    pub announce_set_hash: String,
    /// Tiered announce URLs the identity was derived from.
    pub announce_tiers: Vec<Vec<String>>,
}

impl ContentIdentity {
    /// Compound key used by the record store and the admission queue.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            announce_set_hash: self.announce_set_hash.clone(),
            content_hash: self.content_hash.clone(),
        }
    }

    /// Canonical serialization of the announce tiers.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL contains a reserved separator.
    pub fn encoded_announces(&self) -> FleetResult<String> {
        encode_announces(&self.announce_tiers)
    }
}

impl PartialEq for ContentIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash && self.announce_set_hash == other.announce_set_hash
    }
}

impl Eq for ContentIdentity {}

impl Hash for ContentIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content_hash.hash(state);
        self.announce_set_hash.hash(state);
    }
}

/// Derive the content identity of a bencoded torrent description.
///
/// # Errors
///
/// Returns [`FleetError::MalformedBinaryData`] when the bytes do not decode,
/// the top level is not a dictionary, the `info` dictionary is missing, or no
/// usable announce field exists.
pub fn derive_identity(bytes: &[u8]) -> FleetResult<ContentIdentity> {
    let document = bencode::decode(bytes)?;
    if document.as_dict().is_none() {
        return Err(FleetError::malformed("top-level value is not a dictionary", None));
    }
    let info = document
        .get("info")
        .filter(|info| info.as_dict().is_some())
        .ok_or_else(|| FleetError::malformed("missing info dictionary", None))?;
    let content_hash = hex_digest(&bencode::encode(info));
    let announce_tiers = announce_tiers(&document)?;
    let announce_set_hash = hash_announces(&announce_tiers)?;
    Ok(ContentIdentity {
        content_hash,
        announce_set_hash,
        announce_tiers,
    })
}

fn announce_tiers(document: &Value) -> FleetResult<Vec<Vec<String>>> {
    if let Some(list) = document
        .get("announce-list")
        .and_then(Value::as_list)
        .filter(|tiers| !tiers.is_empty())
    {
        return list
            .iter()
            .map(|tier| -> FleetResult<Vec<String>> {
                tier.as_list()
                    .ok_or_else(|| FleetError::malformed("announce tier is not a list", None))?
                    .iter()
                    .map(|url| {
                        url.as_str().map(str::to_string).ok_or_else(|| {
                            FleetError::malformed("announce url is not utf-8 text", None)
                        })
                    })
                    .collect()
            })
            .collect();
    }
    let announce = document
        .get("announce")
        .and_then(Value::as_str)
        .ok_or_else(|| FleetError::malformed("missing announce url", None))?;
    Ok(vec![vec![announce.to_string()]])
}

/// Uppercase hex SHA-1 of the given bytes.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(bytes))
}

/// Whether the value looks like an identity hash (40 hex characters).
#[must_use]
pub fn is_identity_hash(value: &str) -> bool {
    value.len() == IDENTITY_HASH_LEN && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Serialize announce tiers: tiers joined by `;`, URLs within a tier by `,`.
///
/// # Errors
///
/// Returns [`FleetError::MalformedBinaryData`] if any URL contains a separator.
pub fn encode_announces(tiers: &[Vec<String>]) -> FleetResult<String> {
    if tiers
        .iter()
        .flatten()
        .any(|url| url.contains(TIER_SEPARATOR) || url.contains(URL_SEPARATOR))
    {
        return Err(FleetError::malformed(
            "announce url contains a reserved separator",
            None,
        ));
    }
    let tier_separator = TIER_SEPARATOR.to_string();
    Ok(tiers
        .iter()
        .map(|tier| tier.join(&URL_SEPARATOR.to_string()))
        .collect::<Vec<_>>()
        .join(&tier_separator))
}

/// Inverse of [`encode_announces`].
#[must_use]
pub fn decode_announces(encoded: &str) -> Vec<Vec<String>> {
    encoded
        .split(TIER_SEPARATOR)
        .map(|tier| tier.split(URL_SEPARATOR).map(str::to_string).collect())
        .collect()
}

/// Hash of the canonical announce serialization.
///
/// # Errors
///
/// Returns an error if any URL contains a reserved separator.
pub fn hash_announces(tiers: &[Vec<String>]) -> FleetResult<String> {
    Ok(hex_digest(encode_announces(tiers)?.as_bytes()))
}
