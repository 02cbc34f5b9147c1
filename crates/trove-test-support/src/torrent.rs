//! Builder for small, valid bencoded torrent descriptions.

use trove_torrent_core::bencode::{self, Value};
use trove_torrent_core::{ContentIdentity, FleetResult, derive_identity};

const PIECE_LENGTH: i64 = 16_384;

/// Describes a single-file torrent for tests.
#[derive(Debug, Clone)]
pub struct TorrentFixture {
    name: String,
    length: i64,
    announce: String,
    tiers: Vec<Vec<String>>,
}

impl TorrentFixture {
    /// Single-tracker torrent for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            length: 1_048_576,
            announce: "http://tracker.example/announce".to_string(),
            tiers: Vec::new(),
        }
    }

    /// Override the primary announce URL.
    #[must_use]
    pub fn announce(mut self, url: &str) -> Self {
        self.announce = url.to_string();
        self
    }

    /// Append a tier to the `announce-list`.
    #[must_use]
    pub fn tier(mut self, urls: &[&str]) -> Self {
        self.tiers
            .push(urls.iter().map(|url| (*url).to_string()).collect());
        self
    }

    /// Override the payload size.
    #[must_use]
    pub const fn length(mut self, length: i64) -> Self {
        self.length = length;
        self
    }

    /// Encoded torrent description.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        let pieces: Vec<u8> = self.name.bytes().cycle().take(20).collect();
        let info = Value::dict([
            ("length", Value::Integer(self.length)),
            ("name", Value::bytes(&self.name)),
            ("piece length", Value::Integer(PIECE_LENGTH)),
            ("pieces", Value::bytes(pieces)),
        ]);
        let mut entries = vec![
            ("announce", Value::bytes(&self.announce)),
            ("info", info),
        ];
        if !self.tiers.is_empty() {
            let tiers = self
                .tiers
                .iter()
                .map(|tier| Value::List(tier.iter().map(Value::bytes).collect()))
                .collect();
            entries.push(("announce-list", Value::List(tiers)));
        }
        bencode::encode(&Value::dict(entries))
    }

    /// Identity of the encoded description.
    ///
    /// # Errors
    ///
    /// Propagates identity derivation failures.
    pub fn identity(&self) -> FleetResult<ContentIdentity> {
        derive_identity(&self.bytes())
    }

    /// Payload name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_list_overrides_announce() -> FleetResult<()> {
        let plain = TorrentFixture::new("album").identity()?;
        assert_eq!(
            plain.announce_tiers,
            vec![vec!["http://tracker.example/announce".to_string()]]
        );

        let tiered = TorrentFixture::new("album")
            .tier(&["http://a/announce", "http://b/announce"])
            .identity()?;
        assert_eq!(plain.content_hash, tiered.content_hash);
        assert_ne!(plain.announce_set_hash, tiered.announce_set_hash);
        Ok(())
    }

    #[test]
    fn names_change_content_hash() -> FleetResult<()> {
        let first = TorrentFixture::new("first").identity()?;
        let second = TorrentFixture::new("second").identity()?;
        assert_ne!(first.content_hash, second.content_hash);
        Ok(())
    }
}
