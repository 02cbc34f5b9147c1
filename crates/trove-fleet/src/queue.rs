//! Admission backlog: entries wait here until a placement succeeds.

use tracing::{info, warn};
use trove_store::StoreError;
use trove_torrent_core::{FleetError, FleetResult, NewQueuedAddition, RecordKey};

use crate::manager::{AddedItem, FleetManager};

/// What one drain step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue was empty.
    Empty,
    /// The head entry was placed and removed.
    Placed(AddedItem),
    /// The head entry was already placed; it was removed.
    AlreadyPlaced {
        /// Queue entry that was dropped.
        queue_id: i64,
    },
    /// The head entry's torrent file is gone from the content store; it was removed.
    Discarded {
        /// Queue entry that was dropped.
        queue_id: i64,
    },
}

impl FleetManager {
    /// Queue an admission. Returns `false` when the identity is already queued.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::PersistFailure`] when the queue cannot be written.
    pub async fn enqueue(
        &self,
        key: RecordKey,
        destination_path: impl Into<String>,
        priority_delay: i32,
    ) -> FleetResult<bool> {
        let entry = NewQueuedAddition {
            key,
            priority_delay,
            destination_path: destination_path.into(),
        };
        let inserted = self.store.enqueue(&entry).await?;
        if inserted {
            self.metrics.set_queue_depth(self.store.queue_len().await?);
        }
        Ok(inserted)
    }

    /// Try to place the highest-priority queued admission.
    ///
    /// The entry is removed once placed or found already placed; any other
    /// failure keeps it queued and is returned.
    ///
    /// # Errors
    ///
    /// Returns the placement, content store, or record store failure.
    pub async fn drain_one(&self) -> FleetResult<DrainOutcome> {
        let Some(entry) = self.store.queue_head().await? else {
            return Ok(DrainOutcome::Empty);
        };
        let key = &entry.key;
        let bytes = match self
            .content
            .get(&key.announce_set_hash, &key.content_hash)
            .await
        {
            Ok(bytes) => bytes,
            Err(StoreError::Missing { path }) => {
                warn!(
                    queue_id = entry.id,
                    key = %key,
                    path = %path.display(),
                    "queued torrent file is missing, dropping entry"
                );
                self.store.remove_queued(entry.id).await?;
                return Ok(DrainOutcome::Discarded { queue_id: entry.id });
            }
            Err(err) => return Err(err.into()),
        };

        match self.add_item(&bytes, &entry.destination_path).await {
            Ok(added) => {
                self.store.remove_queued(entry.id).await?;
                info!(queue_id = entry.id, key = %key, "queued torrent placed");
                Ok(DrainOutcome::Placed(added))
            }
            Err(FleetError::AlreadyPlaced { .. }) => {
                self.store.remove_queued(entry.id).await?;
                info!(queue_id = entry.id, key = %key, "queued torrent was already placed");
                Ok(DrainOutcome::AlreadyPlaced { queue_id: entry.id })
            }
            Err(err) => {
                warn!(
                    queue_id = entry.id,
                    key = %key,
                    error = %err,
                    "queued torrent could not be placed, keeping entry"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use trove_data::FleetStore;
    use trove_test_support::TorrentFixture;

    use crate::testing::harness;

    #[tokio::test]
    async fn empty_queue_is_a_no_op() -> Result<(), Box<dyn Error>> {
        let harness = harness(1).await?;
        assert_eq!(harness.manager.drain_one().await?, DrainOutcome::Empty);
        Ok(())
    }

    #[tokio::test]
    async fn queued_torrent_is_placed_then_removed() -> Result<(), Box<dyn Error>> {
        let harness = harness(1).await?;
        let identity = harness
            .manager
            .content()
            .put(&TorrentFixture::new("album").bytes())
            .await?;
        assert!(harness.manager.enqueue(identity.key(), "/downloads/7", 0).await?);
        assert!(!harness.manager.enqueue(identity.key(), "/downloads/7", 0).await?);

        let outcome = harness.manager.drain_one().await?;
        assert!(matches!(outcome, DrainOutcome::Placed(ref added) if added.identity == identity));
        assert_eq!(harness.backends[0].added()[0].destination_path, "/downloads/7");
        assert_eq!(harness.store.queue_len().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn already_placed_entry_is_dropped() -> Result<(), Box<dyn Error>> {
        let harness = harness(1).await?;
        let bytes = TorrentFixture::new("album").bytes();
        let identity = harness.manager.content().put(&bytes).await?;
        harness.manager.add_item(&bytes, "/downloads/1").await?;
        harness.manager.enqueue(identity.key(), "/downloads/1", 0).await?;

        assert!(matches!(
            harness.manager.drain_one().await?,
            DrainOutcome::AlreadyPlaced { .. }
        ));
        assert_eq!(harness.store.queue_len().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_placement_keeps_the_entry() -> Result<(), Box<dyn Error>> {
        let harness = harness(1).await?;
        let identity = harness
            .manager
            .content()
            .put(&TorrentFixture::new("album").bytes())
            .await?;
        harness.manager.enqueue(identity.key(), "/downloads/1", 0).await?;
        harness.backends[0].set_unavailable(true);

        assert!(harness.manager.drain_one().await.is_err());
        assert_eq!(harness.store.queue_len().await?, 1);

        harness.backends[0].set_unavailable(false);
        assert!(matches!(
            harness.manager.drain_one().await?,
            DrainOutcome::Placed(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_discards_the_entry() -> Result<(), Box<dyn Error>> {
        let harness = harness(1).await?;
        let identity = TorrentFixture::new("album").identity()?;
        harness.manager.enqueue(identity.key(), "/downloads/1", 0).await?;

        assert!(matches!(
            harness.manager.drain_one().await?,
            DrainOutcome::Discarded { .. }
        ));
        assert_eq!(harness.store.queue_len().await?, 0);
        Ok(())
    }
}
