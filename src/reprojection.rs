use std::sync::Arc;

use log::{info, warn};

use crate::error::InterceptorError;
use crate::forwarder::Forwarder;
use crate::journal::Journal;

/// Replays journaled requests against the (now presumably restored)
/// container, in version order, starting at `from_version`.
///
/// There is no durable watermark in this revision: `reproject(0)` always
/// replays the entire journal from the beginning.
pub struct ReprojectionEngine {
    journal: Arc<dyn Journal>,
    forwarder: Arc<Forwarder>,
}

impl ReprojectionEngine {
    pub fn new(journal: Arc<dyn Journal>, forwarder: Arc<Forwarder>) -> Self {
        Self { journal, forwarder }
    }

    /// Replays every record with `version >= from_version`. Aborts at the
    /// first transport failure without marking anything past that point as
    /// solved, so a half-replayed journal never looks complete.
    pub async fn reproject(&self, from_version: u64) -> Result<u64, InterceptorError> {
        let records = self.journal.get_all_from_last_version(from_version).await?;
        let mut replayed = 0u64;

        for record in records {
            let Some(request) = record.request else {
                warn!("skipping record {} with undecodable snapshot", record.id);
                continue;
            };

            info!("replaying request {} (version {})", record.id, record.version);
            self.forwarder.forward(&request).await?;

            if let Err(e) = self.journal.set_solved(record.id).await {
                warn!("failed to mark replayed request {} solved: {e}", record.id);
            }

            replayed += 1;
        }

        Ok(replayed)
    }
}
