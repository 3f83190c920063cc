//! Process-wide registry of initialised queue clients.
//!
//! One [`QueueClient`] exists per distinct queue name for the lifetime of the
//! registry. Handing out a second, independent client for the same queue would
//! split its view of the dedup cache, so creation is serialised per name: when
//! several callers race for the same queue, exactly one client is constructed
//! and initialised and every caller receives that instance.

use crate::client::{QueueClient, QueueTransport};
use crate::dedup::DedupCache;
use crate::error::QueueError;
use crate::message::QueueName;
use crate::provider::ReceiveSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

type ClientSlot = Arc<OnceCell<Arc<QueueClient>>>;

/// Lazily creates and caches one initialised client per queue name
///
/// Entries are never evicted. A failed initialisation leaves the slot empty,
/// so a later call for the same name tries again.
pub struct QueueClientRegistry {
    transport: Arc<dyn QueueTransport>,
    dedup: DedupCache,
    settings: ReceiveSettings,
    clients: Mutex<HashMap<QueueName, ClientSlot>>,
}

impl QueueClientRegistry {
    /// Create an empty registry whose clients share `transport` and `dedup`
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        dedup: DedupCache,
        settings: ReceiveSettings,
    ) -> Self {
        Self {
            transport,
            dedup,
            settings,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Get the client for a queue, creating and initialising it on first use
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ValidationError`] for an invalid queue name and
    /// whatever the transport reports when the queue address cannot be resolved
    /// (typically [`QueueError::QueueNotFound`]).
    pub async fn get_or_create(&self, queue_name: &str) -> Result<Arc<QueueClient>, QueueError> {
        let name = QueueName::new(queue_name.trim().to_string())?;

        let slot = {
            let mut clients = self.clients.lock().await;
            Arc::clone(clients.entry(name.clone()).or_default())
        };

        let client = slot
            .get_or_try_init(|| async {
                debug!(queue = %name, "Creating queue client");
                let client = QueueClient::new(
                    name.clone(),
                    Arc::clone(&self.transport),
                    self.dedup.clone(),
                    self.settings.clone(),
                );

                if let Err(e) = client.initialise().await {
                    warn!(queue = %name, error = %e, "Queue client initialisation failed");
                    return Err(e);
                }

                info!(queue = %name, "Queue client registered");
                Ok(Arc::new(client))
            })
            .await?;

        Ok(Arc::clone(client))
    }

    /// Check whether an initialised client exists for the queue
    pub async fn contains(&self, queue_name: &str) -> bool {
        let clients = self.clients.lock().await;
        clients
            .iter()
            .any(|(name, slot)| name.as_str() == queue_name && slot.initialized())
    }

    /// Number of initialised clients
    pub async fn len(&self) -> usize {
        let clients = self.clients.lock().await;
        clients.values().filter(|slot| slot.initialized()).count()
    }

    /// Check whether no client has been initialised yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Dedup cache shared by every client of this registry
    pub fn dedup_cache(&self) -> &DedupCache {
        &self.dedup
    }
}

impl std::fmt::Debug for QueueClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueClientRegistry")
            .field("provider", &self.transport.provider_type())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
