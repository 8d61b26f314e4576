//! Resource-keyed "data changed" signalling between mutations and tables.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::model::resource::Resource;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct InvalidationBus {
    tx: broadcast::Sender<Resource>,
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InvalidationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announces that lists of `resource` changed. Returns how many tables heard it.
    pub fn publish(&self, resource: Resource) -> usize {
        let receivers = self.tx.send(resource).unwrap_or(0);
        tracing::debug!(%resource, receivers, "Published invalidation");
        receivers
    }

    pub fn subscribe(&self, resource: Resource) -> Invalidations {
        Invalidations {
            rx: self.tx.subscribe(),
            resource,
        }
    }
}

/// Invalidations of one resource.
#[derive(Debug)]
pub struct Invalidations {
    rx: broadcast::Receiver<Resource>,
    resource: Resource,
}

impl Invalidations {
    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Waits for the next invalidation of this resource or of one it embeds.
    ///
    /// A lagged receiver may have missed one, so lag counts as an invalidation.
    /// Returns `None` once every bus handle is gone.
    pub async fn next(&mut self) -> Option<()> {
        loop {
            match self.rx.recv().await {
                Ok(changed) if self.resource.affected_by(changed) => return Some(()),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(resource = %self.resource, skipped, "Invalidation receiver lagged");
                    return Some(());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
