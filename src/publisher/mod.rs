pub mod store;

pub use store::{active_opportunities, MemoryOpportunityStore, OpportunityStore};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    service::{stop_requested, EngineMetrics},
    types::{ArbitrageOpportunity, StreamMessage},
};

/// Outbound side of the engine. Neither call is retried.
#[async_trait]
pub trait OpportunityPublisher: Send + Sync {
    /// At-most-once push to real-time subscribers.
    async fn publish(&self, opportunity: &ArbitrageOpportunity) -> Result<()>;

    async fn persist(&self, opportunity: &ArbitrageOpportunity, ttl: Duration) -> Result<()>;
}

/// Broadcasts to in-process subscribers and persists through a store.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<StreamMessage>,
    store: Arc<dyn OpportunityStore>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize, store: Arc<dyn OpportunityStore>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, store }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl OpportunityPublisher for BroadcastPublisher {
    async fn publish(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        match self.sender.send(StreamMessage::arbitrage(opportunity.clone())) {
            Ok(subscribers) => debug!(
                "Broadcast opportunity {} to {} subscribers",
                opportunity.id, subscribers
            ),
            // Nobody listening is not a failure for at-most-once delivery.
            Err(_) => debug!("No subscribers for opportunity {}", opportunity.id),
        }
        Ok(())
    }

    async fn persist(&self, opportunity: &ArbitrageOpportunity, ttl: Duration) -> Result<()> {
        self.store.save(opportunity, ttl).await
    }
}

/// Drains the engine's outbound queue. Each opportunity is published then
/// persisted with a ttl equal to its horizon; failures are counted and logged,
/// never retried. On shutdown the queue is closed to new work and whatever is
/// already buffered is still delivered.
pub fn spawn_dispatcher(
    receiver: mpsc::Receiver<ArbitrageOpportunity>,
    publisher: Arc<dyn OpportunityPublisher>,
    metrics: Arc<EngineMetrics>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_dispatcher(receiver, publisher, metrics, shutdown))
}

async fn run_dispatcher(
    mut receiver: mpsc::Receiver<ArbitrageOpportunity>,
    publisher: Arc<dyn OpportunityPublisher>,
    metrics: Arc<EngineMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Opportunity dispatcher started");

    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Some(opportunity) => dispatch(publisher.as_ref(), &metrics, opportunity).await,
                None => break,
            },
            _ = stop_requested(&mut shutdown) => {
                receiver.close();
                while let Some(opportunity) = receiver.recv().await {
                    dispatch(publisher.as_ref(), &metrics, opportunity).await;
                }
                break;
            }
        }
    }

    info!("Opportunity dispatcher stopped");
}

async fn dispatch(
    publisher: &dyn OpportunityPublisher,
    metrics: &EngineMetrics,
    opportunity: ArbitrageOpportunity,
) {
    if let Err(e) = publisher.publish(&opportunity).await {
        metrics.record_publish_failure();
        warn!("Failed to publish opportunity {}: {}", opportunity.id, e);
    } else {
        metrics.record_published();
    }

    let ttl = opportunity.expires_at - opportunity.created_at;
    if let Err(e) = publisher.persist(&opportunity, ttl).await {
        metrics.record_persist_failure();
        warn!("Failed to persist opportunity {}: {}", opportunity.id, e);
    }
}
