use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    arbitrage::DetectionEngine,
    publisher::OpportunityStore,
    service::{stop_requested, EngineMetrics},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    CachePurged { removed: usize },
    StorePurged { removed: u64 },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerIntervals {
    pub cleanup: Duration,
    pub report: Duration,
}

/// Background timer that sweeps the quote cache and the opportunity store
/// and periodically logs the engine counters. Runs until shutdown is
/// signalled on the watch channel.
pub struct CleanupScheduler {
    event_receiver: broadcast::Receiver<SchedulerEvent>,
    handle: JoinHandle<()>,
}

impl CleanupScheduler {
    pub fn spawn(
        engine: Arc<DetectionEngine>,
        store: Arc<dyn OpportunityStore>,
        intervals: SchedulerIntervals,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (event_sender, event_receiver) = broadcast::channel(64);
        let handle = tokio::spawn(Self::run_scheduler(
            engine,
            store,
            intervals,
            shutdown,
            event_sender,
        ));

        Self {
            event_receiver,
            handle,
        }
    }

    pub async fn next_event(&mut self) -> Result<SchedulerEvent> {
        self.event_receiver
            .recv()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to receive scheduler event: {}", e))
    }

    pub fn into_handle(self) -> JoinHandle<()> {
        self.handle
    }

    async fn run_scheduler(
        engine: Arc<DetectionEngine>,
        store: Arc<dyn OpportunityStore>,
        intervals: SchedulerIntervals,
        mut shutdown: watch::Receiver<bool>,
        event_sender: broadcast::Sender<SchedulerEvent>,
    ) {
        info!(
            "Cleanup scheduler started: sweep every {:?}, report every {:?}",
            intervals.cleanup, intervals.report
        );

        let metrics: Arc<EngineMetrics> = engine.metrics();
        let mut cleanup_interval = interval(intervals.cleanup);
        cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report_interval = interval(intervals.report);
        report_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first report tick fires immediately; skip the empty report.
        report_interval.tick().await;

        loop {
            tokio::select! {
                _ = stop_requested(&mut shutdown) => break,

                _ = cleanup_interval.tick() => {
                    let removed = engine.purge().await;
                    let _ = event_sender.send(SchedulerEvent::CachePurged { removed });

                    match store.purge_expired().await {
                        Ok(removed) => {
                            debug!("Store sweep removed {} expired opportunities", removed);
                            let _ = event_sender.send(SchedulerEvent::StorePurged { removed });
                        }
                        Err(e) => warn!("Failed to purge expired opportunities: {}", e),
                    }
                }

                _ = report_interval.tick() => {
                    info!("{}", metrics.snapshot().generate_report());
                }
            }
        }

        let _ = event_sender.send(SchedulerEvent::Stopped);
        info!("Cleanup scheduler stopped");
    }
}
