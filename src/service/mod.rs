pub mod metrics;
pub mod orchestrator;
pub mod scheduler;

pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use orchestrator::DetectorService;
pub use scheduler::{CleanupScheduler, SchedulerEvent, SchedulerIntervals};

use tokio::sync::watch;

/// Resolves once the stop flag is raised, including when it was raised before
/// this receiver first looked, or when the sender is gone.
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
