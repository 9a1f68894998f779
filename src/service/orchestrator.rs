use anyhow::{anyhow, Result};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use crate::{
    arbitrage::DetectionEngine,
    config::{Config, SourceKind},
    database::{DatabaseConnection, PgOpportunityStore},
    publisher::{self, BroadcastPublisher, MemoryOpportunityStore, OpportunityStore},
    service::{
        scheduler::{CleanupScheduler, SchedulerIntervals},
        stop_requested, EngineMetrics,
    },
    source::{JsonLinesSource, QuoteSource, SimulatedSource},
    types::{ArbitrageOpportunity, QuoteUpdate, StreamMessage},
};

const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Wires a quote source, the detection engine, the outbound dispatcher and
/// the cleanup timer together for the lifetime of the process.
pub struct DetectorService {
    config: Config,
    engine: Arc<DetectionEngine>,
    publisher: Arc<BroadcastPublisher>,
    store: Arc<dyn OpportunityStore>,
    database: Option<Arc<DatabaseConnection>>,
    metrics: Arc<EngineMetrics>,
    outbound: Mutex<Option<mpsc::Receiver<ArbitrageOpportunity>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl DetectorService {
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing arbitrage detector");

        let mut database = None;
        let store: Arc<dyn OpportunityStore> = match &config.database {
            Some(db_config) => {
                let connection = Arc::new(DatabaseConnection::new(db_config).await?);
                connection.run_migrations().await?;
                let store = Arc::new(PgOpportunityStore::new(connection.pool().clone()));
                database = Some(connection);
                store
            }
            None => {
                info!("No database configured, keeping opportunities in memory");
                Arc::new(MemoryOpportunityStore::new())
            }
        };

        let mut service = Self::with_store(config, store)?;
        service.database = database;
        Ok(service)
    }

    /// Builds the service around an existing store without touching a
    /// database.
    pub fn with_store(config: Config, store: Arc<dyn OpportunityStore>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(EngineMetrics::new());
        let (sender, receiver) = mpsc::channel(config.detector.publish_buffer);
        let engine = Arc::new(DetectionEngine::new(
            &config.detector,
            sender,
            metrics.clone(),
        ));
        let publisher = Arc::new(BroadcastPublisher::new(
            config.broadcast.capacity,
            store.clone(),
        ));
        let (shutdown, _) = watch::channel(false);

        info!(
            "Detector ready: min profit {:.2}%, stake {:.2}, freshness {}s, purge {}s",
            config.detector.min_profit_threshold,
            config.detector.total_stake,
            config.detector.freshness_window_seconds,
            config.detector.purge_window_seconds
        );

        Ok(Self {
            config,
            engine,
            publisher,
            store,
            database: None,
            metrics,
            outbound: Mutex::new(Some(receiver)),
            tasks: Mutex::new(Vec::new()),
            shutdown,
        })
    }

    /// Source selected by configuration.
    pub fn build_source(&self) -> Box<dyn QuoteSource> {
        match self.config.source.kind {
            SourceKind::Simulated => Box::new(SimulatedSource::new(
                self.config.source.sportsbooks.clone(),
                self.config.source.interval_seconds,
            )),
            SourceKind::Stdin => Box::new(JsonLinesSource::stdin()),
        }
    }

    /// Ingests from `source` until it is exhausted or `stop` is called, then
    /// shuts the background tasks down. Can only run once.
    pub async fn run(&self, mut source: Box<dyn QuoteSource>) -> Result<()> {
        let receiver = self
            .outbound
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Detector is already running"))?;

        self.perform_health_checks().await?;
        self.spawn_background_tasks(receiver).await;

        info!("Ingesting quotes from {}", source.name());
        let mut shutdown = self.shutdown.subscribe();
        let result = self.ingest_loop(source.as_mut(), &mut shutdown).await;

        self.shutdown().await;
        result
    }

    async fn ingest_loop(
        &self,
        source: &mut dyn QuoteSource,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            let next = tokio::select! {
                next = source.next_payload() => next,
                _ = stop_requested(shutdown) => {
                    info!("Stop requested, leaving ingest loop");
                    return Ok(());
                }
            };

            match next {
                Ok(Some(payload)) => {
                    // Rejections are counted and logged by the engine.
                    let _ = self.engine.ingest_payload(&payload).await;
                }
                Ok(None) => {
                    info!("Quote source {} exhausted", source.name());
                    return Ok(());
                }
                Err(e) => {
                    error!("Quote source {} failed: {}", source.name(), e);
                    return Err(e);
                }
            }
        }
    }

    async fn spawn_background_tasks(&self, receiver: mpsc::Receiver<ArbitrageOpportunity>) {
        let dispatcher = publisher::spawn_dispatcher(
            receiver,
            self.publisher.clone(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        );

        let intervals = SchedulerIntervals {
            cleanup: Duration::from_secs(self.config.detector.cleanup_interval_seconds),
            report: REPORT_INTERVAL,
        };
        let scheduler = CleanupScheduler::spawn(
            self.engine.clone(),
            self.store.clone(),
            intervals,
            self.shutdown.subscribe(),
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(dispatcher);
        tasks.push(scheduler.into_handle());
        debug!("Spawned {} background tasks", tasks.len());
    }

    async fn perform_health_checks(&self) -> Result<()> {
        info!("Performing health checks");

        if let Some(database) = &self.database {
            database
                .health_check()
                .await
                .map_err(|e| anyhow!("Database health check failed: {}", e))?;
        }

        info!("All health checks passed");
        Ok(())
    }

    /// Signals every task to stop. Safe to call more than once.
    pub fn stop(&self) {
        info!("Stopping arbitrage detector");
        self.shutdown.send_replace(true);
    }

    /// Stops and waits for the dispatcher to drain and the timer to exit.
    pub async fn shutdown(&self) {
        self.stop();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Background task ended abnormally: {}", e);
            }
        }

        if let Some(database) = &self.database {
            database.close().await;
        }

        info!("{}", self.metrics.snapshot().generate_report());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.publisher.subscribe()
    }

    pub fn engine(&self) -> Arc<DetectionEngine> {
        self.engine.clone()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Opportunities a reader would show right now.
    pub async fn active_opportunities(&self) -> Result<Vec<ArbitrageOpportunity>> {
        publisher::active_opportunities(self.store.as_ref(), Utc::now()).await
    }

    pub async fn latest_quotes(&self, event_id: &str) -> Vec<QuoteUpdate> {
        self.engine.latest_quotes(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BroadcastConfig, DetectorConfig, SourceConfig};
    use std::io::Cursor;
    use tokio::time::timeout;

    fn create_test_config() -> Config {
        Config {
            detector: DetectorConfig::default(),
            source: SourceConfig {
                kind: SourceKind::Stdin,
                sportsbooks: Vec::new(),
                interval_seconds: 5,
            },
            broadcast: BroadcastConfig::default(),
            database: None,
        }
    }

    fn create_test_line(source: &str, home_odds: f64, away_odds: f64) -> String {
        serde_json::json!({
            "id": format!("q-{}", source),
            "event_id": "lakers-vs-celtics",
            "sport": "NBA",
            "home_team": "Lakers",
            "away_team": "Celtics",
            "bookmaker": source,
            "home_odds": home_odds,
            "away_odds": away_odds,
            "market_type": "moneyline",
            "timestamp": Utc::now().to_rfc3339()
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let service = DetectorService::with_store(
            create_test_config(),
            Arc::new(MemoryOpportunityStore::new()),
        )
        .unwrap();
        let mut subscriber = service.subscribe();

        let input = format!(
            "{}\n{{broken json\n{}\n",
            create_test_line("draftkings", 2.10, 2.05),
            create_test_line("fanduel", 1.95, 2.20)
        );
        let source = JsonLinesSource::new("fixture", Cursor::new(input.into_bytes()));

        timeout(Duration::from_secs(5), service.run(Box::new(source)))
            .await
            .unwrap()
            .unwrap();

        let message = timeout(Duration::from_secs(1), subscriber.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.data.source_home, "draftkings");
        assert_eq!(message.data.source_away, "fanduel");

        let active = service.active_opportunities().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, message.data.id);

        assert_eq!(service.latest_quotes("lakers-vs-celtics").await.len(), 2);

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.quotes_ingested, 2);
        assert_eq!(snapshot.quotes_rejected, 1);
        assert_eq!(snapshot.opportunities_detected, 1);
        assert_eq!(snapshot.opportunities_published, 1);
        assert_eq!(snapshot.opportunities_dropped, 0);
    }

    #[tokio::test]
    async fn test_non_utf8_line_does_not_stop_ingestion() {
        let service = DetectorService::with_store(
            create_test_config(),
            Arc::new(MemoryOpportunityStore::new()),
        )
        .unwrap();

        let mut input = create_test_line("draftkings", 2.10, 2.05).into_bytes();
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(create_test_line("fanduel", 1.95, 2.20).as_bytes());
        input.push(b'\n');
        let source = JsonLinesSource::new("fixture", Cursor::new(input));

        timeout(Duration::from_secs(5), service.run(Box::new(source)))
            .await
            .unwrap()
            .unwrap();

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.quotes_ingested, 2);
        assert_eq!(snapshot.quotes_rejected, 1);
        assert_eq!(snapshot.opportunities_detected, 1);
        assert_eq!(service.active_opportunities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_only_once() {
        let service = DetectorService::with_store(
            create_test_config(),
            Arc::new(MemoryOpportunityStore::new()),
        )
        .unwrap();

        let empty = JsonLinesSource::new("empty", Cursor::new(Vec::new()));
        service.run(Box::new(empty)).await.unwrap();

        let empty = JsonLinesSource::new("empty", Cursor::new(Vec::new()));
        assert!(service.run(Box::new(empty)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = create_test_config();
        config.detector.purge_window_seconds = 10;
        let store = Arc::new(MemoryOpportunityStore::new());
        assert!(DetectorService::with_store(config, store).is_err());
    }
}
