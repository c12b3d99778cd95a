use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use pulse_api::storage::MeasureStore;

use crate::alarm::{AlarmEvent, AlarmMonitor};
use crate::archive::ColdArchiveWriter;
use crate::config::PulseConfig;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::log::RecordLog;
use crate::object_store::FsObjectStore;
use crate::signals::PipelineSignals;
use crate::sink::DurableSinkWriter;
use crate::store::{FileMeasureStore, MemoryMeasureStore, TieredMeasureStore};

/// Per-task shutdown + join handle.
struct TaskSlot {
    name: String,
    handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// The running pipeline — log, stores, consumer tasks and the alarm
/// evaluator.
pub struct Engine {
    log: Arc<RecordLog>,
    store: Arc<dyn MeasureStore>,
    signals: Arc<PipelineSignals>,
    alarm_events: broadcast::Sender<AlarmEvent>,
    tasks: Vec<TaskSlot>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.tasks.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Engine {
    /// Build stores and sinks from the configuration and spawn one
    /// dispatcher task per log shard plus the alarm evaluator.
    pub async fn bootstrap(config: PulseConfig) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| EngineError::Config(format!("data_dir {}: {e}", config.data_dir)))?;

        let signals = Arc::new(PipelineSignals::default());

        let log = Arc::new(RecordLog::new(config.shards, config.log_max_entries));

        let recent = Arc::new(MemoryMeasureStore::new(config.recent_max_points));
        let retention = Arc::new(FileMeasureStore::new(
            std::path::Path::new(&config.data_dir).join("measurements"),
        ));
        let store: Arc<dyn MeasureStore> = Arc::new(TieredMeasureStore::new(
            recent,
            retention,
            config.store_retry_attempts,
            signals.clone(),
        ));

        let objects = Arc::new(FsObjectStore::new(
            std::path::Path::new(&config.data_dir).join("objects"),
        ));

        let sink = Arc::new(DurableSinkWriter::new(
            store.clone(),
            objects.clone(),
            config.region.clone(),
            config.dedup_window,
        ));
        let archive = Arc::new(ColdArchiveWriter::new(objects));

        let dispatcher = Arc::new(Dispatcher::new(
            log.clone(),
            sink,
            archive,
            signals.clone(),
            config.batch_size,
            // Retries come on top of the first attempt.
            config.max_batch_retries + 1,
            Duration::from_millis(config.batch_timeout_ms),
        ));

        let mut tasks = Vec::new();
        for shard in 0..log.shard_count() {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let d = dispatcher.clone();
            let handle = tokio::spawn(async move { d.run_shard(shard, shutdown_rx).await });
            tracing::info!(shard, "spawned dispatcher");
            tasks.push(TaskSlot {
                name: format!("dispatcher-{shard}"),
                handle,
                shutdown_tx,
            });
        }

        let monitor = AlarmMonitor::new(
            &config.alarms,
            signals.clone(),
            Duration::from_millis(config.evaluation_interval_ms),
        );
        let alarm_events = monitor.events_sender();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));
        tasks.push(TaskSlot {
            name: "alarm-monitor".into(),
            handle,
            shutdown_tx,
        });

        Ok(Engine {
            log,
            store,
            signals,
            alarm_events,
            tasks,
        })
    }

    /// The log's producer side (ingest surface).
    pub fn log(&self) -> Arc<RecordLog> {
        self.log.clone()
    }

    /// The measure store's read side (query surface).
    pub fn measure_store(&self) -> Arc<dyn MeasureStore> {
        self.store.clone()
    }

    pub fn signals(&self) -> Arc<PipelineSignals> {
        self.signals.clone()
    }

    /// Downstream automated-response channel.
    pub fn subscribe_alarms(&self) -> broadcast::Receiver<AlarmEvent> {
        self.alarm_events.subscribe()
    }

    /// Stop every task and wait for it to finish.
    pub async fn shutdown(self) {
        for slot in self.tasks {
            tracing::info!(task = %slot.name, "stopping");
            let _ = slot.shutdown_tx.send(true);
            let _ = slot.handle.await;
        }
    }
}
