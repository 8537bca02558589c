//! Reading Pipeline
//!
//! Readings are sharded across workers by deployment id, so all readings
//! for one deployment are evaluated in arrival order by the same worker.

use rule_model::Reading;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::evaluator::Evaluator;
use crate::PipelineError;

/// Reading pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Evaluation workers
    pub workers: usize,
    /// Buffered readings per worker
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Cloneable entry point for reading sources
#[derive(Clone)]
pub struct ReadingSender {
    shards: Arc<[mpsc::Sender<Reading>]>,
}

impl ReadingSender {
    /// Queue a reading, waiting for capacity
    pub async fn send(&self, reading: Reading) -> Result<(), PipelineError> {
        self.shard(&reading)
            .send(reading)
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Queue a reading without waiting
    pub fn try_send(&self, reading: Reading) -> Result<(), PipelineError> {
        self.shard(&reading).try_send(reading).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::Full,
            TrySendError::Closed(_) => PipelineError::Closed,
        })
    }

    fn shard(&self, reading: &Reading) -> &mpsc::Sender<Reading> {
        let index = reading.sensor_deployment_id.0 % self.shards.len() as u64;
        &self.shards[index as usize]
    }
}

/// Worker pool draining readings into an evaluator
pub struct ReadingPipeline {
    sender: ReadingSender,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<u64>>,
}

impl ReadingPipeline {
    /// Spawn the workers. Must be called within a tokio runtime.
    pub fn start(evaluator: Arc<Evaluator>, config: &PipelineConfig) -> Self {
        let worker_count = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);
        info!(
            "Starting reading pipeline: workers={}, queue_capacity={}",
            worker_count, capacity
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut shards = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let (tx, rx) = mpsc::channel(capacity);
            shards.push(tx);
            workers.push(tokio::spawn(run_worker(
                index,
                rx,
                shutdown_rx.clone(),
                Arc::clone(&evaluator),
            )));
        }

        Self {
            sender: ReadingSender {
                shards: Arc::from(shards),
            },
            shutdown,
            workers,
        }
    }

    /// A sender for a reading source
    pub fn sender(&self) -> ReadingSender {
        self.sender.clone()
    }

    /// Stop accepting readings, drain what is queued, and join the workers.
    ///
    /// Returns the number of readings evaluated.
    pub async fn shutdown(self) -> u64 {
        info!("Shutting down reading pipeline");
        let _ = self.shutdown.send(true);

        let mut evaluated = 0;
        for worker in self.workers {
            match worker.await {
                Ok(count) => evaluated += count,
                Err(e) => warn!("Reading worker failed: {}", e),
            }
        }
        info!("Reading pipeline stopped after {} readings", evaluated);
        evaluated
    }
}

async fn run_worker(
    index: usize,
    mut readings: mpsc::Receiver<Reading>,
    mut shutdown: watch::Receiver<bool>,
    evaluator: Arc<Evaluator>,
) -> u64 {
    debug!("Reading worker {} started", index);
    let mut evaluated = 0;
    let mut closing = false;

    loop {
        let reading = tokio::select! {
            changed = shutdown.changed(), if !closing => {
                if changed.is_err() || *shutdown.borrow() {
                    readings.close();
                    closing = true;
                }
                continue;
            }
            reading = readings.recv() => reading,
        };

        let Some(reading) = reading else {
            break;
        };
        evaluator.on_reading(&reading);
        evaluated += 1;
    }

    debug!("Reading worker {} stopped after {} readings", index, evaluated);
    evaluated
}
