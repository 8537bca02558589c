//! Dispatch Queue
//!
//! Evaluation hands fire events to a bounded channel and moves on; the worker
//! drains it, running up to `max_in_flight` sink requests concurrently.

use rule_model::FireEvent;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchConfig, Dispatcher};
use crate::sink::FireEventSink;
use crate::DispatchError;

/// Cloneable, non-blocking entry point into the dispatch queue
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<FireEvent>,
}

impl DispatchHandle {
    /// Events currently buffered
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

impl FireEventSink for DispatchHandle {
    fn submit(&self, event: FireEvent) -> Result<(), DispatchError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::Overloaded,
            TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Drains the dispatch queue into the sinks
pub struct DispatchWorker {
    receiver: mpsc::Receiver<FireEvent>,
    dispatcher: Arc<Dispatcher>,
    max_in_flight: usize,
    grace: Duration,
}

impl DispatchWorker {
    pub(crate) fn channel(
        dispatcher: Arc<Dispatcher>,
        config: &DispatchConfig,
    ) -> (DispatchHandle, Self) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let max_in_flight = config.max_in_flight.clamp(1, u32::MAX as usize);
        info!(
            "Creating dispatch queue: capacity={}, max_in_flight={}",
            config.queue_capacity, max_in_flight
        );

        let worker = Self {
            receiver,
            dispatcher,
            max_in_flight,
            grace: config.grace(),
        };
        (DispatchHandle { sender }, worker)
    }

    /// Run until `shutdown` resolves or every handle is dropped.
    ///
    /// On shutdown the queue stops accepting events, already queued events
    /// are still dispatched, and in-flight requests get the grace period to
    /// finish. Returns the number of events taken off the queue.
    pub async fn run<S>(mut self, shutdown: S) -> u64
    where
        S: Future<Output = ()>,
    {
        info!("Starting dispatch worker");
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut dispatched = 0u64;

        tokio::pin!(shutdown);
        let mut closing = false;

        loop {
            let event = tokio::select! {
                _ = &mut shutdown, if !closing => {
                    info!("Dispatch worker closing queue");
                    self.receiver.close();
                    closing = true;
                    continue;
                }
                event = self.receiver.recv() => event,
            };

            let Some(event) = event else {
                debug!("Dispatch queue drained");
                break;
            };

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let _ = dispatcher.dispatch(&event).await;
                drop(permit);
            });
            dispatched += 1;
        }

        let in_flight = self.max_in_flight as u32;
        match timeout(self.grace, permits.acquire_many(in_flight)).await {
            Ok(_) => info!("Dispatch worker stopped after {} events", dispatched),
            Err(_) => warn!(
                "Dispatch worker stopped with requests still in flight after {:?}",
                self.grace
            ),
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::test_support::{actuator_event, alert_event, RecordingObserver, RecordingSink};
    use std::sync::atomic::Ordering;
    use tokio::sync::oneshot;

    fn config(queue_capacity: usize) -> DispatchConfig {
        DispatchConfig {
            queue_capacity,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_queue_fails_fast() {
        let dispatcher = Dispatcher::new(
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingSink::default()),
            Arc::new(NoopObserver),
            &config(2),
        );
        let (handle, _worker) = dispatcher.channel(&config(2));

        handle.submit(alert_event(1)).unwrap();
        handle.submit(alert_event(2)).unwrap();
        assert_eq!(handle.queued(), 2);
        assert!(matches!(handle.submit(alert_event(3)), Err(DispatchError::Overloaded)));
    }

    #[test]
    fn test_closed_queue_reported() {
        let dispatcher = Dispatcher::new(
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingSink::default()),
            Arc::new(NoopObserver),
            &config(2),
        );
        let (handle, worker) = dispatcher.channel(&config(2));
        drop(worker);

        assert!(matches!(handle.submit(alert_event(1)), Err(DispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        let alerts = Arc::new(RecordingSink::default());
        let actuators = Arc::new(RecordingSink::default());
        let observer = Arc::new(RecordingObserver::default());
        let dispatcher = Dispatcher::new(alerts.clone(), actuators.clone(), observer.clone(), &config(16));
        let (handle, worker) = dispatcher.channel(&config(16));

        for i in 0..5 {
            handle.submit(alert_event(i)).unwrap();
        }
        handle.submit(actuator_event(9, 11)).unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        stop_tx.send(()).unwrap();
        let dispatched = worker
            .run(async {
                let _ = stop_rx.await;
            })
            .await;

        assert_eq!(dispatched, 6);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 5);
        assert_eq!(actuators.commands.lock().unwrap().len(), 1);
        assert_eq!(observer.succeeded.load(Ordering::SeqCst), 6);
        assert!(matches!(handle.submit(alert_event(7)), Err(DispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_worker_stops_when_handles_dropped() {
        let alerts = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            alerts.clone(),
            Arc::new(RecordingSink::default()),
            Arc::new(NoopObserver),
            &config(4),
        );
        let (handle, worker) = dispatcher.channel(&config(4));
        handle.submit(alert_event(1)).unwrap();
        drop(handle);

        let dispatched = worker.run(std::future::pending()).await;
        assert_eq!(dispatched, 1);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_bounds_shutdown() {
        let alerts = Arc::new(RecordingSink {
            delay: Some(Duration::from_secs(3)),
            ..Default::default()
        });
        let observer = Arc::new(RecordingObserver::default());
        let cfg = DispatchConfig {
            timeout_ms: 60_000,
            shutdown_grace_ms: 1_000,
            ..config(4)
        };
        let dispatcher = Dispatcher::new(alerts.clone(), Arc::new(RecordingSink::default()), observer, &cfg);
        let (handle, worker) = dispatcher.channel(&cfg);
        handle.submit(alert_event(1)).unwrap();
        drop(handle);

        let started = tokio::time::Instant::now();
        assert_eq!(worker.run(std::future::pending()).await, 1);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(alerts.alerts.lock().unwrap().is_empty());
    }
}
