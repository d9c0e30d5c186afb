//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external
//! adapters. The coordinator depends on job execution and reporting only
//! through these ports; the CLI wires the shell-backed executor, tests wire
//! stubs.

use crate::events::Event;
use crate::ids::RunId;
use crate::pipeline::JobDefinition;
use crate::run::{JobResult, RunResult};
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio::sync::broadcast;

/// Stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Event bus for publishing and subscribing to lifecycle events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> Result<()>;

    /// Subscribe to all events published after this call.
    async fn subscribe(&self) -> Result<EventStream>;
}

/// Executes one job inside a fresh isolated environment.
///
/// Step failures, timeouts, and environment-provisioning failures are folded
/// into the returned `JobResult`; they are job-local outcomes, not errors.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, run_id: RunId, name: &str, job: &JobDefinition) -> JobResult;
}

/// External reporting collaborator that receives the final run verdict.
#[async_trait]
pub trait RunReporter: Send + Sync {
    async fn report(&self, result: &RunResult) -> Result<()>;
}

/// In-process event bus backed by a tokio broadcast channel.
///
/// Stands in for a distributed bus; slow subscribers that lag are skipped
/// forward rather than blocking publishers.
pub struct InMemoryEventBus {
    tx: broadcast::Sender<Event>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        // A send error only means nobody is subscribed.
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream> {
        let rx = self.tx.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// Reporter that drops the result; useful where only the returned
/// `RunResult` matters.
pub struct NullReporter;

#[async_trait]
impl RunReporter for NullReporter {
    async fn report(&self, _result: &RunResult) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, RunStartedPayload};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_in_memory_bus_delivers_to_subscriber() {
        let bus = InMemoryEventBus::default();
        let mut stream = bus.subscribe().await.unwrap();

        let event = Event::RunStarted(RunStartedPayload {
            run_id: RunId::new(),
            pipeline_name: "ci".to_string(),
            job_count: 2,
            started_at: chrono::Utc::now(),
        });
        bus.publish(event.clone()).await.unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.subject(), event.subject());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::default();
        let event = Event::RunStarted(RunStartedPayload {
            run_id: RunId::new(),
            pipeline_name: "ci".to_string(),
            job_count: 1,
            started_at: chrono::Utc::now(),
        });
        assert!(bus.publish(event).await.is_ok());
    }
}
