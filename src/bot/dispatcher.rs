//! Top-level update loop with bounded parallelism.

use crate::bot::event::InboundEvent;
use crate::bot::handlers::EventHandler;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumes inbound events, running at most `concurrency` of them at once
pub struct Dispatcher {
    handler: EventHandler,
    limit: Arc<Semaphore>,
    permits: u32,
}

impl Dispatcher {
    /// Create a dispatcher. A zero limit is raised to one.
    #[must_use]
    pub fn new(handler: EventHandler, concurrency: usize) -> Self {
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX).max(1);
        Self {
            handler,
            limit: Arc::new(Semaphore::new(permits as usize)),
            permits,
        }
    }

    /// Run until `events` ends or `shutdown` fires, then wait for in-flight work.
    ///
    /// A permit is taken before each unit of work is spawned, so a saturated
    /// dispatcher stops pulling from `events` until something finishes.
    pub async fn run<S>(&self, events: S, shutdown: CancellationToken)
    where
        S: Stream<Item = InboundEvent>,
    {
        let mut events = std::pin::pin!(events);

        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting updates");
                    break;
                }
                next = events.next() => match next {
                    Some(event) => event,
                    None => {
                        info!("Update stream ended");
                        break;
                    }
                },
            };

            if matches!(event, InboundEvent::Ignorable) {
                debug!("Ignoring update");
                continue;
            }

            let permit = tokio::select! {
                () = shutdown.cancelled() => {
                    info!(kind = event.kind(), "Shutdown requested, dropping pending event");
                    break;
                }
                permit = Arc::clone(&self.limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!(error = %e, "Concurrency limiter closed");
                        break;
                    }
                },
            };

            let handler = self.handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                handler.process(event).await;
            });
        }

        self.drain().await;
    }

    /// Wait until every spawned unit of work has released its permit
    async fn drain(&self) {
        let in_flight = self.permits as usize - self.limit.available_permits();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight updates");
        }
        match self.limit.acquire_many(self.permits).await {
            Ok(_all) => debug!("Dispatcher drained"),
            Err(e) => warn!(error = %e, "Failed to drain dispatcher"),
        }
    }
}
