use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::stream::LogEvent;

pub const MAX_BUFFER_SIZE: usize = 100;

/// A batch of included log events ready for the capability pipeline.
#[derive(Debug, Clone)]
pub struct Batch {
    pub logs: Vec<String>,
    pub containers: Vec<String>,
    pub triggered_at: Instant,
}

fn make_batch(buffer: Vec<LogEvent>) -> Batch {
    let mut containers: Vec<String> = Vec::new();
    let logs = buffer
        .into_iter()
        .map(|event| {
            if !containers.contains(&event.container) {
                containers.push(event.container.clone());
            }
            format!("[{}] {}", event.container, event.message)
        })
        .collect();

    Batch {
        logs,
        containers,
        triggered_at: Instant::now(),
    }
}

/// Single coordinator owning the accumulation buffer and the debounce
/// timer. Two triggers emit a batch: `window` of inactivity, or the buffer
/// reaching [`MAX_BUFFER_SIZE`]. One batch is processed at a time; events
/// pushed while a callback is in flight simply queue on the channel and are
/// folded into the next batch(es) once it returns.
///
/// Dropping every [`LogBatcher`] clone (closing the channel) stops the
/// coordinator without flushing a partial buffer, matching the
/// stop-on-shutdown contract: no work is triggered during teardown.
#[derive(Clone)]
pub struct LogBatcher {
    sender: mpsc::UnboundedSender<LogEvent>,
}

impl LogBatcher {
    pub fn spawn<F, Fut>(window: Duration, mut on_batch: F) -> Self
    where
        F: FnMut(Batch) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<LogEvent>();

        tokio::spawn(async move {
            let mut buffer: Vec<LogEvent> = Vec::new();

            loop {
                let sleep = tokio::time::sleep(window);
                tokio::pin!(sleep);

                tokio::select! {
                    biased;

                    maybe_event = receiver.recv() => {
                        match maybe_event {
                            Some(event) => {
                                buffer.push(event);
                                if buffer.len() >= MAX_BUFFER_SIZE {
                                    let batch = make_batch(std::mem::take(&mut buffer));
                                    on_batch(batch).await;
                                }
                            }
                            None => break,
                        }
                    }

                    _ = &mut sleep, if !buffer.is_empty() => {
                        let batch = make_batch(std::mem::take(&mut buffer));
                        on_batch(batch).await;
                    }
                }
            }
        });

        Self { sender }
    }

    pub fn push(&self, event: LogEvent) {
        // Receiver only disappears on coordinator shutdown; dropping an
        // event after shutdown is not an error worth propagating.
        let _ = self.sender.send(event);
    }
}
