pub mod batch;
pub mod filter;
pub mod stream;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use tracing::{info, warn};

use crate::driver::RuntimeDriver;
use crate::error::RuntimeError;

pub use batch::{Batch, LogBatcher, MAX_BUFFER_SIZE};
pub use stream::{demux, EventStream, LogEvent};

/// Wires a container's log stream through demux → filter → batch for the
/// lifetime of the connection. Returns once the upstream stream ends (the
/// container stopped, or the runtime connection dropped).
pub async fn observe_container<F, Fut>(
    driver: Arc<dyn RuntimeDriver>,
    container: String,
    window: Duration,
    on_batch: F,
) -> Result<(), RuntimeError>
where
    F: FnMut(Batch) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    info!(container = %container, "attaching log observer");
    let frames = driver.follow_logs(&container).await?;
    let mut events = demux(frames);

    let batcher = LogBatcher::spawn(window, on_batch);

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                if filter::should_include(&event) {
                    batcher.push(event);
                }
            }
            Err(err) => {
                warn!(container = %container, error = %err, "log stream error");
                return Err(err);
            }
        }
    }

    info!(container = %container, "log stream ended");
    Ok(())
}
