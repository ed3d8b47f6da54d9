use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::driver::{LogStream as RawStream, RawLogFrame};
use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStream {
    Stdout,
    Stderr,
}

impl From<RawStream> for EventStream {
    fn from(value: RawStream) -> Self {
        match value {
            RawStream::Stdout => EventStream::Stdout,
            RawStream::Stderr => EventStream::Stderr,
        }
    }
}

/// One demultiplexed, newline-split, trimmed log line from a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub container: String,
    pub message: String,
    pub stream: EventStream,
    pub timestamp: DateTime<Utc>,
}

/// Splits a raw multiplexed frame stream on newlines, trims each line, and
/// drops empty lines. A frame may contain zero, one, or several lines.
pub fn demux(
    frames: BoxStream<'static, Result<RawLogFrame, RuntimeError>>,
) -> BoxStream<'static, Result<LogEvent, RuntimeError>> {
    frames
        .flat_map(|frame| {
            let events: Vec<Result<LogEvent, RuntimeError>> = match frame {
                Ok(frame) => frame
                    .data
                    .split('\n')
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| {
                        Ok(LogEvent {
                            container: frame.container.clone(),
                            message: line.to_string(),
                            stream: frame.stream.into(),
                            timestamp: Utc::now(),
                        })
                    })
                    .collect(),
                Err(err) => vec![Err(err)],
            };
            futures::stream::iter(events)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LogStream;

    #[tokio::test]
    async fn splits_and_trims_multiline_frame() {
        let frame = RawLogFrame {
            container: "cache".into(),
            stream: LogStream::Stdout,
            data: "  line one  \n\nline two\n".into(),
        };
        let input = futures::stream::iter(vec![Ok(frame)]).boxed();
        let events: Vec<_> = demux(input).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().message, "line one");
        assert_eq!(events[1].as_ref().unwrap().message, "line two");
    }

    #[tokio::test]
    async fn empty_frame_yields_no_events() {
        let frame = RawLogFrame {
            container: "cache".into(),
            stream: LogStream::Stderr,
            data: "   \n".into(),
        };
        let input = futures::stream::iter(vec![Ok(frame)]).boxed();
        let events: Vec<_> = demux(input).collect().await;
        assert!(events.is_empty());
    }
}
