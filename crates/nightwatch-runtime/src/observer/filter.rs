use std::sync::OnceLock;

use regex::Regex;

use super::stream::{EventStream, LogEvent};

const LIFECYCLE_KEYWORDS: &[&str] = &[
    "starting up",
    "started successfully",
    "graceful shutdown",
    "shutting down gracefully",
    "received sigterm",
    "received sigint",
    "health check passed",
    "healthcheck ok",
    "listening on",
];

const ERROR_KEYWORDS: &[&str] = &["error", "fatal", "exception", "panic", "critical", "failed"];

fn status_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[45]\d{2}\b").unwrap())
}

fn log_level_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(level=)?(error|fatal|critical|panic)\b").unwrap())
}

fn is_lifecycle_noise(message: &str) -> bool {
    let lower = message.to_lowercase();
    LIFECYCLE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn has_error_signal(message: &str) -> bool {
    let lower = message.to_lowercase();
    ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw))
        || status_code_re().is_match(message)
        || log_level_re().is_match(message)
}

/// Decides whether an event should be forwarded into the batcher.
///
/// 1. Lifecycle noise is dropped outright, stdout or stderr.
/// 2. Everything else on stderr is kept.
/// 3. Everything else on stdout is kept only if it carries an error signal.
pub fn should_include(event: &LogEvent) -> bool {
    if is_lifecycle_noise(&event.message) {
        return false;
    }
    if event.stream == EventStream::Stderr {
        return true;
    }
    has_error_signal(&event.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(message: &str, stream: EventStream) -> LogEvent {
        LogEvent {
            container: "cache".into(),
            message: message.into(),
            stream,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn drops_lifecycle_noise_regardless_of_stream() {
        assert!(!should_include(&event("Started successfully on port 6379", EventStream::Stdout)));
        assert!(!should_include(&event("Received SIGTERM, shutting down gracefully", EventStream::Stderr)));
    }

    #[test]
    fn keeps_all_non_lifecycle_stderr() {
        assert!(should_include(&event("just some noise", EventStream::Stderr)));
    }

    #[test]
    fn keeps_stdout_only_with_error_signal() {
        assert!(!should_include(&event("request completed in 4ms", EventStream::Stdout)));
        assert!(should_include(&event("connection error: timed out", EventStream::Stdout)));
        assert!(should_include(&event("GET /health 503", EventStream::Stdout)));
        assert!(should_include(&event("level=fatal msg=\"db down\"", EventStream::Stdout)));
    }
}
