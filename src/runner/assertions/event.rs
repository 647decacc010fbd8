//! `event_triggered`: scan the captured device log for a JSON event.

use super::{AssertionEngine, AssertionOutcome};
use crate::error::{Error, Result};
use crate::parser::types::Assertion;
use anyhow::Context;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_EVENT_REGEX: &str = r"called\s(\{.*\})$";
const FALLBACK_EVENT_REGEX: &str = r"\{.*\}";
const TIMESTAMP_FIELDS: [&str; 3] = ["eventTimestamp", "timestamp", "time"];
const LOG_POLL: Duration = Duration::from_millis(500);

/// JSON object embedded in a log line. The regex match (capture group 1 when
/// present) is tried first, then the first `{` to the last `}`.
pub fn extract_json(line: &str, pattern: Option<&Regex>) -> Option<Map<String, Value>> {
    let from_regex = pattern.and_then(|re| {
        let caps = re.captures(line)?;
        caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
    });
    let candidate = from_regex.or_else(|| {
        let start = line.find('{')?;
        let end = line.rfind('}')?;
        (end > start).then(|| &line[start..=end])
    })?;

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            log::debug!("JSON parse failed for log line: {}", e);
            None
        }
    }
}

/// Whether the event's own timestamp lies in `[start, start + buffer]`.
/// Events without a readable timestamp are accepted.
pub fn timestamp_in_window(event: &Map<String, Value>, start: f64, buffer: Duration) -> bool {
    let timestamp = TIMESTAMP_FIELDS.iter().find_map(|field| match event.get(*field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });
    let Some(ts) = timestamp else {
        return true;
    };
    if ts < start || ts - start > buffer.as_secs_f64() {
        log::debug!(
            "Event timestamp {} outside ({}, {})",
            ts,
            start,
            start + buffer.as_secs_f64()
        );
        return false;
    }
    true
}

/// Every expected key must be present. Nested expected objects only require
/// an object; everything else compares as case-insensitive text.
pub fn matches_expected(event: &Map<String, Value>, expected: &Map<String, Value>) -> bool {
    expected.iter().all(|(key, want)| {
        let Some(actual) = event.get(key) else {
            return false;
        };
        match want {
            Value::Object(inner) => inner.is_empty() || actual.is_object(),
            _ => text(actual).to_lowercase() == text(want).to_lowercase(),
        }
    })
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Incremental reader over a growing log file
#[derive(Default)]
struct LogScan {
    offset: usize,
    lines: usize,
    tagged: usize,
    parsed: usize,
}

impl LogScan {
    /// Process lines added since the last call. A trailing line without a
    /// newline is left for the next call unless `final_pass` is set.
    fn feed(
        &mut self,
        content: &[u8],
        final_pass: bool,
        tags: &[String],
        pattern: Option<&Regex>,
        start: f64,
        buffer: Duration,
        expected: &Map<String, Value>,
    ) -> Option<(usize, Map<String, Value>)> {
        if content.len() < self.offset {
            log::debug!("Device log shrank, rescanning from the start");
            self.offset = 0;
        }
        let fresh = &content[self.offset..];
        let complete = match fresh.iter().rposition(|b| *b == b'\n') {
            _ if final_pass => fresh.len(),
            Some(last) => last + 1,
            None => 0,
        };

        for raw in String::from_utf8_lossy(&fresh[..complete]).lines() {
            self.lines += 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if !tags.is_empty() && !tags.iter().any(|tag| line.contains(tag.as_str())) {
                continue;
            }
            self.tagged += 1;
            let Some(event) = extract_json(line, pattern) else {
                continue;
            };
            self.parsed += 1;
            if timestamp_in_window(&event, start, buffer) && matches_expected(&event, expected) {
                self.offset += complete;
                return Some((self.lines, event));
            }
        }
        self.offset += complete;
        None
    }
}

impl AssertionEngine {
    pub(super) async fn assert_event_triggered(
        &self,
        assertion: &Assertion,
        step_started: f64,
    ) -> Result<AssertionOutcome> {
        let config = &assertion.event;
        let path = self
            .device_log
            .as_deref()
            .ok_or_else(|| Error::AssertionFailed("event_triggered requires device log capture".into()))?;
        if !path.exists() {
            return Err(Error::AssertionFailed(format!(
                "Log file not found: {}",
                path.display()
            )));
        }
        let expected = match &assertion.expected {
            Value::Object(map) => map.clone(),
            other => {
                return Err(Error::AssertionFailed(format!(
                    "event_triggered expects a mapping of event fields, got {}",
                    other
                )))
            }
        };

        let source = config.regex.as_deref().unwrap_or(DEFAULT_EVENT_REGEX);
        let pattern = match Regex::new(source) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("Invalid event regex '{}': {}. Using fallback.", source, e);
                Regex::new(FALLBACK_EVENT_REGEX).ok()
            }
        };
        let start = config.start_timestamp.unwrap_or(step_started);
        log::debug!("Looking for event {} after {}", Value::Object(expected.clone()), start);

        let mut scan = LogScan::default();
        let deadline = Instant::now() + config.window;
        loop {
            let final_pass = Instant::now() >= deadline;
            let content = read_log(path).await?;
            if let Some((line, event)) = scan.feed(
                &content,
                final_pass,
                &config.tags,
                pattern.as_ref(),
                start,
                config.buffer,
                &expected,
            ) {
                return Ok(AssertionOutcome::passed(format!(
                    "Event found at line {}: {}",
                    line,
                    Value::Object(event)
                )));
            }
            if final_pass {
                break;
            }
            tokio::time::sleep(LOG_POLL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }

        Err(Error::AssertionFailed(format!(
            "Event {} not found in {} (checked {} lines, {} matched tag, {} JSON parsed)",
            Value::Object(expected),
            path.display(),
            scan.lines,
            scan.tagged,
            scan.parsed
        )))
    }
}

async fn read_log(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read device log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::driver::testing::MockDriver;
    use crate::driver::traits::Backend;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_extract_json() {
        let re = Regex::new(DEFAULT_EVENT_REGEX).unwrap();
        let line = r#"I/Analytics( 123): logEvent called {"name":"login","eventTimestamp":100}"#;
        assert_eq!(extract_json(line, Some(&re)).unwrap()["name"], "login");

        // Regex miss falls back to the brace span
        let line = r#"D/Tracker: payload={"name":"open"} sent"#;
        assert_eq!(extract_json(line, Some(&re)).unwrap()["name"], "open");
        assert!(extract_json("no json here }{", None).is_none());
        assert!(extract_json("broken {name: x}", None).is_none());
    }

    #[test]
    fn test_timestamp_window() {
        let event = object(json!({"eventTimestamp": 100, "name": "X"}));
        assert!(timestamp_in_window(&event, 99.0, Duration::from_secs(2)));
        assert!(!timestamp_in_window(&event, 150.0, Duration::from_secs(2)));
        assert!(!timestamp_in_window(&event, 97.0, Duration::from_secs(2)));

        let string_ts = object(json!({"timestamp": "100.5"}));
        assert!(timestamp_in_window(&string_ts, 100.0, Duration::from_secs(1)));
        assert!(timestamp_in_window(&object(json!({"name": "X"})), 1e12, Duration::ZERO));
    }

    #[test]
    fn test_expected_matching() {
        let event = object(json!({"name": "Login", "count": 3, "ok": true, "params": {"a": 1}}));
        assert!(matches_expected(&event, &object(json!({"name": "login", "count": "3", "ok": "TRUE"}))));
        assert!(matches_expected(&event, &object(json!({"params": {"b": 2}}))));
        assert!(!matches_expected(&event, &object(json!({"name": {"x": 1}}))));
        assert!(matches_expected(&event, &object(json!({"name": {}}))));
        assert!(!matches_expected(&event, &object(json!({"missing": "x"}))));
    }

    fn log_with_event_on_line_five() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "--------- beginning of main").unwrap();
        writeln!(file, "I/ActivityManager: Start proc com.example.app").unwrap();
        writeln!(file, "I/Analytics: warming up").unwrap();
        writeln!(file, r#"I/Analytics: logEvent called {{"eventTimestamp": 10, "name":"Old"}}"#).unwrap();
        writeln!(file, r#"I/Analytics: logEvent called {{"eventTimestamp": 100, "name":"X"}}"#).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_found_in_window() {
        let log = log_with_event_on_line_five();
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let outcome = engine(&driver, Some(log.path().to_path_buf()))
            .evaluate(
                &assertion(
                    "{ type: event_triggered, tag: Analytics, start_timestamp: 99, buffer_timeout: 2, expected: { name: x } }",
                ),
                0.0,
            )
            .await
            .unwrap();
        assert!(outcome.message.starts_with("Event found at line 5"), "{}", outcome.message);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_outside_window_fails_with_statistics() {
        let log = log_with_event_on_line_five();
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let start = Instant::now();
        let failure = engine(&driver, Some(log.path().to_path_buf()))
            .evaluate(
                &assertion("{ type: event_triggered, tag: [Analytics, Tracker], buffer_timeout: 2, expected: { name: X } }"),
                150.0,
            )
            .await
            .unwrap_err();
        assert!(start.elapsed() >= Duration::from_secs(5));
        let message = failure_message(failure);
        assert!(message.contains("checked 5 lines, 3 matched tag, 2 JSON parsed"), "{message}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_log_file() {
        let driver = Arc::new(MockDriver::new(Backend::Uiautomator2));
        let failure = engine(&driver, Some("/nonexistent/device.log".into()))
            .evaluate(&assertion("{ type: event_triggered, expected: { name: X } }"), 0.0)
            .await
            .unwrap_err();
        assert!(failure_message(failure).starts_with("Log file not found"));
    }

    #[test]
    fn test_partial_line_waits_for_final_pass() {
        let expected = object(json!({"name": "X"}));
        let mut scan = LogScan::default();
        let content = br#"I/A: called {"name":"Y"}
I/A: called {"name":"X"}"#;
        assert!(scan
            .feed(content, false, &[], None, 0.0, Duration::from_secs(1), &expected)
            .is_none());
        assert_eq!(scan.lines, 1);
        let (line, _) = scan
            .feed(content, true, &[], None, 0.0, Duration::from_secs(1), &expected)
            .unwrap();
        assert_eq!(line, 2);
    }
}
