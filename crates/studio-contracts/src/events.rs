use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::runs::now_utc_iso;

pub type EventPayload = Map<String, Value>;

/// Lifecycle points of one transform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TransformStarted,
    EndpointFailed,
    EndpointUnrecognized,
    TransformSucceeded,
    TransformFailed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransformStarted => "transform_started",
            Self::EndpointFailed => "endpoint_failed",
            Self::EndpointUnrecognized => "endpoint_unrecognized",
            Self::TransformSucceeded => "transform_succeeded",
            Self::TransformFailed => "transform_failed",
        }
    }
}

/// Append-only JSONL log of transform activity.
///
/// Every line carries `type`, `session`, `request_id` and `ts`; those are
/// stamped after the payload so a payload key of the same name is ignored.
/// Clones share one file lock, so concurrent request workers never
/// interleave partial lines.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session: session.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn emit(
        &self,
        kind: EventKind,
        request_id: &str,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        let mut event = payload;
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "session".to_string(),
            Value::String(self.inner.session.clone()),
        );
        event.insert(
            "request_id".to_string(),
            Value::String(request_id.to_string()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Reads every `kind` event back from a JSONL log, skipping lines that do
/// not parse.
pub fn read_events(path: &Path, kind: EventKind) -> anyhow::Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|row| row.get("type").and_then(Value::as_str) == Some(kind.as_str()))
        .collect())
}
