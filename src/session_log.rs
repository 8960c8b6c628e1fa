//! Append-only conversation log with debounced persistence.
//!
//! Every event sent to or received from the assistant is recorded in order.
//! Events recorded before the service has issued a session id wait in a
//! pre-session buffer and become the first entries of the next session.
//!
//! Each session is stored as `{logs_dir}/conversation_{id}_{YYYY-MM-DD}.json`.
//! Writes are full snapshots made atomic with a temp file and a rename. A
//! single saver task owns debounced writes; it and the final write both take
//! the state mutex, so a snapshot on disk is never older than one written
//! before it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LoggingConfig;
use crate::error::{Result, VoiceError};

/// Which way an event travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
    /// Inbound payload that could not be processed.
    Error,
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub event: serde_json::Value,
}

/// On-disk shape of one session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub events: Vec<LogEntry>,
}

struct OpenSession {
    id: String,
    path: PathBuf,
    entries: Vec<LogEntry>,
}

impl OpenSession {
    fn snapshot(&self, end_time: Option<DateTime<Utc>>) -> SessionRecord {
        let now = Utc::now();
        let start_time = self.entries.first().map_or(now, |e| e.timestamp);
        let end_time = end_time
            .or_else(|| self.entries.last().map(|e| e.timestamp))
            .unwrap_or(now);
        SessionRecord {
            session_id: self.id.clone(),
            start_time,
            end_time,
            events: self.entries.clone(),
        }
    }
}

#[derive(Default)]
struct LogState {
    session: Option<OpenSession>,
    pre_session: Vec<LogEntry>,
}

struct Shared {
    state: Mutex<LogState>,
    dirty: Notify,
    logs_dir: PathBuf,
    debounce: Duration,
}

/// Conversation event logger.
pub struct ConversationLogger {
    shared: Arc<Shared>,
    saver: StdMutex<Option<JoinHandle<()>>>,
    persist_orphaned_events: bool,
}

impl std::fmt::Debug for ConversationLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLogger")
            .field("logs_dir", &self.shared.logs_dir)
            .field("debounce", &self.shared.debounce)
            .finish_non_exhaustive()
    }
}

impl ConversationLogger {
    pub fn new(logs_dir: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self::build(logs_dir.into(), debounce, false)
    }

    /// Logger configured from the `[logging]` section.
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::build(
            config.resolved_logs_dir(),
            config.save_debounce(),
            config.persist_orphaned_events,
        )
    }

    /// Persist pre-session events under a synthetic id on `end_session`.
    #[must_use]
    pub fn with_orphan_persistence(mut self, enabled: bool) -> Self {
        self.persist_orphaned_events = enabled;
        self
    }

    fn build(logs_dir: PathBuf, debounce: Duration, persist_orphaned_events: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LogState::default()),
                dirty: Notify::new(),
                logs_dir,
                debounce,
            }),
            saver: StdMutex::new(None),
            persist_orphaned_events,
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.shared.logs_dir
    }

    /// Open a session for `id`.
    ///
    /// Does nothing when `id` is already the open session. Otherwise the
    /// open session (if any) is written and closed, and the new one starts
    /// with the pre-session buffer as its first entries.
    pub async fn start_session(&self, id: &str) {
        let mut state = self.shared.state.lock().await;
        if state.session.as_ref().is_some_and(|s| s.id == id) {
            return;
        }
        if let Some(previous) = state.session.take() {
            info!(session_id = %previous.id, "closing previous log session");
            write_if_nonempty(&previous, Some(Utc::now())).await;
        }

        let entries = std::mem::take(&mut state.pre_session);
        let path = session_path(&self.shared.logs_dir, id, Utc::now());
        info!(session_id = %id, seeded = entries.len(), path = %path.display(), "log session started");
        state.session = Some(OpenSession {
            id: id.to_owned(),
            path,
            entries,
        });
        let seeded = state.session.as_ref().is_some_and(|s| !s.entries.is_empty());
        drop(state);
        if seeded {
            self.schedule_save();
        }
    }

    /// Append an event, or buffer it when no session is open.
    pub async fn record(&self, event: serde_json::Value, direction: Direction) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            direction,
            event,
        };
        let mut state = self.shared.state.lock().await;
        match state.session.as_mut() {
            Some(session) => session.entries.push(entry),
            None => {
                state.pre_session.push(entry);
                return;
            }
        }
        drop(state);
        self.schedule_save();
    }

    /// Write the open session immediately and clear all state.
    pub async fn end_session(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(session) = state.session.take() {
            info!(session_id = %session.id, events = session.entries.len(), "log session ended");
            write_if_nonempty(&session, Some(Utc::now())).await;
        }

        let orphans = std::mem::take(&mut state.pre_session);
        if orphans.is_empty() {
            return;
        }
        if self.persist_orphaned_events {
            let id = format!("orphan-{}", uuid::Uuid::new_v4());
            let orphan = OpenSession {
                path: session_path(&self.shared.logs_dir, &id, Utc::now()),
                id,
                entries: orphans,
            };
            info!(session_id = %orphan.id, events = orphan.entries.len(), "persisting pre-session events");
            write_if_nonempty(&orphan, Some(Utc::now())).await;
        } else {
            debug!(events = orphans.len(), "discarding pre-session events");
        }
    }

    /// Id of the open session.
    pub async fn session_id(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.id.clone())
    }

    /// Path of the open session's log file.
    pub async fn session_path(&self) -> Option<PathBuf> {
        self.shared
            .state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.path.clone())
    }

    /// Number of entries waiting for a session id.
    pub async fn buffered_event_count(&self) -> usize {
        self.shared.state.lock().await.pre_session.len()
    }

    /// Number of entries in the open session.
    pub async fn entry_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .await
            .session
            .as_ref()
            .map_or(0, |s| s.entries.len())
    }

    /// Restart the quiet period, starting the saver task on first use.
    fn schedule_save(&self) {
        if let Ok(mut saver) = self.saver.lock() {
            if saver.is_none() {
                *saver = Some(tokio::spawn(run_saver(Arc::clone(&self.shared))));
            }
        }
        self.shared.dirty.notify_one();
    }
}

impl Drop for ConversationLogger {
    fn drop(&mut self) {
        if let Ok(mut saver) = self.saver.lock() {
            if let Some(handle) = saver.take() {
                handle.abort();
            }
        }
    }
}

/// Debounced writer: waits for a record, then for a full quiet period.
async fn run_saver(shared: Arc<Shared>) {
    loop {
        shared.dirty.notified().await;
        loop {
            tokio::select! {
                () = tokio::time::sleep(shared.debounce) => break,
                () = shared.dirty.notified() => {}
            }
        }
        let state = shared.state.lock().await;
        // Ended in the meantime: nothing left to write.
        if let Some(session) = state.session.as_ref() {
            write_if_nonempty(session, None).await;
        }
    }
}

fn session_path(logs_dir: &Path, id: &str, opened_at: DateTime<Utc>) -> PathBuf {
    logs_dir.join(format!(
        "conversation_{id}_{}.json",
        opened_at.format("%Y-%m-%d")
    ))
}

async fn write_if_nonempty(session: &OpenSession, end_time: Option<DateTime<Utc>>) {
    if session.entries.is_empty() {
        return;
    }
    let record = session.snapshot(end_time);
    match write_atomic(&session.path, &record).await {
        Ok(()) => debug!(
            session_id = %session.id,
            events = record.events.len(),
            "conversation log saved"
        ),
        Err(e) => warn!(session_id = %session.id, error = %e, "failed to save conversation log"),
    }
}

async fn write_atomic(path: &Path, record: &SessionRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| VoiceError::Storage(format!("failed to serialize session log: {e}")))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            VoiceError::Storage(format!(
                "failed to create log directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| {
            VoiceError::Storage(format!(
                "failed to write temp file {}: {e}",
                tmp_path.display()
            ))
        })?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        VoiceError::Storage(format!(
            "failed to rename temp file to {}: {e}",
            path.display()
        ))
    })
}

/// Read a session log back from disk.
///
/// # Errors
///
/// Returns [`VoiceError::Storage`] if the file cannot be read or parsed.
pub async fn read_session_record(path: &Path) -> Result<SessionRecord> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        VoiceError::Storage(format!("failed to read session log {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        VoiceError::Storage(format!(
            "failed to parse session log {}: {e}",
            path.display()
        ))
    })
}
