use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::state::SessionState;

/// Statistics about a translation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// When the last `start` was issued
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Audio chunks written to the transport
    pub chunks_sent: u64,

    /// `transcription_update` messages received
    pub transcript_updates: u64,

    /// `translation_result` messages received
    pub translations_received: u64,

    /// Server messages dropped as undecodable
    pub messages_dropped: u64,

    /// Times streaming was suspended for payment
    pub payment_holds: u64,

    /// Last fatal error, if the session failed
    pub last_error: Option<String>,
}

/// Live counters shared between the session and its handles
#[derive(Debug, Default)]
pub struct SessionCounters {
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    pub(crate) chunks_sent: AtomicU64,
    pub(crate) transcript_updates: AtomicU64,
    pub(crate) translations_received: AtomicU64,
    pub(crate) messages_dropped: AtomicU64,
    pub(crate) payment_holds: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn mark_started(&self) {
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Utc::now());
        }
        self.set_last_error(None);
    }

    pub(crate) fn set_last_error(&self, error: Option<String>) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = error;
        }
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::SeqCst)
    }

    /// Snapshot of the counters for `state`
    pub fn snapshot(&self, state: SessionState) -> SessionStats {
        let started_at = self.started_at.lock().ok().and_then(|s| *s);
        let duration_secs = started_at
            .map(|start| Utc::now().signed_duration_since(start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            state,
            started_at,
            duration_secs,
            chunks_sent: self.chunks_sent.load(Ordering::SeqCst),
            transcript_updates: self.transcript_updates.load(Ordering::SeqCst),
            translations_received: self.translations_received.load(Ordering::SeqCst),
            messages_dropped: self.messages_dropped.load(Ordering::SeqCst),
            payment_holds: self.payment_holds.load(Ordering::SeqCst),
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }
}
