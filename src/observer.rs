//! Append-only run event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::RwLock;

/// Role recorded on events emitted by the orchestrator itself.
pub const SYSTEM_ROLE: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Dispatch,
    Rejected,
    Approved,
    Escalated,
    System,
    Terminal,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Rejected => "rejected",
            Self::Approved => "approved",
            Self::Escalated => "escalated",
            Self::System => "system",
            Self::Terminal => "terminal",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatch" => Ok(Self::Dispatch),
            "rejected" => Ok(Self::Rejected),
            "approved" => Ok(Self::Approved),
            "escalated" => Ok(Self::Escalated),
            "system" => Ok(Self::System),
            "terminal" => Ok(Self::Terminal),
            _ => Err(format!("Invalid event kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    /// Position in the log, starting at 0
    pub seq: usize,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub role: String,
    pub message: String,
}

/// Sink for run lifecycle events.
pub trait RunObserver: Send + Sync {
    fn record(&self, kind: EventKind, role: &str, message: &str);
}

/// In-memory event log backing every run.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RwLock<Vec<RunEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of every event appended so far.
    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .map(|events| events.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events from `seq` onwards, for incremental readers.
    pub fn since(&self, seq: usize) -> Vec<RunEvent> {
        self.snapshot().into_iter().skip(seq).collect()
    }
}

impl RunObserver for EventLog {
    fn record(&self, kind: EventKind, role: &str, message: &str) {
        let mut events = match self.events.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seq = events.len();
        tracing::info!(seq, kind = kind.as_str(), role, "{message}");
        events.push(RunEvent {
            seq,
            at: Utc::now(),
            kind,
            role: role.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_events_are_sequenced_in_order() {
        let log = EventLog::new();
        log.record(EventKind::Dispatch, "RESEARCHER", "first");
        log.record(EventKind::Approved, "RESEARCHER", "second");

        let events = log.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
        assert_eq!(events[1].kind, EventKind::Approved);
        assert!(events[0].at <= events[1].at);
    }

    #[test]
    fn test_since_returns_tail() {
        let log = EventLog::new();
        for i in 0..4 {
            log.record(EventKind::System, SYSTEM_ROLE, &format!("event {i}"));
        }
        let tail = log.since(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "event 2");
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn test_concurrent_appends_keep_unique_sequence() {
        let log = Arc::new(EventLog::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        log.record(EventKind::System, "T", &format!("{i}-{j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let events = log.snapshot();
        assert_eq!(events.len(), 200);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i);
        }
    }

    #[test]
    fn test_len_survives_poisoned_lock() {
        let log = Arc::new(EventLog::new());
        log.record(EventKind::System, SYSTEM_ROLE, "before");

        let writer = log.clone();
        let _ = std::thread::spawn(move || {
            let _guard = writer.events.write().unwrap();
            panic!("writer panicked while holding the lock");
        })
        .join();

        assert!(log.events.is_poisoned());
        assert_eq!(log.len(), 1);
        assert_eq!(log.len(), log.snapshot().len());
        assert!(!log.is_empty());
    }

    #[test]
    fn test_event_kind_roundtrip() {
        for kind in [
            EventKind::Dispatch,
            EventKind::Rejected,
            EventKind::Approved,
            EventKind::Escalated,
            EventKind::System,
            EventKind::Terminal,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("unknown".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_event_serializes_kind_as_snake_case() {
        let log = EventLog::new();
        log.record(EventKind::Escalated, "WRITER", "accepted as-is");
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["kind"], "escalated");
        assert_eq!(json["role"], "WRITER");
    }
}
