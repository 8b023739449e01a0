//! Runs, the run store and the supervisor that executes them.
//!
//! A [`RunRecord`] is shared as `Arc<RunRecord>` between the task that owns
//! it and any number of readers. Only the owning task writes: status and
//! progress are atomics, the event log is append-only, and the result is
//! write-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::observer::{EventLog, RunEvent};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::payload::Payload;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Failed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One execution of the pipeline.
#[derive(Debug)]
pub struct RunRecord {
    id: Uuid,
    created_at: DateTime<Utc>,
    payload: Payload,
    status: AtomicU8,
    progress: AtomicU8,
    events: EventLog,
    result: OnceLock<String>,
    cancel: CancellationToken,
}

impl RunRecord {
    pub fn new(payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
            status: AtomicU8::new(RunStatus::Pending.to_u8()),
            progress: AtomicU8::new(0),
            events: EventLog::new(),
            result: OnceLock::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn result(&self) -> Option<&str> {
        self.result.get().map(String::as_str)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request cancellation; the run stops at its next phase boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// pending → running. No effect on a run that already left pending.
    pub(crate) fn mark_running(&self) {
        let _ = self.status.compare_exchange(
            RunStatus::Pending.to_u8(),
            RunStatus::Running.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// running → `status`. A finished run is immutable.
    pub(crate) fn finish(&self, status: RunStatus) {
        let _ = self.status.compare_exchange(
            RunStatus::Running.to_u8(),
            status.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Progress never decreases and is capped at 100.
    pub(crate) fn set_progress(&self, percent: u8) {
        self.progress.fetch_max(percent.min(100), Ordering::AcqRel);
    }

    pub(crate) fn set_result(&self, result: &str) {
        let _ = self.result.set(result.to_string());
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            status: self.status(),
            progress: self.progress(),
            result: self.result().map(String::from),
            events: self.events.snapshot(),
            created_at: self.created_at,
        }
    }
}

/// Point-in-time view of a run, as served by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub status: RunStatus,
    pub progress: u8,
    pub result: Option<String>,
    pub events: Vec<RunEvent>,
    pub created_at: DateTime<Utc>,
}

/// Registry of runs by id.
pub trait RunStore: Send + Sync {
    fn insert(&self, run: Arc<RunRecord>);
    fn get(&self, id: &Uuid) -> Option<Arc<RunRecord>>;
    fn ids(&self) -> Vec<Uuid>;
}

/// Process-local run store. Runs are lost on restart.
///
/// Finished runs are never evicted: every submitted run stays queryable,
/// and memory grows with the number of runs for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, Arc<RunRecord>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn insert(&self, run: Arc<RunRecord>) {
        let mut runs = match self.runs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        runs.insert(run.id(), run);
    }

    fn get(&self, id: &Uuid) -> Option<Arc<RunRecord>> {
        let runs = match self.runs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        runs.get(id).cloned()
    }

    fn ids(&self) -> Vec<Uuid> {
        let runs = match self.runs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        runs.keys().copied().collect()
    }
}

/// Accepts submissions and executes each run on its own task.
#[derive(Clone)]
pub struct Supervisor {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn RunStore>,
}

impl Supervisor {
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<dyn RunStore>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Register a run and start it in the background.
    pub fn submit(&self, payload: Payload) -> Arc<RunRecord> {
        let (run, _handle) = self.spawn(payload);
        run
    }

    /// Register a run and start it, returning the task handle as well.
    pub fn spawn(&self, payload: Payload) -> (Arc<RunRecord>, tokio::task::JoinHandle<RunOutcome>) {
        let run = Arc::new(RunRecord::new(payload));
        self.store.insert(run.clone());
        tracing::info!(run_id = %run.id(), "run submitted");

        let orchestrator = self.orchestrator.clone();
        let task_run = run.clone();
        let handle = tokio::spawn(async move { orchestrator.run(&task_run).await });
        (run, handle)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<RunRecord>> {
        self.store.get(id)
    }

    pub fn status(&self, id: &Uuid) -> Option<RunSnapshot> {
        self.store.get(id).map(|run| run.snapshot())
    }

    /// Request cancellation of a run. Returns `None` for unknown ids.
    pub fn cancel(&self, id: &Uuid) -> Option<RunSnapshot> {
        let run = self.store.get(id)?;
        if !run.status().is_terminal() {
            tracing::info!(run_id = %id, "cancellation requested");
            run.cancel();
        }
        Some(run.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{EventKind, RunObserver};
    use crate::orchestrator::OrchestratorConfig;
    use crate::payload::{FieldValue, Record};
    use crate::phase::PipelineDefinition;
    use crate::research::SimulatedResearch;
    use crate::workers::WorkerRegistry;

    fn acme() -> Payload {
        let mut record = Record::new();
        record.insert("companyName".into(), FieldValue::Text("Acme".into()));
        Payload::new(vec![record])
    }

    fn supervisor() -> Supervisor {
        let orchestrator = Orchestrator::new(
            PipelineDefinition::default(),
            WorkerRegistry::standard(
                &PipelineDefinition::default(),
                None,
                Arc::new(SimulatedResearch),
            ),
            None,
            OrchestratorConfig::default(),
        )
        .unwrap();
        Supervisor::new(Arc::new(orchestrator), Arc::new(InMemoryRunStore::new()))
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
            assert_eq!(RunStatus::from_u8(status.to_u8()), status);
        }
        assert!("cancelled".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = RunRecord::new(acme());
        assert_eq!(run.status(), RunStatus::Pending);
        assert_eq!(run.progress(), 0);
        assert!(run.result().is_none());
        assert!(run.events().is_empty());
    }

    #[test]
    fn test_finished_run_is_immutable() {
        let run = RunRecord::new(acme());
        run.finish(RunStatus::Completed);
        assert_eq!(run.status(), RunStatus::Pending, "finish requires running");

        run.mark_running();
        run.finish(RunStatus::Failed);
        run.mark_running();
        run.finish(RunStatus::Completed);
        assert_eq!(run.status(), RunStatus::Failed);

        run.set_result("first");
        run.set_result("second");
        assert_eq!(run.result(), Some("first"));
    }

    #[test]
    fn test_progress_never_decreases() {
        let run = RunRecord::new(acme());
        run.set_progress(50);
        run.set_progress(20);
        assert_eq!(run.progress(), 50);
        run.set_progress(250);
        assert_eq!(run.progress(), 100);
    }

    #[test]
    fn test_snapshot_serializes_status_lowercase() {
        let run = RunRecord::new(acme());
        run.events().record(EventKind::System, "SYSTEM", "hello");
        let json = serde_json::to_value(run.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0);
        assert!(json["result"].is_null());
        assert_eq!(json["events"][0]["message"], "hello");
    }

    #[test]
    fn test_store_insert_and_get() {
        let store = InMemoryRunStore::new();
        let run = Arc::new(RunRecord::new(acme()));
        store.insert(run.clone());
        assert_eq!(store.get(&run.id()).unwrap().id(), run.id());
        assert!(store.get(&Uuid::new_v4()).is_none());
        assert_eq!(store.ids(), vec![run.id()]);
    }

    #[tokio::test]
    async fn test_finished_runs_stay_queryable() {
        let supervisor = supervisor();
        let (first, first_handle) = supervisor.spawn(acme());
        first_handle.await.unwrap();
        let (second, second_handle) = supervisor.spawn(acme());
        second_handle.await.unwrap();

        for run in [&first, &second] {
            let snapshot = supervisor.status(&run.id()).unwrap();
            assert_eq!(snapshot.status, RunStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_supervisor_runs_to_completion() {
        let supervisor = supervisor();
        let (run, handle) = supervisor.spawn(acme());

        let outcome = handle.await.unwrap();

        assert_eq!(outcome.status(), RunStatus::Completed);
        let snapshot = supervisor.status(&run.id()).unwrap();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.result.unwrap().starts_with("(simulated)"));
    }

    #[tokio::test]
    async fn test_supervisor_runs_are_isolated() {
        let supervisor = supervisor();
        let (good, good_handle) = supervisor.spawn(acme());
        let (empty, empty_handle) = supervisor.spawn(Payload::default());

        good_handle.await.unwrap();
        empty_handle.await.unwrap();

        assert_eq!(good.status(), RunStatus::Completed);
        assert_eq!(empty.status(), RunStatus::Failed);
        assert_ne!(good.id(), empty.id());
    }

    #[tokio::test]
    async fn test_cancel_unknown_run_is_none() {
        assert!(supervisor().cancel(&Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_cancel_finished_run_keeps_status() {
        let supervisor = supervisor();
        let (run, handle) = supervisor.spawn(acme());
        handle.await.unwrap();

        let snapshot = supervisor.cancel(&run.id()).unwrap();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert!(!run.is_cancelled());
    }
}
