//! Running an inference on a background thread.
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::graph::EvidenceGraph;
use crate::report::{ReportPSMSet, ReportProtein};

use super::{InferenceError, InferenceSettings, ProteinInference};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum InferenceState {
    #[default]
    Idle = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
}

impl InferenceState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Progress, cancellation and state shared between an inference and its
/// observers
#[derive(Debug, Default)]
pub struct InferenceControl {
    trees_done: AtomicUsize,
    progress: AtomicU8,
    cancelled: AtomicBool,
    state: AtomicU8,
}

impl InferenceControl {
    /// Percent of trees processed, `0..=100`
    pub fn progress(&self) -> u8 {
        match self.state() {
            InferenceState::Completed => 100,
            _ => self.progress.load(Ordering::Acquire),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> InferenceState {
        InferenceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: InferenceState) {
        if state == InferenceState::Running {
            self.trees_done.store(0, Ordering::Release);
            self.progress.store(0, Ordering::Release);
        }
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn tree_done(&self, total: usize) {
        let done = self.trees_done.fetch_add(1, Ordering::AcqRel) + 1;
        let percent = if total == 0 { 100 } else { (done * 100 / total).min(100) };
        self.progress.fetch_max(percent as u8, Ordering::AcqRel);
    }
}

/// A handle to an inference running on its own thread
#[derive(Debug)]
pub struct InferenceTask {
    control: Arc<InferenceControl>,
    started: DateTime<Utc>,
    handle: JoinHandle<Result<Vec<ReportProtein>, InferenceError>>,
}

impl InferenceTask {
    pub fn spawn(
        graph: Arc<EvidenceGraph>,
        psm_sets: Arc<IndexMap<String, ReportPSMSet>>,
        settings: InferenceSettings,
    ) -> Self {
        let control = Arc::new(InferenceControl::default());
        control.set_state(InferenceState::Running);
        let worker_control = Arc::clone(&control);
        let handle = thread::spawn(move || {
            ProteinInference::run(&graph, &psm_sets, &settings, &worker_control)
        });
        Self {
            control,
            started: Utc::now(),
            handle,
        }
    }

    pub fn progress(&self) -> u8 {
        self.control.progress()
    }

    /// Request cancellation. Trees already started still finish.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn state(&self) -> InferenceState {
        self.control.state()
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the inference to finish
    pub fn join(self) -> Result<Vec<ReportProtein>, InferenceError> {
        let result = self.handle.join().map_err(|e| {
            let message = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            self.control.set_state(InferenceState::Failed);
            InferenceError::WorkerFailed(message)
        })?;
        log::debug!(
            "inference finished in {} ms",
            (Utc::now() - self.started).num_milliseconds()
        );
        result
    }
}
