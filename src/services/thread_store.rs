//! Thread Store
//!
//! In-memory single-owner store of one `Thread`. Every mutation goes through
//! one async mutex, so read-modify-write sequences never interleave, and every
//! change is published on a `watch` channel.
//!
//! Run lifecycle writes are gated by run id: once a run has been cancelled,
//! finished or superseded, its late writes are rejected with
//! `AgentError::Cancelled` instead of touching the thread.

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::models::thread::{AgentStatus, Thread};
use crate::utils::error::{AgentError, AgentResult};

/// Identity and cancellation token of a run that owns the thread
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: String,
    pub token: CancellationToken,
}

struct Inner {
    thread: Thread,
    active_run: Option<RunHandle>,
}

pub struct ThreadStore {
    inner: Mutex<Inner>,
    changes: watch::Sender<Thread>,
}

impl ThreadStore {
    pub fn new(thread: Thread) -> Self {
        let (changes, _) = watch::channel(thread.clone());
        Self {
            inner: Mutex::new(Inner {
                thread,
                active_run: None,
            }),
            changes,
        }
    }

    /// Current thread contents
    pub async fn snapshot(&self) -> Thread {
        self.inner.lock().await.thread.clone()
    }

    /// Receiver of thread snapshots, updated after every change
    pub fn subscribe(&self) -> watch::Receiver<Thread> {
        self.changes.subscribe()
    }

    fn publish(&self, thread: &Thread) {
        self.changes.send_replace(thread.clone());
    }

    /// Serialized read-modify-write of the thread.
    pub async fn modify<R>(&self, f: impl FnOnce(&mut Thread) -> R) -> R {
        let mut inner = self.inner.lock().await;
        let result = f(&mut inner.thread);
        self.publish(&inner.thread);
        result
    }

    /// Claim the thread for a new run.
    ///
    /// Fails with `AlreadyRunning` without touching the thread when a run is
    /// running or paused. Otherwise the status becomes `Running` and any
    /// interrupted steps are repaired, in the same critical section.
    pub async fn try_begin_run(&self) -> AgentResult<RunHandle> {
        let mut inner = self.inner.lock().await;
        if inner.thread.status.is_busy() {
            return Err(AgentError::AlreadyRunning);
        }

        let handle = RunHandle {
            run_id: uuid::Uuid::new_v4().to_string(),
            token: CancellationToken::new(),
        };
        inner.thread.status = AgentStatus::Running {
            run_id: handle.run_id.clone(),
        };
        inner.thread.fix_incomplete_steps();
        inner.active_run = Some(handle.clone());
        self.publish(&inner.thread);

        tracing::debug!(run_id = %handle.run_id, "[ThreadStore] run started");
        Ok(handle)
    }

    /// Write on behalf of a run.
    ///
    /// Blocks while the run is paused. Fails with `Cancelled` once the token
    /// is cancelled or the thread no longer belongs to `run.run_id`.
    pub async fn modify_run<R>(
        &self,
        run: &RunHandle,
        f: impl FnOnce(&mut Thread) -> R,
    ) -> AgentResult<R> {
        let mut f = Some(f);
        loop {
            self.wait_while_paused(run).await?;

            let mut inner = self.inner.lock().await;
            if run.token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if inner.thread.status.is_running(&run.run_id) {
                let apply = f
                    .take()
                    .ok_or_else(|| AgentError::internal("run write applied twice"))?;
                let result = apply(&mut inner.thread);
                self.publish(&inner.thread);
                return Ok(result);
            }
            // Paused between the wait and the lock; wait again
            if inner.thread.status.run_id() != Some(run.run_id.as_str()) {
                return Err(AgentError::Cancelled);
            }
        }
    }

    /// Return the thread to idle after a clean or cancelled run.
    ///
    /// Only applies while the status still belongs to `run_id`; an error
    /// status or a newer run is left untouched.
    pub async fn finish_run(&self, run_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        Self::release(&mut inner, run_id);
        if inner.thread.status.run_id() != Some(run_id) {
            return false;
        }
        inner.thread.status = AgentStatus::Idle;
        self.publish(&inner.thread);
        true
    }

    /// Record a run-fatal error, if the thread still belongs to `run_id`.
    pub async fn fail_run(&self, run_id: &str, message: impl Into<String>) -> bool {
        let mut inner = self.inner.lock().await;
        Self::release(&mut inner, run_id);
        if inner.thread.status.run_id() != Some(run_id) {
            return false;
        }
        inner.thread.status = AgentStatus::StoppedWithError {
            message: message.into(),
        };
        self.publish(&inner.thread);
        true
    }

    fn release(inner: &mut Inner, run_id: &str) {
        if matches!(&inner.active_run, Some(active) if active.run_id == run_id) {
            inner.active_run = None;
        }
    }

    /// Suspend the running run at its next checkpoint.
    pub async fn pause(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let run_id = match &inner.thread.status {
            AgentStatus::Running { run_id } => run_id.clone(),
            _ => return false,
        };
        inner.thread.status = AgentStatus::Paused { run_id };
        self.publish(&inner.thread);
        tracing::info!("[ThreadStore] run paused");
        true
    }

    /// Resume a paused run where it stopped.
    pub async fn unpause(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let run_id = match &inner.thread.status {
            AgentStatus::Paused { run_id } => run_id.clone(),
            _ => return false,
        };
        inner.thread.status = AgentStatus::Running { run_id };
        self.publish(&inner.thread);
        tracing::info!("[ThreadStore] run resumed");
        true
    }

    /// Cancel the active run and return the thread to idle.
    ///
    /// The run observes the cancellation at its next checkpoint. An error
    /// status is never overwritten.
    pub async fn cancel(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active_run.take() else {
            return false;
        };
        active.token.cancel();
        if inner.thread.status.run_id() == Some(active.run_id.as_str()) {
            inner.thread.status = AgentStatus::Idle;
            self.publish(&inner.thread);
        }
        tracing::info!(run_id = %active.run_id, "[ThreadStore] run cancelled");
        true
    }

    /// Wait until the thread is no longer paused for this run.
    ///
    /// Returns `Cancelled` if the run's token fires while waiting.
    pub async fn wait_while_paused(&self, run: &RunHandle) -> AgentResult<()> {
        let mut changes = self.changes.subscribe();
        let resumed = tokio::select! {
            changed = changes.wait_for(|thread| {
                !matches!(&thread.status, AgentStatus::Paused { run_id } if *run_id == run.run_id)
            }) => changed.is_ok(),
            _ = run.token.cancelled() => false,
        };

        if !resumed || run.token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new(Thread::new())
    }
}
