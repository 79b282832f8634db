//! The agent control surface: lifecycle, goal installation, and status.
//!
//! One `AgentHandle` owns one character's plan/execute loop on a dedicated
//! thread. `set_goal` installs a new goal and invalidates the current plan;
//! `stop` is idempotent and returns once the loop has observed the stop
//! token. Final cached state is flushed on exit; persistence failures are
//! logged but never block shutdown.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::executor::{ExecutionManager, ExecutorError, StatusReport, StopToken};
use crate::state::Goal;

/// How often the idle loop wakes to poll the stop token.
const IDLE_TICK: Duration = Duration::from_millis(200);

/// Handle to a running agent.
pub struct AgentHandle {
    stop: StopToken,
    invalidate: StopToken,
    status: Arc<Mutex<StatusReport>>,
    goal_tx: Sender<Goal>,
    thread: Option<JoinHandle<()>>,
}

impl AgentHandle {
    /// Start the agent loop. The manager's session state is initialized and
    /// the loop idles until a goal is installed.
    pub fn spawn(mut manager: ExecutionManager) -> Self {
        let stop = manager.stop_token();
        let invalidate = manager.invalidate_token();
        let status = manager.status_handle();
        let (goal_tx, goal_rx) = channel::<Goal>();

        let loop_stop = stop.clone();
        let thread = std::thread::spawn(move || {
            manager.initialize_session();
            run_loop(&mut manager, &goal_rx, &loop_stop);
            manager.shutdown();
            tracing::info!("agent loop stopped");
        });

        Self {
            stop,
            invalidate,
            status,
            goal_tx,
            thread: Some(thread),
        }
    }

    /// Install a new goal. Any in-flight goal run is abandoned at its next
    /// iteration boundary and the new goal takes over.
    pub fn set_goal(&self, goal: Goal) {
        self.invalidate.request_stop();
        if self.goal_tx.send(goal).is_err() {
            tracing::warn!("set_goal after agent loop exited");
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> StatusReport {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Whether the loop thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Request a stop and wait for the loop to observe it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("agent loop thread panicked");
            }
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(manager: &mut ExecutionManager, goals: &Receiver<Goal>, stop: &StopToken) {
    loop {
        let goal = match goals.recv_timeout(IDLE_TICK) {
            Ok(goal) => latest_goal(goals, goal),
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_stop_requested() {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };

        // A goal delivered together with an invalidation request is the
        // replacement itself; clear the flag so the new run proceeds.
        manager.invalidate_token().clear();

        match manager.achieve_goal(&goal) {
            Ok(report) => {
                tracing::info!(
                    goal = %goal,
                    iterations = report.iterations,
                    actions = report.actions_executed,
                    replans = report.replans,
                    "goal achieved"
                );
            }
            Err(ExecutorError::Interrupted) => {
                tracing::info!(goal = %goal, "goal run interrupted");
            }
            Err(e) => {
                tracing::error!(goal = %goal, error = %e, "goal run failed");
            }
        }

        if stop.is_stop_requested() {
            return;
        }
    }
}

/// Drain queued goals down to the most recent one — a newer goal supersedes
/// anything still waiting.
fn latest_goal(goals: &Receiver<Goal>, mut goal: Goal) -> Goal {
    while let Ok(newer) = goals.try_recv() {
        goal = newer;
    }
    goal
}
