//! The extended-idle farewell and the network-aware logout sequence.
//!
//! Runs as a spawned task so the tick loop never blocks on speech. Every
//! wait goes through `tokio::select!` against a watch channel, which bounds
//! cancellation latency: the user returning mid-countdown stops the
//! sequence within one wait arm, never after a full uninterruptible sleep.

use crate::config::{IdleThresholds, LogoutConfig};
use crate::engine::interface::{NetworkProbe, OsActions, SpeechSink, TelemetryProvider};
use crate::engine::state::{CompanionState, SessionMemory};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Monologuing,
    AwaitingNetworkClear,
    Warned,
    Executed,
    Cancelled,
}

impl SequencerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SequencerState::Executed | SequencerState::Cancelled)
    }
}

/// Handle to a running (or finished) sequence.
pub struct SequencerHandle {
    state: Arc<StdMutex<SequencerState>>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SequencerHandle {
    pub fn state(&self) -> SequencerState {
        *self.state.lock().expect("sequencer state poisoned")
    }

    /// Stop the sequence wherever it is. Safe to call more than once.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().expect("sequencer state poisoned");
            if state.is_terminal() {
                return;
            }
            *state = SequencerState::Cancelled;
        }
        let _ = self.cancel_tx.send(true);
        tracing::info!("[Logout] Sequence cancelled");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(&mut self) {
        let _ = (&mut self.task).await;
    }
}

/// Everything the spawned task needs, bundled so `start` stays readable.
pub struct SequencerDeps {
    pub sink: Arc<dyn SpeechSink>,
    pub probe: Arc<dyn NetworkProbe>,
    pub os: Arc<dyn OsActions>,
    pub telemetry: Arc<dyn TelemetryProvider>,
    pub memory: Arc<SessionMemory>,
    pub companion: Arc<Mutex<CompanionState>>,
}

pub struct LogoutSequencer;

impl LogoutSequencer {
    /// Spawn the farewell sequence. `chunks` is the ordered monologue,
    /// `warning` the last-call line before the logout itself.
    pub fn start(
        config: LogoutConfig,
        thresholds: IdleThresholds,
        chunks: Vec<String>,
        warning: Option<String>,
        deps: SequencerDeps,
    ) -> SequencerHandle {
        let state = Arc::new(StdMutex::new(SequencerState::Monologuing));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        deps.memory.set_in_phase4_monologue(true);
        tracing::info!("[Logout] Farewell sequence starting ({} chunks)", chunks.len());

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            run_sequence(config, thresholds, chunks, warning, deps, task_state, cancel_rx).await;
        });

        SequencerHandle {
            state,
            cancel_tx,
            task,
        }
    }
}

/// True if the wait was interrupted by cancellation.
async fn wait_or_cancel(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        // A closed channel means the handle is gone; treat it as cancel.
        _ = cancel.changed() => true,
    }
}

fn transition(state: &StdMutex<SequencerState>, expected: SequencerState, next: SequencerState) -> bool {
    let mut guard = state.lock().expect("sequencer state poisoned");
    if *guard != expected {
        return false;
    }
    *guard = next;
    true
}

fn state_of(state: &StdMutex<SequencerState>) -> SequencerState {
    *state.lock().expect("sequencer state poisoned")
}

async fn run_sequence(
    config: LogoutConfig,
    thresholds: IdleThresholds,
    chunks: Vec<String>,
    warning: Option<String>,
    deps: SequencerDeps,
    state: Arc<StdMutex<SequencerState>>,
    mut cancel: watch::Receiver<bool>,
) {
    // ── Monologuing ──
    for chunk in &chunks {
        if state_of(&state) != SequencerState::Monologuing {
            deps.memory.set_in_phase4_monologue(false);
            return;
        }
        match deps.sink.speak(chunk).await {
            Ok(audible) => deps
                .memory
                .extend_speech_end(tokio::time::Instant::now() + audible),
            Err(e) => tracing::warn!("[Logout] Monologue chunk failed to play: {}", e),
        }
        if wait_or_cancel(Duration::from_millis(config.chunk_delay_ms), &mut cancel).await {
            deps.memory.set_in_phase4_monologue(false);
            return;
        }
    }

    if !transition(&state, SequencerState::Monologuing, SequencerState::AwaitingNetworkClear) {
        deps.memory.set_in_phase4_monologue(false);
        return;
    }

    // ── AwaitingNetworkClear ──
    // Update clients mid-download get to finish; re-check once a minute,
    // re-validating the state on every wake so a user return mid-sleep
    // aborts the sequence.
    loop {
        if state_of(&state) != SequencerState::AwaitingNetworkClear {
            deps.memory.set_in_phase4_monologue(false);
            return;
        }
        let bytes = deps
            .probe
            .bytes_in_window(&config.update_client_fragments, Duration::from_secs(1))
            .await;
        if bytes <= config.network_threshold_bytes {
            break;
        }
        tracing::info!(
            "[Logout] Update client still moving {} bytes/s, re-checking in {}s",
            bytes,
            config.recheck_secs
        );
        if wait_or_cancel(Duration::from_secs(config.recheck_secs), &mut cancel).await {
            deps.memory.set_in_phase4_monologue(false);
            return;
        }
    }

    if !transition(&state, SequencerState::AwaitingNetworkClear, SequencerState::Warned) {
        deps.memory.set_in_phase4_monologue(false);
        return;
    }

    // ── Warned ──
    if let Some(text) = &warning {
        if let Err(e) = deps.sink.speak(text).await {
            tracing::warn!("[Logout] Warning line failed to play: {}", e);
        }
    }
    if wait_or_cancel(Duration::from_secs(config.warn_wait_secs), &mut cancel).await {
        deps.memory.set_in_phase4_monologue(false);
        return;
    }

    // ── Execute ──
    // Final re-validation: the state may have been cancelled during the
    // warning wait, and the user may have come back without the controller
    // noticing yet. Telemetry failure here means "do not log anyone out".
    if state_of(&state) != SequencerState::Warned {
        deps.memory.set_in_phase4_monologue(false);
        return;
    }
    let still_idle = match deps.telemetry.sample().await {
        Ok(metrics) => metrics.idle_minutes >= thresholds.logout_mins,
        Err(e) => {
            tracing::warn!("[Logout] Telemetry unavailable at execution, aborting: {}", e);
            false
        }
    };
    if !still_idle || deps.memory.in_gaming_session() {
        tracing::info!("[Logout] Conditions no longer hold at execution, aborting");
        transition(&state, SequencerState::Warned, SequencerState::Cancelled);
        deps.memory.set_in_phase4_monologue(false);
        return;
    }

    deps.os.terminate_processes(&config.browser_processes);
    match deps.os.logout() {
        Ok(()) => {
            // Only a successful call marks the farewell as played; a failed
            // one leaves the sequence armed for a later phase-4 commit.
            deps.companion.lock().await.final_played = true;
            transition(&state, SequencerState::Warned, SequencerState::Executed);
            tracing::info!("[Logout] Logout executed");
        }
        Err(e) => {
            tracing::error!("[Logout] Logout call failed: {}", e);
            transition(&state, SequencerState::Warned, SequencerState::Cancelled);
        }
    }
    deps.memory.set_in_phase4_monologue(false);
}
