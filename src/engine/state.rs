//! Engine-owned state. `CompanionState` belongs to the tick loop and the
//! command path (both go through the engine's mutex); `SessionMemory` is
//! additionally read by the logout sequencer task, so its hot fields are
//! atomics and the rest sit behind a monitor.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Scheduling sentinel: "not until further notice". Used for
/// `next_speak_at` while speech is suppressed by a mute.
pub const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionMode {
    Integrated,
    Attentive,
    DndAssistant,
}

/// Process-lifetime companion state. Never persisted.
#[derive(Debug)]
pub struct CompanionState {
    pub next_speak_at: Instant,
    pub locked_out: bool,
    pub final_played: bool,
    pub boot_greeting_played: bool,
    pub login_greeting_played: bool,
    pub app_start_time: Instant,
    pub current_mode: CompanionMode,
    pub manually_muted: bool,
    pub consecutive_active_ticks: u32,
    pub high_cpu_since: Option<Instant>,
    /// 0.0 = out of patience, 1.0 = fully content. Decays per second,
    /// replenished by discrete events (user interaction, praise commands).
    pub patience: f32,
}

impl CompanionState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            next_speak_at: now,
            locked_out: false,
            final_played: false,
            boot_greeting_played: false,
            login_greeting_played: false,
            app_start_time: now,
            current_mode: CompanionMode::Integrated,
            manually_muted: false,
            consecutive_active_ticks: 0,
            high_cpu_since: None,
            patience: 1.0,
        }
    }

    pub fn decay_patience(&mut self, delta: Duration, per_sec: f32) {
        self.patience = (self.patience - per_sec * delta.as_secs_f32()).clamp(0.0, 1.0);
    }

    pub fn reward_patience(&mut self, delta: f32) {
        self.patience = (self.patience + delta).clamp(0.0, 1.0);
    }
}

impl Default for CompanionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-scoped memory, reset only by process restart. Fields are read
/// from the tick loop, the command path and the sequencer task.
#[derive(Debug)]
pub struct SessionMemory {
    current_phase: AtomicU8,
    in_phase4_monologue: AtomicBool,
    in_gaming_session: AtomicBool,
    tracked_game: Mutex<Option<String>>,
    /// `None` = grace period inactive.
    game_grace_deadline: Mutex<Option<Instant>>,
    speech_end: Mutex<Instant>,
    privileged_until: Mutex<Option<Instant>>,
    search_until: Mutex<Option<Instant>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self {
            current_phase: AtomicU8::new(0),
            in_phase4_monologue: AtomicBool::new(false),
            in_gaming_session: AtomicBool::new(false),
            tracked_game: Mutex::new(None),
            game_grace_deadline: Mutex::new(None),
            speech_end: Mutex::new(Instant::now()),
            privileged_until: Mutex::new(None),
            search_until: Mutex::new(None),
        }
    }

    pub fn current_phase(&self) -> u8 {
        self.current_phase.load(Ordering::SeqCst)
    }

    pub fn set_current_phase(&self, phase: u8) {
        self.current_phase.store(phase, Ordering::SeqCst);
    }

    pub fn in_phase4_monologue(&self) -> bool {
        self.in_phase4_monologue.load(Ordering::SeqCst)
    }

    pub fn set_in_phase4_monologue(&self, value: bool) {
        self.in_phase4_monologue.store(value, Ordering::SeqCst);
    }

    pub fn in_gaming_session(&self) -> bool {
        self.in_gaming_session.load(Ordering::SeqCst)
    }

    pub fn set_in_gaming_session(&self, value: bool) {
        self.in_gaming_session.store(value, Ordering::SeqCst);
    }

    pub fn tracked_game(&self) -> Option<String> {
        self.tracked_game.lock().expect("tracked_game poisoned").clone()
    }

    pub fn set_tracked_game(&self, process: Option<String>) {
        *self.tracked_game.lock().expect("tracked_game poisoned") = process;
    }

    pub fn game_grace_deadline(&self) -> Option<Instant> {
        *self
            .game_grace_deadline
            .lock()
            .expect("game_grace_deadline poisoned")
    }

    pub fn set_game_grace_deadline(&self, deadline: Option<Instant>) {
        *self
            .game_grace_deadline
            .lock()
            .expect("game_grace_deadline poisoned") = deadline;
    }

    pub fn speech_end(&self) -> Instant {
        *self.speech_end.lock().expect("speech_end poisoned")
    }

    /// Extends the busy-until mark; never moves it backwards, so a short
    /// line cannot cut an already-scheduled longer utterance short.
    pub fn extend_speech_end(&self, until: Instant) {
        let mut guard = self.speech_end.lock().expect("speech_end poisoned");
        if until > *guard {
            *guard = until;
        }
    }

    pub fn privileged_active(&self, now: Instant) -> bool {
        self.privileged_until
            .lock()
            .expect("privileged_until poisoned")
            .map_or(false, |t| now < t)
    }

    pub fn open_privileged_window(&self, until: Instant) {
        *self
            .privileged_until
            .lock()
            .expect("privileged_until poisoned") = Some(until);
    }

    pub fn search_active(&self, now: Instant) -> bool {
        self.search_until
            .lock()
            .expect("search_until poisoned")
            .map_or(false, |t| now < t)
    }

    pub fn open_search_window(&self, until: Instant) {
        *self.search_until.lock().expect("search_until poisoned") = Some(until);
    }
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new()
    }
}
