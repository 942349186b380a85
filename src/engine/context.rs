//! The engine: owns all behavior state, wires the collaborators together
//! and exposes the per-tick evaluation plus the command-path entry points.

use crate::config::EngineConfig;
use crate::engine::dialogue::DialogueSelector;
use crate::engine::emotion::{sticky_name, EmotionModel, VisualState};
use crate::engine::hysteresis::{self, Effect, PhaseDecision};
use crate::engine::interface::{
    AppClassifier, AudioRefresh, EmptyLinePool, IdleNetwork, LinePoolProvider, NetworkProbe,
    NoopAudioRefresh, NoopClassifier, NoopOsActions, NoopStore, NullTelemetry, OsActions, Rarity,
    SilentSink, SpecialLine, SpeechSink, SpokenLineStore, SystemMetrics, TelemetryProvider,
};
use crate::engine::monologue::{LogoutSequencer, SequencerDeps, SequencerHandle};
use crate::engine::phase::classify;
use crate::engine::session::{GameSessionTracker, SessionEvent};
use crate::engine::state::{CompanionMode, CompanionState, SessionMemory, FAR_FUTURE};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// CPU load treated as "something heavy is running".
const HIGH_CPU_PERCENT: f32 = 90.0;
/// Sustained high load before the companion gets audibly annoyed.
const HIGH_CPU_GRACE: Duration = Duration::from_secs(60);
/// Delay before the boot greeting, so audio devices have settled.
const BOOT_GREETING_DELAY: Duration = Duration::from_secs(2);

pub struct CompanionEngine {
    config: EngineConfig,
    companion: Arc<Mutex<CompanionState>>,
    memory: Arc<SessionMemory>,
    emotions: Mutex<EmotionModel>,
    tracker: GameSessionTracker,
    sequencer: StdMutex<Option<SequencerHandle>>,
    last_tick: StdMutex<Instant>,

    telemetry: Arc<dyn TelemetryProvider>,
    lines: Arc<dyn LinePoolProvider>,
    store: Arc<dyn SpokenLineStore>,
    sink: Arc<dyn SpeechSink>,
    os: Arc<dyn OsActions>,
    classifier: Arc<dyn AppClassifier>,
    audio: Arc<dyn AudioRefresh>,
    probe: Arc<dyn NetworkProbe>,
}

impl CompanionEngine {
    /// Engine with no-op collaborators; wire the real ones with the
    /// `with_*` setters.
    pub fn new(config: EngineConfig) -> Self {
        let tracker = GameSessionTracker::new(config.game.clone());
        let emotions = Mutex::new(EmotionModel::with_decay(config.emotion_decay_per_sec));
        Self {
            config,
            companion: Arc::new(Mutex::new(CompanionState::new())),
            memory: Arc::new(SessionMemory::new()),
            emotions,
            tracker,
            sequencer: StdMutex::new(None),
            last_tick: StdMutex::new(Instant::now()),
            telemetry: Arc::new(NullTelemetry),
            lines: Arc::new(EmptyLinePool),
            store: Arc::new(NoopStore),
            sink: Arc::new(SilentSink),
            os: Arc::new(NoopOsActions),
            classifier: Arc::new(NoopClassifier),
            audio: Arc::new(NoopAudioRefresh),
            probe: Arc::new(IdleNetwork),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryProvider>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_lines(mut self, lines: Arc<dyn LinePoolProvider>) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SpokenLineStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SpeechSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_os(mut self, os: Arc<dyn OsActions>) -> Self {
        self.os = os;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn AppClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_audio_refresh(mut self, audio: Arc<dyn AudioRefresh>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_network_probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn current_phase(&self) -> u8 {
        self.memory.current_phase()
    }

    // ── Command path (concurrent with the tick loop) ──────

    pub async fn trigger_emotion(&self, name: &str, delta: f32, cause: Option<&str>) {
        self.emotions.lock().await.trigger(name, delta, cause);
    }

    pub async fn visual_state(&self) -> VisualState {
        self.emotions.lock().await.visual_state()
    }

    pub async fn set_manual_mute(&self, muted: bool) {
        self.companion.lock().await.manually_muted = muted;
        tracing::info!("[Engine] Manual mute set to {}", muted);
    }

    pub async fn set_mode(&self, mode: CompanionMode) {
        self.companion.lock().await.current_mode = mode;
    }

    pub async fn reward_patience(&self, delta: f32) {
        self.companion.lock().await.reward_patience(delta);
    }

    /// Suspend autonomous speech while a privileged command is in flight.
    pub fn open_privileged_window(&self, duration: Duration) {
        self.memory.open_privileged_window(Instant::now() + duration);
    }

    /// Suspend autonomous speech while a search answer is on screen.
    pub fn open_search_window(&self, duration: Duration) {
        self.memory.open_search_window(Instant::now() + duration);
    }

    // ── Tick evaluation ───────────────────────────────────

    /// One heartbeat. Telemetry or store failures degrade the tick, they
    /// never abort the loop.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let now = Instant::now();
        let delta = {
            let mut last = self.last_tick.lock().expect("last_tick poisoned");
            let delta = now.duration_since(*last);
            *last = now;
            delta
        };

        // Emotions and patience fade regardless of telemetry health.
        self.emotions
            .lock()
            .await
            .decay(delta.as_millis() as u64, self.memory.current_phase());
        {
            let mut companion = self.companion.lock().await;
            companion.decay_patience(delta, self.config.patience_decay_per_sec);
        }

        let metrics = match self.telemetry.sample().await {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!("[Engine] Telemetry sample failed, degrading tick: {}", e);
                return Ok(());
            }
        };

        self.track_cpu_pressure(&metrics, now).await;
        let locked_out = self.update_mute_state(&metrics, now).await;
        self.boot_greeting(now, locked_out).await;

        // Session bookkeeping gates everything downstream.
        let verdict = self
            .tracker
            .observe(&metrics, &self.memory, self.classifier.as_ref(), now);
        for event in &verdict.events {
            match event {
                SessionEvent::GameStarted { process } => {
                    self.emotions
                        .lock()
                        .await
                        .trigger("Excited", 0.7, Some("game started"));
                    if !locked_out {
                        self.speak_special(SpecialLine::GameStart, now).await;
                    }
                    tracing::info!("[Engine] Game session started: {}", process);
                }
                SessionEvent::GameEnded { .. } => {
                    // Game exits can leave capture devices claiming stale
                    // formats; let the audio collaborator re-open them.
                    self.audio.refresh();
                }
            }
        }

        if verdict.suspend_phase_eval {
            return Ok(());
        }

        let target = classify(
            metrics.idle_minutes,
            verdict.in_gaming_session,
            &self.config.thresholds,
        );
        let committed = self.memory.current_phase();
        let (counter, decision) = {
            let companion = self.companion.lock().await;
            hysteresis::evaluate(
                target,
                committed,
                companion.locked_out,
                companion.consecutive_active_ticks,
                self.config.debounce_ticks,
            )
        };
        self.companion.lock().await.consecutive_active_ticks = counter;

        if let PhaseDecision::Commit { from, to, effects } = decision {
            tracing::info!("[Engine] Phase commit {} -> {}", from, to);
            self.memory.set_current_phase(to);
            if to > 0 {
                self.emotions
                    .lock()
                    .await
                    .trigger(&sticky_name(to), 0.5, Some("idle escalation"));
            }
            self.apply_effects(effects, &metrics, locked_out, now).await;
        } else if target == 4
            && committed == 4
            && !locked_out
            && !self.memory.in_phase4_monologue()
        {
            // A phase-4 commit that landed on a muted tick never armed the
            // farewell; arm it on the first unmuted tick still in the band.
            self.start_monologue(&metrics, locked_out).await;
        }

        self.autonomous_speech(&metrics, locked_out, now).await;
        Ok(())
    }

    async fn track_cpu_pressure(&self, metrics: &SystemMetrics, now: Instant) {
        let mut companion = self.companion.lock().await;
        if metrics.cpu_percent >= HIGH_CPU_PERCENT {
            let since = *companion.high_cpu_since.get_or_insert(now);
            if now.duration_since(since) >= HIGH_CPU_GRACE {
                drop(companion);
                self.emotions
                    .lock()
                    .await
                    .trigger("Annoyed", 0.05, Some("cpu pressure"));
            }
        } else {
            companion.high_cpu_since = None;
        }
    }

    async fn boot_greeting(&self, now: Instant, locked_out: bool) {
        if locked_out {
            // Stays pending and plays once the mute lifts.
            return;
        }
        let due = {
            let companion = self.companion.lock().await;
            !companion.boot_greeting_played
                && now.duration_since(companion.app_start_time) >= BOOT_GREETING_DELAY
        };
        if due {
            self.companion.lock().await.boot_greeting_played = true;
            self.speak_special(SpecialLine::BootGreeting, now).await;
        }
    }

    /// Recompute the mute state; returns the new `locked_out` value. While
    /// locked out, scheduling is pushed to the far future every tick.
    async fn update_mute_state(&self, metrics: &SystemMetrics, now: Instant) -> bool {
        let mut companion = self.companion.lock().await;
        let muted = companion.current_mode == CompanionMode::DndAssistant
            || hysteresis::should_be_muted(metrics, &self.config.mute, companion.manually_muted);
        if muted != companion.locked_out {
            // Edge-triggered: one log line per toggle.
            if muted {
                tracing::info!("[Engine] Muted (process={})", metrics.active_process);
            } else {
                tracing::info!("[Engine] Unmuted");
            }
            companion.locked_out = muted;
        }
        if muted {
            companion.next_speak_at = now + FAR_FUTURE;
        } else if companion.next_speak_at > now + FAR_FUTURE / 2 {
            // Coming out of a mute: speak after a normal short pause
            // instead of never.
            companion.next_speak_at = now + Duration::from_secs(30);
        }
        muted
    }

    async fn apply_effects(
        &self,
        effects: Vec<Effect>,
        metrics: &SystemMetrics,
        locked_out: bool,
        now: Instant,
    ) {
        for effect in effects {
            match effect {
                Effect::ClearFinalPlayed => {
                    self.companion.lock().await.final_played = false;
                }
                Effect::CancelMonologue => self.cancel_monologue(),
                Effect::Speak(kind) => {
                    if !locked_out {
                        if kind == SpecialLine::ReturnFromIdle {
                            self.companion.lock().await.login_greeting_played = true;
                        }
                        self.speak_special(kind, now).await;
                    }
                }
                Effect::EmotionPulse { name, delta, cause } => {
                    self.emotions.lock().await.trigger(name, delta, Some(cause));
                }
                Effect::StartMonologue => {
                    self.start_monologue(metrics, locked_out).await;
                }
            }
        }
    }

    fn cancel_monologue(&self) {
        let guard = self.sequencer.lock().expect("sequencer slot poisoned");
        if let Some(handle) = guard.as_ref() {
            handle.cancel();
            self.sink.cancel();
        }
        self.memory.set_in_phase4_monologue(false);
    }

    async fn start_monologue(&self, _metrics: &SystemMetrics, locked_out: bool) {
        if locked_out {
            // The phase commit stands; the tick loop re-arms the monologue
            // on the first unmuted tick still at phase 4.
            return;
        }
        {
            let companion = self.companion.lock().await;
            if companion.final_played {
                return;
            }
        }
        if self.memory.in_gaming_session() {
            return;
        }
        {
            let guard = self.sequencer.lock().expect("sequencer slot poisoned");
            if guard.as_ref().map_or(false, |h| !h.is_finished()) {
                return;
            }
        }

        let chunks: Vec<String> = self
            .lines
            .special(SpecialLine::FarewellMonologue)
            .into_iter()
            .map(|line| line.text)
            .collect();
        let warning = self
            .lines
            .special(SpecialLine::LogoutWarning)
            .first()
            .map(|line| line.text.clone());
        if chunks.is_empty() && warning.is_none() {
            tracing::warn!("[Engine] No farewell lines authored, skipping logout sequence");
            return;
        }

        let handle = LogoutSequencer::start(
            self.config.logout.clone(),
            self.config.thresholds,
            chunks,
            warning,
            SequencerDeps {
                sink: Arc::clone(&self.sink),
                probe: Arc::clone(&self.probe),
                os: Arc::clone(&self.os),
                telemetry: Arc::clone(&self.telemetry),
                memory: Arc::clone(&self.memory),
                companion: Arc::clone(&self.companion),
            },
        );
        *self.sequencer.lock().expect("sequencer slot poisoned") = Some(handle);
    }

    /// Regular per-phase chatter for phases 1..=3.
    async fn autonomous_speech(&self, _metrics: &SystemMetrics, locked_out: bool, now: Instant) {
        let phase = self.memory.current_phase();
        if locked_out || !(1..=3).contains(&phase) {
            return;
        }
        if self.memory.in_phase4_monologue()
            || self.memory.privileged_active(now)
            || self.memory.search_active(now)
        {
            return;
        }
        {
            let companion = self.companion.lock().await;
            if now < companion.next_speak_at {
                return;
            }
        }
        if now < self.memory.speech_end() {
            return;
        }

        let common = self.lines.phase_lines(phase, Rarity::Common);
        let rare = self.lines.phase_lines(phase, Rarity::Rare);
        let rare_chance = self.config.rare_chance[(phase - 1) as usize];
        let chosen = DialogueSelector::select(
            &common,
            &rare,
            rare_chance,
            true,
            phase,
            self.store.as_ref(),
        )
        .await;

        let gap = DialogueSelector::schedule_gap(&self.config.gaps[(phase - 1) as usize]);
        self.companion.lock().await.next_speak_at = now + gap;

        let Some(line) = chosen else {
            return;
        };
        self.say(&line.text).await;

        // Cosmetic flavoring, not part of the selection contract.
        let flavor = rand::thread_rng().gen_bool(0.15);
        if flavor {
            let name = if phase > 1 { "Restless" } else { "Curious" };
            self.emotions.lock().await.trigger(name, 0.2, Some("chatter"));
        }
    }

    async fn speak_special(&self, kind: SpecialLine, _now: Instant) {
        let pool = self.lines.special(kind);
        let Some(line) = pool.choose(&mut rand::thread_rng()).cloned() else {
            return;
        };
        self.say(&line.text).await;
    }

    async fn say(&self, text: &str) {
        match self.sink.speak(text).await {
            Ok(audible) => self.memory.extend_speech_end(Instant::now() + audible),
            Err(e) => tracing::warn!("[Engine] Speech failed: {}", e),
        }
    }
}
