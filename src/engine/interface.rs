//! Collaborator contracts. The engine only decides; sampling the OS,
//! producing dialogue text, persisting history and making noise are all
//! behind these traits. Every trait has an explicit no-op implementation so
//! the engine can be constructed without wiring anything up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

// ── Wire types ─────────────────────────────────────────────

/// One tick's view of the machine, sampled by the telemetry collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub idle_minutes: f64,
    pub active_process: String,
    pub active_window_title: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub is_streaming: bool,
    pub is_playing_media: bool,
    pub is_fullscreen: bool,
    pub browser_active: bool,
    pub running_processes: Vec<String>,
}

/// A candidate utterance. `key` is the anti-repetition token; keyless lines
/// are never filtered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueLine {
    pub key: Option<String>,
    pub text: String,
}

impl DialogueLine {
    pub fn keyed(key: &str, text: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            text: text.to_string(),
        }
    }
}

/// What gets persisted every time a line is actually chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpokenLineRecord {
    pub line_key: Option<String>,
    pub line_text: String,
    pub spoken_at_ms: i64,
    pub phase: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rarity {
    Common,
    Rare,
}

/// Fixed-purpose lines outside the per-phase pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialLine {
    BootGreeting,
    ReturnFromIdle,
    /// Spoken instead of the celebratory return when the farewell sequence
    /// was interrupted mid-flight.
    Interrupted,
    /// Ordered chunks of the extended-idle farewell.
    FarewellMonologue,
    LogoutWarning,
    GameStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCategory {
    Game,
    Browser,
    Media,
    Work,
    Other,
}

// ── Collaborator traits ────────────────────────────────────

#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Cheap enough to call every tick.
    async fn sample(&self) -> anyhow::Result<SystemMetrics>;
}

pub trait LinePoolProvider: Send + Sync {
    /// Authored lines for a phase at the given rarity. May be empty.
    fn phase_lines(&self, phase: u8, rarity: Rarity) -> Vec<DialogueLine>;
    /// Fixed-purpose lines; for `FarewellMonologue` the order is the
    /// speaking order. May be empty.
    fn special(&self, kind: SpecialLine) -> Vec<DialogueLine>;
}

/// Best-effort history store. An `Err` from either method degrades the
/// anti-repetition window for that selection, nothing more.
#[async_trait]
pub trait SpokenLineStore: Send + Sync {
    async fn record(&self, record: &SpokenLineRecord) -> anyhow::Result<()>;
    async fn recent_keys(&self, phase: u8, limit: usize) -> anyhow::Result<HashSet<String>>;
}

#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Start speaking and return the estimated audible duration. The engine
    /// uses the estimate to gate the next autonomous line.
    async fn speak(&self, text: &str) -> anyhow::Result<Duration>;
    /// Stop whatever is currently audible.
    fn cancel(&self);
}

/// Fire-and-forget OS side effects. `logout` reports failure so the caller
/// can decide whether the farewell counts as played.
pub trait OsActions: Send + Sync {
    fn terminate_processes(&self, names: &[String]);
    fn logout(&self) -> anyhow::Result<()>;
}

pub trait AppClassifier: Send + Sync {
    fn identify(&self, process: &str, window_title: &str) -> Option<AppCategory>;
}

/// Hint sent after a game session ends; game exits can leave capture
/// hardware in a stale state.
pub trait AudioRefresh: Send + Sync {
    fn refresh(&self);
}

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Max bytes moved by any process whose name contains one of the
    /// fragments, measured over `window`.
    async fn bytes_in_window(&self, fragments: &[String], window: Duration) -> u64;
}

// ── No-op defaults ─────────────────────────────────────────

pub struct NullTelemetry;

#[async_trait]
impl TelemetryProvider for NullTelemetry {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
        Ok(SystemMetrics::default())
    }
}

pub struct EmptyLinePool;

impl LinePoolProvider for EmptyLinePool {
    fn phase_lines(&self, _phase: u8, _rarity: Rarity) -> Vec<DialogueLine> {
        Vec::new()
    }
    fn special(&self, _kind: SpecialLine) -> Vec<DialogueLine> {
        Vec::new()
    }
}

pub struct NoopStore;

#[async_trait]
impl SpokenLineStore for NoopStore {
    async fn record(&self, _record: &SpokenLineRecord) -> anyhow::Result<()> {
        Ok(())
    }
    async fn recent_keys(&self, _phase: u8, _limit: usize) -> anyhow::Result<HashSet<String>> {
        Ok(HashSet::new())
    }
}

pub struct SilentSink;

#[async_trait]
impl SpeechSink for SilentSink {
    async fn speak(&self, _text: &str) -> anyhow::Result<Duration> {
        Ok(Duration::ZERO)
    }
    fn cancel(&self) {}
}

pub struct NoopOsActions;

impl OsActions for NoopOsActions {
    fn terminate_processes(&self, _names: &[String]) {}
    fn logout(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopClassifier;

impl AppClassifier for NoopClassifier {
    fn identify(&self, _process: &str, _window_title: &str) -> Option<AppCategory> {
        None
    }
}

pub struct NoopAudioRefresh;

impl AudioRefresh for NoopAudioRefresh {
    fn refresh(&self) {}
}

pub struct IdleNetwork;

#[async_trait]
impl NetworkProbe for IdleNetwork {
    async fn bytes_in_window(&self, _fragments: &[String], _window: Duration) -> u64 {
        0
    }
}
