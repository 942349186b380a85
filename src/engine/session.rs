//! Game session tracking with an exit grace period.
//!
//! Games flicker out of process lists during map loads and driver resets, so
//! a tracked process has to be gone for a full grace window before the
//! session counts as over. While the window is open, phase evaluation is
//! suspended entirely.

use crate::config::GameConfig;
use crate::engine::interface::{AppCategory, AppClassifier, SystemMetrics};
use crate::engine::state::SessionMemory;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    GameStarted { process: String },
    GameEnded { process: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionVerdict {
    /// The grace window is open; skip phase evaluation this tick.
    pub suspend_phase_eval: bool,
    pub in_gaming_session: bool,
    pub events: Vec<SessionEvent>,
}

pub struct GameSessionTracker {
    config: GameConfig,
}

impl GameSessionTracker {
    pub fn new(config: GameConfig) -> Self {
        Self { config }
    }

    /// One tick of session bookkeeping. Runs before phase classification.
    pub fn observe(
        &self,
        metrics: &SystemMetrics,
        memory: &SessionMemory,
        classifier: &dyn AppClassifier,
        now: Instant,
    ) -> SessionVerdict {
        let mut events = Vec::new();
        let mut suspend = false;

        if let Some(tracked) = memory.tracked_game() {
            let running = metrics
                .running_processes
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&tracked));

            if running {
                if memory.game_grace_deadline().is_some() {
                    tracing::debug!("[Session] {} reappeared within grace window", tracked);
                    memory.set_game_grace_deadline(None);
                }
            } else {
                match memory.game_grace_deadline() {
                    None => {
                        let deadline = now + Duration::from_secs(self.config.exit_grace_secs);
                        tracing::info!(
                            "[Session] {} missing from process list, grace window opened",
                            tracked
                        );
                        memory.set_game_grace_deadline(Some(deadline));
                        suspend = true;
                    }
                    Some(deadline) if now < deadline => {
                        suspend = true;
                    }
                    Some(_) => {
                        tracing::info!("[Session] Game session over: {}", tracked);
                        memory.set_tracked_game(None);
                        memory.set_game_grace_deadline(None);
                        memory.set_in_gaming_session(false);
                        events.push(SessionEvent::GameEnded { process: tracked });
                    }
                }
            }
        }

        // Foreground window may start (or switch) a session.
        if !suspend {
            let active = metrics.active_process.to_lowercase();
            let excluded = self
                .config
                .excluded_processes
                .iter()
                .any(|p| active.contains(p.as_str()));
            if !excluded
                && !active.is_empty()
                && classifier.identify(&metrics.active_process, &metrics.active_window_title)
                    == Some(AppCategory::Game)
                && memory
                    .tracked_game()
                    .map_or(true, |t| !t.eq_ignore_ascii_case(&metrics.active_process))
            {
                tracing::info!("[Session] Tracking game process: {}", metrics.active_process);
                memory.set_tracked_game(Some(metrics.active_process.clone()));
                memory.set_game_grace_deadline(None);
                memory.set_in_gaming_session(true);
                events.push(SessionEvent::GameStarted {
                    process: metrics.active_process.clone(),
                });
            }
        }

        SessionVerdict {
            suspend_phase_eval: suspend,
            in_gaming_session: memory.in_gaming_session(),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::interface::NoopClassifier;

    struct GameClassifier;

    impl AppClassifier for GameClassifier {
        fn identify(&self, _process: &str, _window_title: &str) -> Option<AppCategory> {
            Some(AppCategory::Game)
        }
    }

    fn tracker() -> GameSessionTracker {
        GameSessionTracker::new(GameConfig::default())
    }

    fn metrics_with(active: &str, running: &[&str]) -> SystemMetrics {
        SystemMetrics {
            active_process: active.to_string(),
            running_processes: running.iter().map(|s| s.to_string()).collect(),
            ..SystemMetrics::default()
        }
    }

    #[test]
    fn foreground_game_starts_session() {
        let memory = SessionMemory::new();
        let verdict = tracker().observe(
            &metrics_with("eldenring.exe", &["eldenring.exe"]),
            &memory,
            &GameClassifier,
            Instant::now(),
        );
        assert!(verdict.in_gaming_session);
        assert_eq!(
            verdict.events,
            vec![SessionEvent::GameStarted { process: "eldenring.exe".to_string() }]
        );
        assert_eq!(memory.tracked_game().as_deref(), Some("eldenring.exe"));
    }

    #[test]
    fn launcher_is_never_tracked() {
        let memory = SessionMemory::new();
        let verdict = tracker().observe(
            &metrics_with("steamwebhelper.exe", &["steamwebhelper.exe"]),
            &memory,
            &GameClassifier,
            Instant::now(),
        );
        assert!(!verdict.in_gaming_session);
        assert!(memory.tracked_game().is_none());
    }

    #[test]
    fn short_absence_keeps_session_alive() {
        let memory = SessionMemory::new();
        let t = tracker();
        let start = Instant::now();
        t.observe(
            &metrics_with("game.exe", &["game.exe"]),
            &memory,
            &GameClassifier,
            start,
        );

        // Gone at t+1s: grace opens, phase eval suspended
        let verdict = t.observe(
            &metrics_with("explorer.exe", &[]),
            &memory,
            &NoopClassifier,
            start + Duration::from_secs(1),
        );
        assert!(verdict.suspend_phase_eval);
        assert!(verdict.in_gaming_session);

        // Back at t+9s (within the 10s grace): session untouched
        let verdict = t.observe(
            &metrics_with("game.exe", &["game.exe"]),
            &memory,
            &NoopClassifier,
            start + Duration::from_secs(9),
        );
        assert!(!verdict.suspend_phase_eval);
        assert!(verdict.in_gaming_session);
        assert_eq!(memory.tracked_game().as_deref(), Some("game.exe"));
        assert!(memory.game_grace_deadline().is_none());
    }

    #[test]
    fn long_absence_ends_session() {
        let memory = SessionMemory::new();
        let t = tracker();
        let start = Instant::now();
        t.observe(
            &metrics_with("game.exe", &["game.exe"]),
            &memory,
            &GameClassifier,
            start,
        );
        t.observe(
            &metrics_with("explorer.exe", &[]),
            &memory,
            &NoopClassifier,
            start + Duration::from_secs(1),
        );

        // Still gone at t+11s (grace opened at t+1s, expires t+11s)
        let verdict = t.observe(
            &metrics_with("explorer.exe", &[]),
            &memory,
            &NoopClassifier,
            start + Duration::from_secs(12),
        );
        assert!(!verdict.in_gaming_session);
        assert_eq!(
            verdict.events,
            vec![SessionEvent::GameEnded { process: "game.exe".to_string() }]
        );
        assert!(memory.tracked_game().is_none());
    }

    #[test]
    fn grace_window_suspends_phase_eval_every_tick() {
        let memory = SessionMemory::new();
        let t = tracker();
        let start = Instant::now();
        t.observe(
            &metrics_with("game.exe", &["game.exe"]),
            &memory,
            &GameClassifier,
            start,
        );
        for secs in [1u64, 3, 5, 7, 9] {
            let verdict = t.observe(
                &metrics_with("explorer.exe", &[]),
                &memory,
                &NoopClassifier,
                start + Duration::from_secs(secs),
            );
            assert!(verdict.suspend_phase_eval, "tick at +{}s should suspend", secs);
        }
    }

    #[test]
    fn switching_games_retracks() {
        let memory = SessionMemory::new();
        let t = tracker();
        let now = Instant::now();
        t.observe(
            &metrics_with("game_a.exe", &["game_a.exe"]),
            &memory,
            &GameClassifier,
            now,
        );
        let verdict = t.observe(
            &metrics_with("game_b.exe", &["game_a.exe", "game_b.exe"]),
            &memory,
            &GameClassifier,
            now + Duration::from_secs(5),
        );
        assert_eq!(memory.tracked_game().as_deref(), Some("game_b.exe"));
        assert_eq!(
            verdict.events,
            vec![SessionEvent::GameStarted { process: "game_b.exe".to_string() }]
        );
    }
}
