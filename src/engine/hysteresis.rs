//! Phase-commit hysteresis and mute gating.
//!
//! Escalations commit immediately; a return to phase 0 only commits after a
//! configured run of consecutive agreeing ticks, and never while muted. The
//! transition logic is a pure function returning effects as data, so it can
//! be tested without touching audio or the OS.

use crate::config::MuteConfig;
use crate::engine::interface::{SpecialLine, SystemMetrics};

/// Side effects the engine applies after a transition is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Speak(SpecialLine),
    ClearFinalPlayed,
    CancelMonologue,
    StartMonologue,
    EmotionPulse {
        name: &'static str,
        delta: f32,
        cause: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseDecision {
    NoChange,
    /// The commit is pending more agreeing ticks.
    Debouncing { ticks_so_far: u32 },
    Commit { from: u8, to: u8, effects: Vec<Effect> },
}

/// Whether the companion must stay silent this tick.
///
/// Fullscreen alone is not enough: a maximized browser is normal desktop
/// use, not a presentation or a movie.
pub fn should_be_muted(metrics: &SystemMetrics, mute: &MuteConfig, manually_muted: bool) -> bool {
    if manually_muted {
        return true;
    }
    let active = metrics.active_process.to_lowercase();
    let hard_match = mute
        .hard_mute_processes
        .iter()
        .any(|name| !name.is_empty() && active.contains(name.as_str()));
    hard_match
        || metrics.is_streaming
        || metrics.is_playing_media
        || (metrics.is_fullscreen && !metrics.browser_active)
}

/// Evaluate one tick of the classifier output against the committed phase.
///
/// Returns the new debounce counter plus the decision. The caller owns the
/// counter (it lives in `CompanionState::consecutive_active_ticks`).
pub fn evaluate(
    target: u8,
    committed: u8,
    locked_out: bool,
    counter: u32,
    debounce_ticks: u32,
) -> (u32, PhaseDecision) {
    if target == committed {
        return (0, PhaseDecision::NoChange);
    }

    // Idle return: the only debounced transition.
    if target == 0 {
        if locked_out {
            // Frozen while muted; retried once the mute lifts.
            return (0, PhaseDecision::NoChange);
        }
        let counter = counter + 1;
        if counter < debounce_ticks {
            return (counter, PhaseDecision::Debouncing { ticks_so_far: counter });
        }
        let mut effects = vec![Effect::ClearFinalPlayed];
        if committed >= 4 {
            effects.push(Effect::CancelMonologue);
            effects.push(Effect::Speak(SpecialLine::Interrupted));
        } else {
            effects.push(Effect::Speak(SpecialLine::ReturnFromIdle));
        }
        effects.push(Effect::EmotionPulse {
            name: "Cheerful",
            delta: 0.6,
            cause: "user returned",
        });
        return (
            0,
            PhaseDecision::Commit {
                from: committed,
                to: 0,
                effects,
            },
        );
    }

    // Everything else (escalation, or de-escalation not reaching 0)
    // commits on the spot.
    let mut effects = Vec::new();
    if target == 4 {
        effects.push(Effect::StartMonologue);
    }
    (
        0,
        PhaseDecision::Commit {
            from: committed,
            to: target,
            effects,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuteConfig;

    fn metrics() -> SystemMetrics {
        SystemMetrics::default()
    }

    #[test]
    fn mute_on_streaming_and_media() {
        let mute = MuteConfig::default();
        let mut m = metrics();
        assert!(!should_be_muted(&m, &mute, false));
        m.is_streaming = true;
        assert!(should_be_muted(&m, &mute, false));
        m.is_streaming = false;
        m.is_playing_media = true;
        assert!(should_be_muted(&m, &mute, false));
    }

    #[test]
    fn fullscreen_browser_is_not_muted() {
        let mute = MuteConfig::default();
        let mut m = metrics();
        m.is_fullscreen = true;
        m.browser_active = true;
        assert!(!should_be_muted(&m, &mute, false));
        m.browser_active = false;
        assert!(should_be_muted(&m, &mute, false));
    }

    #[test]
    fn hard_mute_process_match() {
        let mute = MuteConfig::default();
        let mut m = metrics();
        m.active_process = "OBS64.exe".to_string();
        assert!(should_be_muted(&m, &mute, false));
    }

    #[test]
    fn manual_mute_wins() {
        assert!(should_be_muted(&metrics(), &MuteConfig::default(), true));
    }

    #[test]
    fn escalation_commits_immediately() {
        let (counter, decision) = evaluate(2, 1, false, 0, 3);
        assert_eq!(counter, 0);
        assert!(matches!(decision, PhaseDecision::Commit { from: 1, to: 2, .. }));
    }

    #[test]
    fn de_escalation_not_to_zero_commits_immediately() {
        let (_, decision) = evaluate(1, 3, false, 2, 3);
        assert!(matches!(decision, PhaseDecision::Commit { from: 3, to: 1, .. }));
    }

    #[test]
    fn idle_return_requires_three_consecutive_ticks() {
        let (c1, d1) = evaluate(0, 2, false, 0, 3);
        assert_eq!((c1, &d1), (1, &PhaseDecision::Debouncing { ticks_so_far: 1 }));
        let (c2, d2) = evaluate(0, 2, false, c1, 3);
        assert_eq!((c2, &d2), (2, &PhaseDecision::Debouncing { ticks_so_far: 2 }));
        let (c3, d3) = evaluate(0, 2, false, c2, 3);
        assert_eq!(c3, 0);
        assert!(matches!(d3, PhaseDecision::Commit { from: 2, to: 0, .. }));
    }

    #[test]
    fn counter_resets_on_non_zero_tick() {
        // Two agreeing ticks, then the classifier flips back to the phase
        let (c1, _) = evaluate(0, 2, false, 0, 3);
        let (c2, _) = evaluate(0, 2, false, c1, 3);
        assert_eq!(c2, 2);
        let (c3, d3) = evaluate(2, 2, false, c2, 3);
        assert_eq!(c3, 0);
        assert_eq!(d3, PhaseDecision::NoChange);
        // Full run required again from scratch
        let (c4, d4) = evaluate(0, 2, false, c3, 3);
        assert_eq!((c4, &d4), (1, &PhaseDecision::Debouncing { ticks_so_far: 1 }));
    }

    #[test]
    fn locked_out_freezes_idle_return() {
        for _ in 0..20 {
            let (counter, decision) = evaluate(0, 3, true, 0, 3);
            assert_eq!(counter, 0);
            assert_eq!(decision, PhaseDecision::NoChange);
        }
    }

    #[test]
    fn return_from_phase_four_speaks_interrupted() {
        let (_, decision) = evaluate(0, 4, false, 2, 3);
        let PhaseDecision::Commit { effects, .. } = decision else {
            panic!("expected commit");
        };
        assert!(effects.contains(&Effect::CancelMonologue));
        assert!(effects.contains(&Effect::Speak(SpecialLine::Interrupted)));
        assert!(!effects.contains(&Effect::Speak(SpecialLine::ReturnFromIdle)));
    }

    #[test]
    fn return_from_lower_phase_speaks_celebration() {
        let (_, decision) = evaluate(0, 2, false, 2, 3);
        let PhaseDecision::Commit { effects, .. } = decision else {
            panic!("expected commit");
        };
        assert!(effects.contains(&Effect::Speak(SpecialLine::ReturnFromIdle)));
        assert!(!effects.contains(&Effect::CancelMonologue));
    }

    #[test]
    fn escalation_to_four_starts_monologue() {
        let (_, decision) = evaluate(4, 3, false, 0, 3);
        let PhaseDecision::Commit { effects, .. } = decision else {
            panic!("expected commit");
        };
        assert_eq!(effects, vec![Effect::StartMonologue]);
    }
}
