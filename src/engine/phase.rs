//! Idle-phase classification. Pure function over the sampled idle time;
//! everything stateful (debounce, mute gating) lives in the hysteresis
//! controller.

use crate::config::IdleThresholds;

/// Map an idle duration onto a phase 0..=4.
///
/// An active game caps escalation at phase 3: the user may be idle at the
/// keyboard for a cutscene or a long load, and the farewell sequence must
/// never arm while a game is running.
pub fn classify(idle_minutes: f64, is_gaming: bool, thresholds: &IdleThresholds) -> u8 {
    if idle_minutes < thresholds.notice_mins {
        0
    } else if idle_minutes < thresholds.restless_mins {
        1
    } else if idle_minutes < thresholds.lonely_mins {
        2
    } else if idle_minutes < thresholds.farewell_mins {
        3
    } else if is_gaming {
        3
    } else {
        4
    }
}
