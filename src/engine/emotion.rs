//! Multi-entry emotion model.
//!
//! Unlike a single mood scalar, several emotions can be live at once, each
//! with its own intensity that decays over time. The visual output blends
//! every active entry by weight; the dominant entry picks the animation and
//! the speech pitch. One entry per tick may be "sticky": the phase-matched
//! idle emotion (or Focused at phase 0) is exempt from decay, so the face
//! never drifts back to neutral while the condition that caused it holds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Per-second intensity loss applied by `decay`.
pub const DEFAULT_DECAY_PER_SEC: f32 = 0.05;

/// Static definition of an emotion the model knows about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionDef {
    pub name: String,
    /// Animation/expression identifier handed to the renderer.
    pub visual_style: String,
    /// Multiplier applied to the voice pitch while dominant.
    pub pitch_modifier: f32,
    pub base_color: [u8; 3],
}

/// A live entry in the model. At most one per name.
#[derive(Debug, Clone)]
pub struct Emotion {
    pub name: String,
    pub intensity: f32,
    pub cause: Option<String>,
    pub last_trigger: Instant,
}

/// Blended output for the renderer. Never undefined: an empty model
/// resolves to a faint Observing state first.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualState {
    pub animation: String,
    pub color: [u8; 3],
    /// `min(1, Σ intensity)`.
    pub brightness: f32,
    pub pitch: f32,
}

/// Name of the entry exempt from decay for a committed phase.
pub fn sticky_name(phase: u8) -> String {
    if phase == 0 {
        "Focused".to_string()
    } else {
        format!("IdlePhase{}", phase)
    }
}

fn builtin_definitions() -> HashMap<String, EmotionDef> {
    let defs = [
        ("Observing", "idle_scan", 1.0, [120u8, 140, 170]),
        ("Focused", "narrow_eyes", 0.97, [90, 120, 200]),
        ("Curious", "head_tilt", 1.05, [90, 200, 160]),
        ("Restless", "fidget", 1.08, [220, 170, 60]),
        ("Cheerful", "bounce", 1.12, [250, 210, 80]),
        ("Excited", "sparkle", 1.15, [255, 120, 90]),
        ("Lonely", "droop", 0.92, [100, 110, 180]),
        ("Sleepy", "slow_blink", 0.88, [70, 70, 120]),
        ("Annoyed", "brow_furrow", 0.95, [200, 80, 80]),
        ("IdlePhase1", "glance_around", 1.0, [150, 180, 200]),
        ("IdlePhase2", "pace", 1.03, [190, 170, 110]),
        ("IdlePhase3", "slump", 0.95, [130, 120, 190]),
        ("IdlePhase4", "dim", 0.9, [80, 80, 140]),
    ];
    defs.into_iter()
        .map(|(name, style, pitch, color)| {
            (
                name.to_string(),
                EmotionDef {
                    name: name.to_string(),
                    visual_style: style.to_string(),
                    pitch_modifier: pitch,
                    base_color: color,
                },
            )
        })
        .collect()
}

/// Tint overrides applied when a cause names a known context.
fn cause_tint(cause: &str) -> Option<[u8; 3]> {
    let lower = cause.to_lowercase();
    if lower.contains("game") {
        Some([255, 90, 60])
    } else if lower.contains("returned") {
        Some([120, 255, 140])
    } else if lower.contains("music") {
        Some([200, 120, 255])
    } else {
        None
    }
}

pub struct EmotionModel {
    definitions: HashMap<String, EmotionDef>,
    /// BTreeMap keeps iteration lexicographic, which makes the dominant
    /// tie-break deterministic: equal intensities resolve to the smaller
    /// name.
    active: BTreeMap<String, Emotion>,
    decay_per_sec: f32,
}

impl EmotionModel {
    pub fn new() -> Self {
        Self::with_decay(DEFAULT_DECAY_PER_SEC)
    }

    pub fn with_decay(decay_per_sec: f32) -> Self {
        Self {
            definitions: builtin_definitions(),
            active: BTreeMap::new(),
            decay_per_sec,
        }
    }

    /// Raise (or lower, with a negative delta) an emotion's intensity.
    /// Unknown names are ignored; a typo in a trigger site must not panic a
    /// tick.
    pub fn trigger(&mut self, name: &str, delta: f32, cause: Option<&str>) {
        if !self.definitions.contains_key(name) {
            tracing::debug!("[Emotion] Ignoring unknown emotion trigger: {}", name);
            return;
        }
        let current = self.active.get(name).map_or(0.0, |e| e.intensity);
        let next = (current + delta).clamp(0.0, 1.0);
        if next <= 0.0 {
            self.active.remove(name);
            return;
        }
        let entry = self.active.entry(name.to_string()).or_insert_with(|| Emotion {
            name: name.to_string(),
            intensity: 0.0,
            cause: None,
            last_trigger: Instant::now(),
        });
        entry.intensity = next;
        entry.last_trigger = Instant::now();
        if let Some(cause) = cause {
            entry.cause = Some(cause.to_string());
        }
    }

    /// Time-based fade. The sticky entry for `current_phase` is skipped;
    /// every other entry that reaches zero is removed on the spot.
    pub fn decay(&mut self, delta_ms: u64, current_phase: u8) {
        let sticky = sticky_name(current_phase);
        let loss = self.decay_per_sec * delta_ms as f32 / 1000.0;
        self.active.retain(|name, emotion| {
            if *name == sticky {
                return true;
            }
            emotion.intensity = (emotion.intensity - loss).max(0.0);
            emotion.intensity > 0.0
        });
    }

    /// Max-intensity entry; ties go to the lexicographically smallest name.
    pub fn dominant(&self) -> Option<&Emotion> {
        self.active
            .values()
            .fold(None, |best: Option<&Emotion>, e| match best {
                Some(b) if b.intensity >= e.intensity => Some(b),
                _ => Some(e),
            })
    }

    pub fn intensity_of(&self, name: &str) -> f32 {
        self.active.get(name).map_or(0.0, |e| e.intensity)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Blend every active entry into a renderable state. Inserts a faint
    /// Observing entry first if nothing is active.
    pub fn visual_state(&mut self) -> VisualState {
        if self.active.is_empty() {
            self.trigger("Observing", 0.5, None);
        }

        let total: f32 = self.active.values().map(|e| e.intensity).sum();
        let mut blended = [0.0f32; 3];
        for emotion in self.active.values() {
            let def = &self.definitions[&emotion.name];
            let color = emotion
                .cause
                .as_deref()
                .and_then(cause_tint)
                .unwrap_or(def.base_color);
            let weight = emotion.intensity / total;
            for (acc, channel) in blended.iter_mut().zip(color) {
                *acc += channel as f32 * weight;
            }
        }

        let dominant = self.dominant().expect("at least Observing is active");
        let def = &self.definitions[&dominant.name];
        VisualState {
            animation: def.visual_style.clone(),
            color: blended.map(|c| c.round().clamp(0.0, 255.0) as u8),
            brightness: total.min(1.0),
            pitch: def.pitch_modifier,
        }
    }
}

impl Default for EmotionModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unknown_emotion_is_a_no_op() {
        let mut model = EmotionModel::new();
        model.trigger("Rhapsodic", 0.9, None);
        assert_eq!(model.active_count(), 0);
    }

    #[test]
    fn intensity_clamps_at_one() {
        let mut model = EmotionModel::new();
        model.trigger("Cheerful", 0.8, None);
        model.trigger("Cheerful", 0.8, None);
        assert_eq!(model.intensity_of("Cheerful"), 1.0);
    }

    #[test]
    fn entry_removed_the_instant_it_hits_zero() {
        let mut model = EmotionModel::new();
        model.trigger("Curious", 0.3, None);
        model.trigger("Curious", -0.5, None);
        assert_eq!(model.active_count(), 0);
    }

    #[test]
    fn decay_removes_expired_entries() {
        let mut model = EmotionModel::with_decay(0.05);
        model.trigger("Restless", 0.2, None);
        // 5 seconds at 5%/s wipes out 0.2
        model.decay(5_000, 0);
        assert_eq!(model.intensity_of("Restless"), 0.0);
        assert_eq!(model.active_count(), 0);
    }

    #[test]
    fn sticky_idle_emotion_survives_decay() {
        let mut model = EmotionModel::with_decay(0.05);
        model.trigger("IdlePhase2", 0.2, None);
        model.trigger("Curious", 0.2, None);
        model.decay(10_000, 2);
        assert_eq!(model.intensity_of("IdlePhase2"), 0.2, "sticky entry must not decay");
        assert_eq!(model.intensity_of("Curious"), 0.0);
    }

    #[test]
    fn sticky_stops_holding_when_phase_moves_on() {
        let mut model = EmotionModel::with_decay(0.05);
        model.trigger("IdlePhase2", 0.2, None);
        model.decay(10_000, 3);
        assert_eq!(model.intensity_of("IdlePhase2"), 0.0);
    }

    #[test]
    fn focused_is_sticky_at_phase_zero() {
        let mut model = EmotionModel::with_decay(0.05);
        model.trigger("Focused", 0.4, None);
        model.decay(60_000, 0);
        assert_eq!(model.intensity_of("Focused"), 0.4);
    }

    #[test]
    fn dominant_tie_breaks_lexicographically() {
        let mut model = EmotionModel::new();
        model.trigger("Restless", 0.5, None);
        model.trigger("Curious", 0.5, None);
        assert_eq!(model.dominant().unwrap().name, "Curious");
    }

    #[test]
    fn empty_model_resolves_to_observing() {
        let mut model = EmotionModel::new();
        let visual = model.visual_state();
        assert_eq!(visual.animation, "idle_scan");
        assert_eq!(visual.brightness, 0.5);
    }

    #[test]
    fn brightness_saturates_at_one() {
        let mut model = EmotionModel::new();
        model.trigger("Cheerful", 0.9, None);
        model.trigger("Curious", 0.9, None);
        assert_eq!(model.visual_state().brightness, 1.0);
    }

    #[test]
    fn single_entry_blend_is_its_base_color() {
        let mut model = EmotionModel::new();
        model.trigger("Annoyed", 0.7, None);
        assert_eq!(model.visual_state().color, [200, 80, 80]);
    }

    #[test]
    fn cause_tint_overrides_base_color() {
        let mut model = EmotionModel::new();
        model.trigger("Excited", 0.7, Some("game started"));
        assert_eq!(model.visual_state().color, [255, 90, 60]);
    }

    #[test]
    fn dominant_pitch_flavors_output() {
        let mut model = EmotionModel::new();
        model.trigger("Sleepy", 0.8, None);
        assert!((model.visual_state().pitch - 0.88).abs() < f32::EPSILON);
    }

    proptest! {
        #[test]
        fn intensity_always_in_unit_interval(
            ops in prop::collection::vec(
                (0usize..4, -2.0f32..2.0, 0u64..20_000, 0u8..5),
                1..60,
            )
        ) {
            let names = ["Cheerful", "Curious", "Lonely", "IdlePhase3"];
            let mut model = EmotionModel::new();
            for (idx, delta, decay_ms, phase) in ops {
                model.trigger(names[idx], delta, None);
                model.decay(decay_ms, phase);
                for name in names {
                    let intensity = model.intensity_of(name);
                    prop_assert!((0.0..=1.0).contains(&intensity));
                }
            }
        }

        #[test]
        fn blend_weights_sum_to_one(
            intensities in prop::collection::vec(0.05f32..1.0, 1..5)
        ) {
            let names = ["Cheerful", "Curious", "Lonely", "Restless", "Sleepy"];
            let mut model = EmotionModel::new();
            for (name, intensity) in names.iter().zip(&intensities) {
                model.trigger(name, *intensity, None);
            }
            // Weight-sum == 1 means every blended channel is a convex
            // combination of the contributing base colors, so each channel
            // stays inside the min/max of the inputs.
            let lo = [70u8, 70, 60];
            let hi = [250u8, 210, 180];
            let visual = model.visual_state();
            for ((channel, lo), hi) in visual.color.iter().zip(lo).zip(hi) {
                prop_assert!(*channel >= lo && *channel <= hi);
            }
            prop_assert!(visual.brightness >= 0.0 && visual.brightness <= 1.0);
        }
    }
}
