//! Dialogue selection: weighted rarity mixing plus an anti-repetition
//! window backed by the external spoken-line store.

use crate::config::GapRange;
use crate::engine::interface::{DialogueLine, Rarity, SpokenLineRecord, SpokenLineStore};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// How many recently spoken keys per phase are excluded from re-selection.
pub const REPEAT_WINDOW: usize = 5;

pub struct DialogueSelector;

impl DialogueSelector {
    /// Pick one line for `phase`.
    ///
    /// With `can_be_rare` and a hit on `1/rare_chance`, the rare pool is
    /// mixed into the candidates. Recently spoken keys are filtered out, but
    /// a non-empty pool always yields a line: if filtering would empty it,
    /// the unfiltered pool is used instead.
    pub async fn select(
        common: &[DialogueLine],
        rare: &[DialogueLine],
        rare_chance: u32,
        can_be_rare: bool,
        phase: u8,
        store: &dyn SpokenLineStore,
    ) -> Option<DialogueLine> {
        let draw_rare =
            can_be_rare && rare_chance > 0 && rand::thread_rng().gen_range(0..rare_chance) == 0;

        let mut candidates: Vec<&DialogueLine> = common.iter().collect();
        if draw_rare {
            candidates.extend(rare.iter());
        }
        if candidates.is_empty() {
            return None;
        }

        let recent: HashSet<String> = match store.recent_keys(phase, REPEAT_WINDOW).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("[Dialogue] recent_keys failed, skipping repeat filter: {}", e);
                HashSet::new()
            }
        };

        let fresh: Vec<&&DialogueLine> = candidates
            .iter()
            .filter(|line| line.key.as_ref().map_or(true, |k| !recent.contains(k)))
            .collect();

        let chosen = if fresh.is_empty() {
            // Everything was spoken recently; repeating beats silence.
            *candidates.choose(&mut rand::thread_rng())?
        } else {
            **fresh.choose(&mut rand::thread_rng())?
        };

        let record = SpokenLineRecord {
            line_key: chosen.key.clone(),
            line_text: chosen.text.clone(),
            spoken_at_ms: chrono::Utc::now().timestamp_millis(),
            phase,
        };
        if let Err(e) = store.record(&record).await {
            tracing::warn!("[Dialogue] failed to record spoken line: {}", e);
        }

        Some(chosen.clone())
    }

    /// Random gap before the next autonomous line in this phase.
    pub fn schedule_gap(gap: &GapRange) -> Duration {
        if gap.min_secs >= gap.max_secs {
            return Duration::from_secs(gap.min_secs);
        }
        Duration::from_secs(rand::thread_rng().gen_range(gap.min_secs..=gap.max_secs))
    }
}
