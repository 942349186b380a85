//! Engine configuration: idle thresholds, speech gaps, mute heuristics and
//! the logout sequence constants. Loaded from a JSON file with defaults for
//! anything missing; malformed threshold tables are rejected at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("idle thresholds must be strictly ascending, got {0:?}")]
    NonMonotonicThresholds([f64; 5]),
    #[error("gap range for phase {phase} has min {min}s > max {max}s")]
    InvertedGapRange { phase: u8, min: u64, max: u64 },
    #[error("debounce tick count must be at least 1")]
    ZeroDebounce,
    #[error("logout wait intervals must be non-zero")]
    ZeroLogoutWait,
}

/// Idle-minute marks for the phase bands, plus the mark the logout sequence
/// re-validates against right before pulling the trigger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleThresholds {
    /// Phase 1: first "are you there" remarks.
    pub notice_mins: f64,
    /// Phase 2: restless commentary.
    pub restless_mins: f64,
    /// Phase 3: lonely monologue fragments.
    pub lonely_mins: f64,
    /// Phase 4: extended farewell + logout sequence.
    pub farewell_mins: f64,
    /// Minimum idle the logout execution step re-checks before acting.
    pub logout_mins: f64,
}

impl Default for IdleThresholds {
    fn default() -> Self {
        Self {
            notice_mins: 5.0,
            restless_mins: 10.0,
            lonely_mins: 20.0,
            farewell_mins: 27.0,
            logout_mins: 30.0,
        }
    }
}

/// Min/max seconds between autonomous lines within one phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GapRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuteConfig {
    /// Process names (lowercase substrings) that hard-mute the companion.
    pub hard_mute_processes: Vec<String>,
}

impl Default for MuteConfig {
    fn default() -> Self {
        Self {
            hard_mute_processes: vec![
                "obs64".to_string(),
                "obs".to_string(),
                "zoom".to_string(),
                "teams".to_string(),
                "discord".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// How long a tracked game process may vanish before the session ends.
    pub exit_grace_secs: u64,
    /// Launcher / overlay helpers that must never be tracked as games.
    pub excluded_processes: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            exit_grace_secs: 10,
            excluded_processes: vec![
                "steam".to_string(),
                "steamwebhelper".to_string(),
                "epicgameslauncher".to_string(),
                "gameoverlayui".to_string(),
                "launcher".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoutConfig {
    /// Process-name fragments whose network traffic blocks the logout.
    pub update_client_fragments: Vec<String>,
    /// Bytes over the 1s probe window that count as "still downloading".
    pub network_threshold_bytes: u64,
    /// Sleep between network re-checks while an update client is busy.
    pub recheck_secs: u64,
    /// Grace between the warning line and the logout itself.
    pub warn_wait_secs: u64,
    /// Pause between farewell monologue chunks.
    pub chunk_delay_ms: u64,
    /// Browsers closed right before the logout call.
    pub browser_processes: Vec<String>,
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            update_client_fragments: vec![
                "steam".to_string(),
                "epicgames".to_string(),
                "battle.net".to_string(),
                "goggalaxy".to_string(),
            ],
            network_threshold_bytes: 200_000,
            recheck_secs: 60,
            warn_wait_secs: 30,
            chunk_delay_ms: 4_000,
            browser_processes: vec![
                "firefox".to_string(),
                "chrome".to_string(),
                "msedge".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_secs: u64,
    pub thresholds: IdleThresholds,
    /// Gap ranges for phases 1..=4 (index = phase - 1).
    pub gaps: [GapRange; 4],
    /// Rare-pool denominators for phases 1..=4. A draw of 0 in
    /// `0..rare_chance[p-1]` mixes the rare pool in. 0 disables rares.
    pub rare_chance: [u32; 4],
    /// Consecutive phase-0 ticks required before an idle-return commits.
    pub debounce_ticks: u32,
    pub mute: MuteConfig,
    pub game: GameConfig,
    pub logout: LogoutConfig,
    /// Emotion intensity lost per second.
    pub emotion_decay_per_sec: f32,
    pub patience_decay_per_sec: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            thresholds: IdleThresholds::default(),
            gaps: [
                GapRange { min_secs: 90, max_secs: 240 },
                GapRange { min_secs: 60, max_secs: 180 },
                GapRange { min_secs: 45, max_secs: 120 },
                GapRange { min_secs: 30, max_secs: 90 },
            ],
            rare_chance: [8, 6, 5, 4],
            debounce_ticks: 3,
            mute: MuteConfig::default(),
            game: GameConfig::default(),
            logout: LogoutConfig::default(),
            emotion_decay_per_sec: 0.05,
            patience_decay_per_sec: 0.002,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. A missing file yields validated defaults;
    /// unreadable JSON or a bad threshold table is a startup error rather
    /// than something discovered mid-run.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str::<EngineConfig>(&content).map_err(|e| ConfigError::Parse {
                    path: path.display().to_string(),
                    source: e,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("[Config] No config file at {}, using defaults", path.display());
                EngineConfig::default()
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file (pretty-printed, parent dirs created).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).expect("config serialization is infallible");
        std::fs::write(path, json).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let seq = [
            t.notice_mins,
            t.restless_mins,
            t.lonely_mins,
            t.farewell_mins,
            t.logout_mins,
        ];
        if seq.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::NonMonotonicThresholds(seq));
        }
        for (i, gap) in self.gaps.iter().enumerate() {
            if gap.min_secs > gap.max_secs {
                return Err(ConfigError::InvertedGapRange {
                    phase: (i + 1) as u8,
                    min: gap.min_secs,
                    max: gap.max_secs,
                });
            }
        }
        if self.debounce_ticks == 0 {
            return Err(ConfigError::ZeroDebounce);
        }
        if self.logout.recheck_secs == 0 || self.logout.warn_wait_secs == 0 {
            return Err(ConfigError::ZeroLogoutWait);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn non_monotonic_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.restless_mins = config.thresholds.notice_mins;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonMonotonicThresholds(_))
        ));
    }

    #[test]
    fn inverted_gap_range_rejected() {
        let mut config = EngineConfig::default();
        config.gaps[2] = GapRange { min_secs: 100, max_secs: 50 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedGapRange { phase: 3, .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(config.debounce_ticks, 3);
    }

    #[test]
    fn malformed_json_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn bad_thresholds_in_file_fail_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("engine.json");
        let mut config = EngineConfig::default();
        config.thresholds.farewell_mins = 1.0;
        config.save(&path).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::NonMonotonicThresholds(_))
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub/engine.json");
        let mut config = EngineConfig::default();
        config.debounce_ticks = 5;
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.debounce_ticks, 5);
    }
}
