// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::acquisition::acquisition_loop::{LabelingPolicy, TaggingMode};
use crate::conditioning::layout::ColumnLayout;
use crate::error::{P300Error, Result};
use crate::session::persist::WritePolicy;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    pub stimulus: StimulusConfig,
    pub persistence: PersistenceConfig,
    pub conditioning: ConditioningConfig,
}

// ACQUISITION -----------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub poll_interval_ms: u64,
    pub buffer_size: usize,
    pub sampling_rate: f64,
    pub labeling: LabelingPolicy,
    pub tagging: TaggingMode,
    pub max_consecutive_failures: usize,
    pub poll_deadline_ms: u64,
    pub join_timeout_ms: u64,
    pub gateway: GatewayConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            buffer_size: 45000,
            sampling_rate: 256.0,
            labeling: LabelingPolicy::StampFirst,
            tagging: TaggingMode::Software,
            max_consecutive_failures: 3,
            poll_deadline_ms: 2000,
            join_timeout_ms: 2000,
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayConfig {
    Synthetic {
        #[serde(default)]
        seed: Option<u64>,
        #[serde(default = "default_noise_uv")]
        noise_uv: f64,
    },
    Playback {
        path: PathBuf,
        #[serde(default = "default_playback_layout")]
        layout: ColumnLayout,
    },
}

fn default_noise_uv() -> f64 {
    10.0
}

fn default_playback_layout() -> ColumnLayout {
    ColumnLayout::Train
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig::Synthetic {
            seed: None,
            noise_uv: default_noise_uv(),
        }
    }
}

// STIMULUS --------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StimulusConfig {
    pub policy: SequencePolicyConfig,
    pub inter_stimulus_interval_ms: u64,
    pub nontarget_duration_ms: u64,
    pub target_duration_ms: DurationRange,
    pub frame_rate: u32,
    pub seed: Option<u64>,
    pub session_limit_secs: Option<f64>,
    pub screen: ScreenConfig,
    pub target_letters: Vec<char>,
    pub target_colors: Vec<[u8; 3]>,
    pub target_size: SizeRange,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            policy: SequencePolicyConfig::default(),
            inter_stimulus_interval_ms: 300,
            nontarget_duration_ms: 200,
            target_duration_ms: DurationRange { min: 50, max: 150 },
            frame_rate: 60,
            seed: None,
            session_limit_secs: None,
            screen: ScreenConfig::default(),
            target_letters: vec!['A', 'B', 'C', 'D'],
            target_colors: vec![[255, 0, 0], [0, 255, 0], [255, 255, 0], [128, 0, 128]],
            target_size: SizeRange { min: 200, max: 400 },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequencePolicyConfig {
    Bernoulli { p_target: f64, p_flash: f64 },
    Shuffled { total: usize, target_ratio: f64 },
}

impl Default for SequencePolicyConfig {
    fn default() -> Self {
        SequencePolicyConfig::Shuffled {
            total: 250,
            target_ratio: 0.2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

// PERSISTENCE -----------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    pub output_path: PathBuf,
    pub write_policy: WritePolicy,
    pub channel_names: Vec<String>,
    pub journal_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("recordings/p300.csv"),
            write_policy: WritePolicy::NewFile,
            channel_names: ["CP3", "C3", "F5", "PO3", "PO4", "F6", "C4", "CP4"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            journal_dir: Some(PathBuf::from("logs")),
        }
    }
}

// CONDITIONING ----------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConditioningConfig {
    pub layout: ColumnLayout,
    pub sampling_rate: f64,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub notch_hz: f64,
    pub notch_quality: f64,
    pub balance: bool,
    pub balance_seed: Option<u64>,
    pub output_suffix: String,
    pub write_policy: WritePolicy,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            layout: ColumnLayout::Train,
            sampling_rate: 256.0,
            band_low_hz: 1.0,
            band_high_hz: 18.0,
            notch_hz: 60.0,
            notch_quality: 30.0,
            balance: true,
            balance_seed: None,
            output_suffix: "_balanced".to_string(),
            write_policy: WritePolicy::NewFile,
        }
    }
}

// VALIDATION ------------------------------------------------------------------

impl Config {
    pub fn validate(&self) -> Result<()> {
        let acquisition = &self.acquisition;
        if acquisition.poll_interval_ms == 0 {
            return Err(P300Error::Config("poll_interval_ms must be positive".into()));
        }
        if acquisition.max_consecutive_failures == 0 {
            return Err(P300Error::Config(
                "max_consecutive_failures must be at least 1".into(),
            ));
        }
        if !(acquisition.sampling_rate > 0.0) {
            return Err(P300Error::Config("sampling_rate must be positive".into()));
        }

        let stimulus = &self.stimulus;
        match stimulus.policy {
            SequencePolicyConfig::Bernoulli { p_target, p_flash } => {
                let valid = (0.0..=1.0).contains(&p_target)
                    && (0.0..=1.0).contains(&p_flash)
                    && p_target + p_flash <= 1.0;
                if !valid {
                    return Err(P300Error::Config(format!(
                        "bernoulli probabilities must lie in [0, 1] and sum to at most 1 (p_target {}, p_flash {})",
                        p_target, p_flash
                    )));
                }
            }
            SequencePolicyConfig::Shuffled {
                total,
                target_ratio,
            } => {
                if total == 0 || !(target_ratio > 0.0 && target_ratio < 1.0) {
                    return Err(P300Error::Config(format!(
                        "shuffled sequence needs total > 0 and target_ratio in (0, 1) (total {}, ratio {})",
                        total, target_ratio
                    )));
                }
            }
        }
        if stimulus.target_letters.is_empty()
            || stimulus.target_letters.len() != stimulus.target_colors.len()
        {
            return Err(P300Error::Config(
                "target_letters and target_colors must be non-empty and of equal length".into(),
            ));
        }
        if stimulus.target_duration_ms.min > stimulus.target_duration_ms.max
            || stimulus.target_size.min > stimulus.target_size.max
        {
            return Err(P300Error::Config(
                "target duration and size ranges must have min <= max".into(),
            ));
        }
        if stimulus.frame_rate == 0 {
            return Err(P300Error::Config("frame_rate must be positive".into()));
        }
        if let Some(limit) = stimulus.session_limit_secs {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(P300Error::Config(format!(
                    "session_limit_secs must be a positive number of seconds, got {}",
                    limit
                )));
            }
        }

        if self.persistence.channel_names.len() != crate::acquisition::CHANNEL_COUNT {
            return Err(P300Error::Config(format!(
                "expected {} channel names, got {}",
                crate::acquisition::CHANNEL_COUNT,
                self.persistence.channel_names.len()
            )));
        }

        let conditioning = &self.conditioning;
        let nyquist = conditioning.sampling_rate / 2.0;
        let band_ok = conditioning.band_low_hz > 0.0
            && conditioning.band_low_hz < conditioning.band_high_hz
            && conditioning.band_high_hz < nyquist;
        if !band_ok {
            return Err(P300Error::Config(format!(
                "band-pass {}-{} Hz does not fit below Nyquist {} Hz",
                conditioning.band_low_hz, conditioning.band_high_hz, nyquist
            )));
        }
        if !(conditioning.notch_hz > 0.0 && conditioning.notch_hz < nyquist) {
            return Err(P300Error::Config(format!(
                "notch frequency {} Hz must lie below Nyquist {} Hz",
                conditioning.notch_hz, nyquist
            )));
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .map_err(|e| P300Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let config: Config = serde_yaml::from_str(&config_str)
        .map_err(|e| P300Error::Config(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(config)
        .map_err(|e| P300Error::Config(format!("Failed to serialize config: {}", e)))?;

    fs::write(path.as_ref(), yaml)
        .map_err(|e| P300Error::file_access(path.as_ref(), format!("Failed to write config file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = r#"
acquisition:
  poll_interval_ms: 50
  labeling: stamp_all
stimulus:
  policy:
    kind: bernoulli
    p_target: 0.2
    p_flash: 0.5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.acquisition.poll_interval_ms, 50);
        assert_eq!(config.acquisition.labeling, LabelingPolicy::StampAll);
        assert_eq!(config.acquisition.buffer_size, 45000);
        assert_eq!(
            config.stimulus.policy,
            SequencePolicyConfig::Bernoulli {
                p_target: 0.2,
                p_flash: 0.5
            }
        );
        assert_eq!(config.conditioning.band_high_hz, 18.0);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_probabilities_above_one() {
        let mut config = Config::default();
        config.stimulus.policy = SequencePolicyConfig::Bernoulli {
            p_target: 0.6,
            p_flash: 0.6,
        };
        assert!(matches!(config.validate(), Err(P300Error::Config(_))));
    }

    #[test]
    fn rejects_notch_above_nyquist() {
        let mut config = Config::default();
        config.conditioning.sampling_rate = 100.0;
        config.conditioning.band_high_hz = 18.0;
        config.conditioning.notch_hz = 60.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.stimulus.seed = Some(7);
        config.conditioning.layout = ColumnLayout::Fusion;
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.stimulus.seed, Some(7));
        assert_eq!(loaded.conditioning.layout, ColumnLayout::Fusion);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let shipped: Config = serde_yaml::from_str(include_str!("../../config.yaml")).unwrap();
        shipped.validate().unwrap();
        assert_eq!(shipped.stimulus.policy, SequencePolicyConfig::default());
        assert_eq!(shipped.persistence.channel_names, PersistenceConfig::default().channel_names);
        assert_eq!(shipped.conditioning.notch_quality, 30.0);
    }

    #[test]
    fn missing_config_file_is_reported() {
        assert!(matches!(
            load_config("/definitely/not/here.yaml"),
            Err(P300Error::Config(_))
        ));
    }
}
