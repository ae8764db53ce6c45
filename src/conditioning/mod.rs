// src/conditioning/mod.rs

pub mod balancer;
pub mod layout;
pub mod reader;
pub mod recording;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::ConditioningConfig;
use crate::error::{P300Error, Result};
use crate::filters::{BiquadBackend, DspBackend};
use crate::session::persist::PersistReport;

use self::balancer::{balance_markers, BalanceReport};
use self::reader::read_recording;
use self::recording::FilteredRecording;

/// Outcome for one input file of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub output: PersistReport,
    pub samples: usize,
    pub balance: Option<BalanceReport>,
    /// Marker value counts after balancing
    pub marker_counts: Option<[usize; 4]>,
}

/// Offline pipeline: parse, band-pass, notch, then optionally balance.
pub struct ConditioningPipeline<B: DspBackend = BiquadBackend> {
    config: ConditioningConfig,
    channel_names: Vec<String>,
    backend: B,
}

impl ConditioningPipeline<BiquadBackend> {
    pub fn new(config: ConditioningConfig, channel_names: Vec<String>) -> Self {
        Self::with_backend(config, channel_names, BiquadBackend::new())
    }
}

impl<B: DspBackend> ConditioningPipeline<B> {
    pub fn with_backend(config: ConditioningConfig, channel_names: Vec<String>, backend: B) -> Self {
        Self {
            config,
            channel_names,
            backend,
        }
    }

    /// Reads `path` and filters every channel: band-pass first, then notch.
    /// Shape problems surface before any filtering starts.
    pub fn condition(&self, path: &Path) -> Result<FilteredRecording> {
        let config = &self.config;
        let mut recording = read_recording(path, config.layout, config.sampling_rate)?;
        if config.balance && recording.markers().is_none() {
            return Err(P300Error::DataShape(format!(
                "{} layout has no marker column to balance",
                config.layout
            )));
        }

        let fs = recording.sampling_rate();
        recording
            .channels_mut()
            .par_iter_mut()
            .try_for_each(|channel| {
                self.backend
                    .bandpass_zero_phase(channel, fs, config.band_low_hz, config.band_high_hz)?;
                self.backend
                    .notch_zero_phase(channel, fs, config.notch_hz, config.notch_quality)
            })?;
        Ok(recording)
    }

    /// Conditions, balances and writes one recording next to its input.
    pub fn process_file(&self, path: &Path) -> Result<ProcessedFile> {
        let mut recording = self.condition(path)?;

        let balance = match recording.markers_mut() {
            Some(markers) if self.config.balance => {
                Some(balance_markers(markers, self.config.balance_seed))
            }
            _ => None,
        };

        let output = recording.write_csv(
            &self.output_path(path),
            self.config.write_policy,
            &self.channel_names,
        )?;
        let processed = ProcessedFile {
            input: path.to_path_buf(),
            samples: recording.len(),
            balance,
            marker_counts: recording.marker_counts(),
            output,
        };
        info!(
            input = %path.display(),
            output = %processed.output.path.display(),
            samples = processed.samples,
            "recording conditioned"
        );
        Ok(processed)
    }

    /// `<dir>/<stem><suffix>.csv` for an input `<dir>/<stem>.<ext>`.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());
        input.with_file_name(format!("{}{}.csv", stem, self.config.output_suffix))
    }

    /// Processes every input in parallel. A failing file never stops the
    /// others; results come back in input order.
    pub fn process_batch(&self, inputs: &[PathBuf]) -> Vec<(PathBuf, Result<ProcessedFile>)> {
        inputs
            .par_iter()
            .map(|input| {
                let result = self.process_file(input);
                if let Err(err) = &result {
                    error!(input = %input.display(), error = %err, "conditioning failed");
                }
                (input.clone(), result)
            })
            .collect()
    }
}
