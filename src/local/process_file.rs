use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::conditioning::{ConditioningPipeline, ProcessedFile};
use crate::config::Config;
use crate::error::Result;

/// Conditions and balances `inputs` in parallel and prints one line per file.
///
/// # Returns
///
/// * `usize` - Number of files that failed
pub fn run(config: &Config, inputs: &[PathBuf]) -> usize {
    let start_time = Instant::now();
    let pipeline = ConditioningPipeline::new(
        config.conditioning.clone(),
        config.persistence.channel_names.clone(),
    );

    let results = pipeline.process_batch(inputs);
    let failures = results.iter().filter(|(_, result)| result.is_err()).count();
    for (input, result) in &results {
        print_outcome(input, result);
    }

    info!(
        files = inputs.len(),
        failures,
        elapsed = ?start_time.elapsed(),
        "batch conditioning finished"
    );
    failures
}

fn print_outcome(input: &Path, result: &Result<ProcessedFile>) {
    match result {
        Ok(processed) => {
            println!(
                "{} {} -> {} ({} samples)",
                "ok".green().bold(),
                input.display(),
                processed.output.path.display(),
                processed.samples
            );
            if let Some(counts) = processed.marker_counts {
                println!(
                    "   markers  0: {}  1: {}  2: {}  3: {}",
                    counts[0], counts[1], counts[2], counts[3]
                );
            }
        }
        Err(err) => println!("{} {}: {}", "failed".red().bold(), input.display(), err),
    }
}
