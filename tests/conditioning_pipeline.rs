use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use p300_oddball::conditioning::ConditioningPipeline;
use p300_oddball::config::{ConditioningConfig, PersistenceConfig};
use p300_oddball::P300Error;

const FS: f64 = 256.0;
const SAMPLES: usize = 1024;

fn alpha(i: usize) -> f64 {
    20.0 * (2.0 * PI * 10.0 * i as f64 / FS).sin()
}

fn line_noise(i: usize) -> f64 {
    20.0 * (2.0 * PI * 60.0 * i as f64 / FS).sin()
}

/// Four seconds of 10 Hz plus 60 Hz on every channel, one tagged sample every
/// 32 with every fourth tag a target.
fn write_recording(path: &Path) {
    let mut contents = String::from(",CP3,C3,F5,PO3,PO4,F6,C4,CP4,marker\n");
    for i in 0..SAMPLES {
        let marker = match i % 32 {
            0 if i % 128 == 0 => 2,
            0 => 1,
            _ => 0,
        };
        let value = alpha(i) + line_noise(i);
        let channels = vec![value.to_string(); 8].join(",");
        contents.push_str(&format!("{},{},{}\n", i, channels, marker));
    }
    std::fs::write(path, contents).unwrap();
}

/// First channel and marker columns of a conditioned output.
fn read_output(path: &Path) -> (Vec<f64>, Vec<u8>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let mut channel = Vec::new();
    let mut markers = Vec::new();
    for record in reader.records() {
        let record = record.unwrap();
        channel.push(record[2].parse::<f64>().unwrap());
        markers.push(record[record.len() - 1].parse::<u8>().unwrap());
    }
    (channel, markers)
}

fn pipeline(seed: u64) -> ConditioningPipeline {
    let config = ConditioningConfig {
        balance_seed: Some(seed),
        ..ConditioningConfig::default()
    };
    ConditioningPipeline::new(config, PersistenceConfig::default().channel_names)
}

#[test]
fn batch_filters_and_balances_each_recording() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("subject1.csv");
    write_recording(&good);
    let ragged = dir.path().join("ragged.csv");
    std::fs::write(&ragged, ",CP3,C3,F5,PO3,PO4,F6,C4,CP4,marker\n0,1,2,3\n").unwrap();
    let missing = dir.path().join("missing.csv");

    let inputs: Vec<PathBuf> = vec![good.clone(), ragged.clone(), missing.clone()];
    let results = pipeline(5).process_batch(&inputs);

    let order: Vec<&PathBuf> = results.iter().map(|(input, _)| input).collect();
    assert_eq!(order, inputs.iter().collect::<Vec<_>>());
    assert!(matches!(results[1].1, Err(P300Error::DataShape(_))));
    assert!(matches!(results[2].1, Err(P300Error::FileAccess { .. })));

    let processed = results[0].1.as_ref().unwrap();
    assert_eq!(processed.samples, SAMPLES);
    assert_eq!(processed.output.path, dir.path().join("subject1_balanced.csv"));
    assert_eq!(processed.marker_counts, Some([SAMPLES - 32, 8, 8, 16]));
    let balance = processed.balance.unwrap();
    assert_eq!(balance.targets, 8);
    assert_eq!(balance.nontargets_before, 24);
    assert_eq!(balance.excluded, 16);

    let (channel, markers) = read_output(&processed.output.path);
    assert_eq!(channel.len(), SAMPLES);
    assert_eq!(markers.iter().filter(|m| **m == 2).count(), 8);

    // away from the edges the output is a scaled copy of the 10 Hz component
    let middle = 256..768;
    let reference: Vec<f64> = middle.clone().map(alpha).collect();
    let kept = &channel[middle];
    let gain = kept.iter().zip(&reference).map(|(y, s)| y * s).sum::<f64>()
        / reference.iter().map(|s| s * s).sum::<f64>();
    assert!(gain > 0.8 && gain < 1.05, "10 Hz gain {}", gain);
    let residual = (kept
        .iter()
        .zip(&reference)
        .map(|(y, s)| (y - gain * s).powi(2))
        .sum::<f64>()
        / kept.len() as f64)
        .sqrt();
    assert!(residual < 1.5, "residual rms {}", residual);
}

#[test]
fn same_seed_excludes_the_same_positions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("subject2.csv");
    write_recording(&input);

    let first = pipeline(11).process_file(&input).unwrap();
    let second = pipeline(11).process_file(&input).unwrap();
    assert_ne!(first.output.path, second.output.path);

    let (_, a) = read_output(&first.output.path);
    let (_, b) = read_output(&second.output.path);
    assert_eq!(a, b);
    // only non-targets were relabeled
    let original: Vec<u8> = (0..SAMPLES)
        .map(|i| match i % 32 {
            0 if i % 128 == 0 => 2,
            0 => 1,
            _ => 0,
        })
        .collect();
    for (before, after) in original.iter().zip(&a) {
        if before != after {
            assert_eq!((*before, *after), (1, 3));
        }
    }
}
