use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use tracing::Level;

/// Installs the global `tracing` subscriber for the binary.
///
/// # Arguments
///
/// * `level` - One of `error`, `warn`, `info`, `debug`, `trace`; anything else falls back to `info`
pub fn init_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    // a second initialisation (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Appends a row to a CSV journal, creating headers if the file is new
///
/// # Arguments
///
/// * `log_dir` - Directory holding the journal (created when missing)
/// * `filename` - The name of the CSV file
/// * `headers` - Column headers (only written if file is new)
/// * `data` - Row of data to append
///
/// # Returns
///
/// * `io::Result<()>` - Success or error result
pub fn log_csv(log_dir: &Path, filename: &str, headers: &[&str], data: &[String]) -> io::Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let path = log_dir.join(filename);
    let file_exists = path.exists();

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    // Write headers if file is new
    if !file_exists && !headers.is_empty() {
        writer.write_record(headers)?;
    }

    writer.write_record(data)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("logs");
        let headers = ["a", "b"];
        log_csv(&journal, "runs.csv", &headers, &["1".into(), "x,y".into()]).unwrap();
        log_csv(&journal, "runs.csv", &headers, &["2".into(), "z".into()]).unwrap();

        let contents = std::fs::read_to_string(journal.join("runs.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["a,b", "1,\"x,y\"", "2,z"]);
    }
}
