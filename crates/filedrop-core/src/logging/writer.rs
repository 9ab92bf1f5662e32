//! Append-only journal files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::JournalEntry;

/// Appends entries to `<log-dir>/raw/<date>_<run>.jsonl`.
pub struct JournalWriter {
    run: String,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JournalWriter {
    pub fn new(log_dir: impl AsRef<Path>, run: impl Into<String>) -> std::io::Result<Self> {
        let run = run.into();
        let raw_dir = log_dir.as_ref().join("raw");
        fs::create_dir_all(&raw_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = raw_dir.join(format!("{}_{}.jsonl", date, run));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            run,
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one entry as a single line and flush it.
    pub fn write(&self, entry: &JournalEntry) -> std::io::Result<()> {
        let json = entry
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Read every journal under `log_dir`, sorted by timestamp.
///
/// Unparseable lines are skipped.
pub fn read_journal(log_dir: impl AsRef<Path>) -> std::io::Result<Vec<JournalEntry>> {
    read_matching(log_dir.as_ref(), |_| true)
}

/// Read the journal of a single run.
pub fn read_run(log_dir: impl AsRef<Path>, run: &str) -> std::io::Result<Vec<JournalEntry>> {
    let suffix = format!("_{}.jsonl", run);
    read_matching(log_dir.as_ref(), |name| name.ends_with(&suffix))
}

fn read_matching(log_dir: &Path, keep: impl Fn(&str) -> bool) -> std::io::Result<Vec<JournalEntry>> {
    let raw_dir = log_dir.join("raw");
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(&raw_dir)? {
        let path = dir_entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".jsonl") || !keep(name) {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        entries.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter_map(|line| JournalEntry::from_json_line(line).ok()),
        );
    }

    entries.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(entries)
}
