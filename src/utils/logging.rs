//! Plain-text transcript of queries and final responses (`--log <file>`).

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct TranscriptLog {
    file_path: Option<PathBuf>,
}

impl TranscriptLog {
    pub fn disabled() -> Self {
        Self { file_path: None }
    }

    /// Opens `path` for appending; fails early when it is not writable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.into();
        test_file_access(&path)?;
        Ok(Self {
            file_path: Some(path),
        })
    }

    pub fn from_option(path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::open(path),
            None => Ok(Self::disabled()),
        }
    }

    pub fn log_exchange(&self, query: &str, response: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write_block(&format!("> {query}"))?;
        self.write_block(response)
    }

    /// Lines prefixed with `##`, used for errors and lifecycle notes.
    pub fn log_note(&self, note: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write_block(&format!("## {note}"))
    }

    fn write_block(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn test_file_access(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}
