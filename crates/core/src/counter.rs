use crate::naming::{NamePattern, MAX_COUNTER};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("counter exhausted in {}: {} is the highest four-digit counter", .directory.display(), MAX_COUNTER)]
pub struct CounterOverflow {
    pub directory: PathBuf,
}

/// Per-directory source of strictly increasing counters.
///
/// The ledger starts from the highest counter found on disk and never
/// hands out a number at or below anything it has seen or issued.
#[derive(Debug, Clone)]
pub struct CounterLedger {
    directory: PathBuf,
    pattern: NamePattern,
    initial: u32,
    highest: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSummary {
    pub directory: PathBuf,
    pub highest_before: u32,
    pub highest_after: u32,
}

impl CounterLedger {
    pub fn scan(directory: &Path, separator: char) -> Result<Self> {
        let mut names = Vec::new();
        for entry in fs::read_dir(directory)
            .with_context(|| format!("cannot read directory: {}", directory.display()))?
        {
            let entry =
                entry.with_context(|| format!("cannot read entry in: {}", directory.display()))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(Self::from_names(directory, separator, names))
    }

    pub fn from_names<I, S>(directory: &Path, separator: char, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pattern = NamePattern::new(separator);
        let highest = names
            .into_iter()
            .filter_map(|name| pattern.parse(name.as_ref()).map(|p| p.counter))
            .max()
            .unwrap_or(0);

        log::debug!(
            "counter ledger for {}: highest existing {:04}",
            directory.display(),
            highest
        );

        Self {
            directory: directory.to_path_buf(),
            pattern,
            initial: highest,
            highest,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }

    pub fn is_processed(&self, file_name: &str) -> bool {
        self.pattern.is_processed(file_name)
    }

    pub fn highest(&self) -> u32 {
        self.highest
    }

    pub fn next_counter(&mut self) -> Result<u32, CounterOverflow> {
        if self.highest >= MAX_COUNTER {
            return Err(CounterOverflow {
                directory: self.directory.clone(),
            });
        }
        self.highest += 1;
        Ok(self.highest)
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            directory: self.directory.clone(),
            highest_before: self.initial,
            highest_after: self.highest,
        }
    }
}
