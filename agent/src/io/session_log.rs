//! Append-only session log under `.agent/<run-id>/`.
//!
//! Every step writes its raw assistant reply, and `run` steps also write the
//! command text and captured output. Artifacts are named
//! `step_<NN>_<kind>.txt` with zero padding wide enough for the step budget,
//! so a plain directory listing sorts in step order. Files are created with
//! create-new semantics: recording the same artifact twice is an error, never
//! an overwrite.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub const DEFAULT_LOG_DIR: &str = ".agent";

/// Kind of per-step artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Assistant,
    Command,
    Output,
}

impl Artifact {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Command => "command",
            Self::Output => "output",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    dir: PathBuf,
    width: usize,
}

impl SessionLog {
    /// Create a fresh run directory under `log_dir` named after the current UTC time.
    pub fn create(log_dir: &Path, max_steps: u32) -> Result<Self> {
        let dir = create_run_dir(log_dir, &run_id_for(Utc::now()))?;
        info!(dir = %dir.display(), "session log created");
        Ok(Self::at(dir, max_steps))
    }

    /// Use `dir` as the run directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>, max_steps: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create session log dir {}", dir.display()))?;
        Ok(Self::at(dir, max_steps))
    }

    fn at(dir: PathBuf, max_steps: u32) -> Self {
        let width = max_steps.to_string().len().max(2);
        Self { dir, width }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, step: u32, artifact: Artifact) -> PathBuf {
        self.dir.join(format!(
            "step_{step:0width$}_{}.txt",
            artifact.as_str(),
            width = self.width
        ))
    }

    pub fn record_assistant(&self, step: u32, text: &str) -> Result<PathBuf> {
        self.record(step, Artifact::Assistant, text)
    }

    pub fn record_command(&self, step: u32, command: &str) -> Result<PathBuf> {
        self.record(step, Artifact::Command, command)
    }

    pub fn record_output(&self, step: u32, output: &str) -> Result<PathBuf> {
        self.record(step, Artifact::Output, output)
    }

    fn record(&self, step: u32, artifact: Artifact, contents: &str) -> Result<PathBuf> {
        let path = self.artifact_path(step, artifact);
        write_new(&path, contents)?;
        debug!(step, artifact = artifact.as_str(), path = %path.display(), "recorded artifact");
        Ok(path)
    }
}

/// Run directory name for a start time, e.g. `run-20240131_235959`.
pub fn run_id_for(now: DateTime<Utc>) -> String {
    format!("run-{}", now.format("%Y%m%d_%H%M%S"))
}

/// Create `log_dir/run_id`, suffixing `-2`, `-3`, ... when the name is taken.
fn create_run_dir(log_dir: &Path, run_id: &str) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;
    for attempt in 1u32..=1000 {
        let name = if attempt == 1 {
            run_id.to_string()
        } else {
            format!("{run_id}-{attempt}")
        };
        let dir = log_dir.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("create run dir {}", dir.display()));
            }
        }
    }
    bail!(
        "no free run directory for {run_id} under {}",
        log_dir.display()
    )
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("create artifact {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write {}", path.display()))
}
