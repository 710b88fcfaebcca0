use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::traits::{DeadLetter, DeadLetterSink};

/// Appends one JSON object per line, creating parent directories on demand.
pub struct JsonlDeadLetterSink {
    path: PathBuf,
    // Serializes appends so concurrent failures never interleave lines.
    write_lock: Mutex<()>,
}

impl JsonlDeadLetterSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, letter: &DeadLetter) -> Result<()> {
        let mut line = serde_json::to_string(letter).context("serialize dead letter")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl DeadLetterSink for JsonlDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) {
        if let Err(e) = self.append(letter).await {
            tracing::warn!(
                path = %self.path.display(),
                trace_id = %letter.trace_id,
                error = %e,
                "dead letter write failed"
            );
        }
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
