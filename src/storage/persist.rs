use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

/// One JSON file per logical table, atomically replaced on write:
/// write-to-temp-then-rename so a crash mid-write never corrupts the
/// previous snapshot.
pub struct TableFile {
    path: PathBuf,
}

impl TableFile {
    pub fn new(data_dir: &Path, table_name: &str) -> Self {
        Self {
            path: data_dir.join(format!("{table_name}.json")),
        }
    }

    pub async fn load<T: DeserializeOwned + Default>(&self) -> T {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(
                        file = %self.path.display(),
                        error = %e,
                        "failed to parse persisted table, starting from an empty one"
                    );
                    T::default()
                }
            },
            Err(_) => T::default(),
        }
    }

    pub async fn save<T: Serialize + Sync>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create data directory")?;
        }
        let content = serde_json::to_string_pretty(value)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
