use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, instrument};
use vqlog_protocol::{Exporter, QlogError, QlogResult};

/// Writes exported artifacts as plain files under one directory.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn target(&self, filename: &str) -> QlogResult<PathBuf> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename == "."
            || filename == ".."
        {
            return Err(QlogError::Export(format!(
                "invalid export filename: {filename:?}"
            )));
        }
        Ok(self.dir.join(filename))
    }
}

#[async_trait]
impl Exporter for FileExporter {
    #[instrument(skip(self, data), fields(filename, bytes = data.len()))]
    async fn export(&self, filename: &str, data: &str) -> QlogResult<()> {
        let path = self.target(filename)?;
        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, data).await?;
        info!(path = %path.display(), "artifact exported");
        Ok(())
    }
}
