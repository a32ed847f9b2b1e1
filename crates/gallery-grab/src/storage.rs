//! Persistence of fetched image payloads.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use crate::config::CollisionPolicy;
use crate::types::{GrabError, GrabResult};

/// Extension given to every saved image.
const IMAGE_EXTENSION: &str = "jpg";

/// Upper bound on `_n` suffixes tried under [`CollisionPolicy::UniqueSuffix`].
const MAX_SUFFIX: u32 = 10_000;

/// Writes payloads into an existing directory.
#[derive(Debug, Clone)]
pub struct ImageWriter {
    dir: PathBuf,
    policy: CollisionPolicy,
}

impl ImageWriter {
    /// `dir` must already exist; the writer never creates directories.
    pub fn new(dir: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    /// Deterministic destination for the candidate at `ordinal` (zero-based).
    pub fn destination(&self, query: &str, ordinal: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{IMAGE_EXTENSION}", file_stem(query, ordinal)))
    }

    /// Write `bytes` for the candidate at `ordinal` and return the path used.
    pub async fn write(&self, query: &str, ordinal: usize, bytes: &[u8]) -> GrabResult<PathBuf> {
        let path = self.destination(query, ordinal);
        match self.policy {
            CollisionPolicy::Overwrite => {
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|source| GrabError::Persist {
                        path: path.clone(),
                        source,
                    })?;
                Ok(path)
            }
            CollisionPolicy::UniqueSuffix => {
                self.write_unique(&file_stem(query, ordinal), bytes).await
            }
        }
    }

    async fn write_unique(&self, stem: &str, bytes: &[u8]) -> GrabResult<PathBuf> {
        for n in 0..MAX_SUFFIX {
            let name = if n == 0 {
                format!("{stem}.{IMAGE_EXTENSION}")
            } else {
                format!("{stem}_{n}.{IMAGE_EXTENSION}")
            };
            let path = self.dir.join(name);

            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(bytes).await?;
                        file.flush().await
                    }
                    .await;
                    return match written {
                        Ok(()) => Ok(path),
                        Err(source) => Err(GrabError::Persist { path, source }),
                    };
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(GrabError::Persist { path, source }),
            }
        }

        Err(GrabError::Persist {
            path: self.dir.join(format!("{stem}.{IMAGE_EXTENSION}")),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("no free name after {MAX_SUFFIX} attempts"),
            ),
        })
    }
}

/// `{query}_{ordinal+1}` with characters unsafe in file names replaced.
pub fn file_stem(query: &str, ordinal: usize) -> String {
    let safe: String = query
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}_{}", ordinal + 1)
}
