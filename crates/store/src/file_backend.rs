//! File-backed module source.
//!
//! Modules are plain files under one or more root directories. The first
//! root containing a name wins. The directory index is built once, on the
//! first read; files created afterwards are still found by a direct lookup.
//!
//! Lookup tolerates case and accent differences: `memória.txt` resolves
//! `MEMORIA.TXT`.

use async_trait::async_trait;
use promptweave_core::error::StoreError;
use promptweave_core::module::ModuleSource;
use promptweave_core::text::normalize_key;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use crate::token_cache::TokenCounter;

/// An indexed file entry: the on-disk name and its full path.
#[derive(Debug, Clone)]
struct IndexedFile {
    name: String,
    path: PathBuf,
}

/// Module source reading text files from a list of roots.
pub struct FileModuleSource {
    roots: Vec<PathBuf>,
    index: OnceCell<HashMap<String, IndexedFile>>,
    texts: Arc<RwLock<HashMap<String, String>>>,
    tokens: TokenCounter,
}

impl FileModuleSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let roots: Vec<PathBuf> = roots
            .into_iter()
            .filter(|r| !r.as_os_str().is_empty())
            .collect();
        debug!(roots = roots.len(), "File module source configured");
        Self {
            roots,
            index: OnceCell::new(),
            texts: Arc::new(RwLock::new(HashMap::new())),
            tokens: TokenCounter::default(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    async fn index(&self) -> &HashMap<String, IndexedFile> {
        self.index
            .get_or_init(|| async { build_index(&self.roots).await })
            .await
    }

    async fn read_file(&self, path: &Path, name: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

async fn build_index(roots: &[PathBuf]) -> HashMap<String, IndexedFile> {
    let mut index = HashMap::new();
    for root in roots {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable module root");
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Stopped scanning module root");
                    break;
                }
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            index
                .entry(normalize_key(&name))
                .or_insert_with(|| IndexedFile {
                    name,
                    path: entry.path(),
                });
        }
    }
    debug!(files = index.len(), "Module index built");
    index
}

#[async_trait]
impl ModuleSource for FileModuleSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn read(&self, name: &str) -> Result<Option<String>, StoreError> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        let key = normalize_key(name);
        if let Some(text) = self.texts.read().await.get(&key) {
            return Ok(Some(text.clone()));
        }

        let indexed = self.index().await.get(&key).cloned();
        let text = match indexed {
            Some(file) => self.read_file(&file.path, &file.name).await?,
            None => {
                // Not indexed: the file may have been created after the scan.
                let mut found = None;
                for root in &self.roots {
                    if let Some(text) = self.read_file(&root.join(name), name).await? {
                        found = Some(text);
                        break;
                    }
                }
                found
            }
        };

        if let Some(text) = &text {
            self.tokens.count(&key, text);
            self.texts.write().await.insert(key, text.clone());
        }
        Ok(text)
    }

    fn token_count(&self, name: &str, text: &str) -> usize {
        self.tokens.count(&normalize_key(name), text)
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.index().await.values().map(|f| f.name.clone()).collect();
        names.sort();
        Ok(names)
    }
}
