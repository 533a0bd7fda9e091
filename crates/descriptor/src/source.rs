//! Locating and loading descriptor files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use prost::Message;

use crate::pool::DescriptorPool;
use crate::proto::FileDescriptorSet;
use crate::{DescriptorError, Result};

/// One or more binary descriptor set files plus the directories to search.
///
/// Relative file paths are tried against each include dir in order; when no
/// include dir is configured the current directory is used.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSource {
    files: Vec<PathBuf>,
    include_dirs: Vec<PathBuf>,
}

impl DescriptorSource {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            include_dirs: Vec::new(),
        }
    }

    /// Appends a directory to the search path.
    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn include_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if self.include_dirs.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.include_dirs.clone()
        }
    }

    /// Finds the on-disk location of a descriptor file.
    pub fn locate(&self, file: &Path) -> Result<PathBuf> {
        if file.is_absolute() {
            return if file.is_file() {
                Ok(file.to_path_buf())
            } else {
                Err(DescriptorError::NotFound {
                    file: file.to_path_buf(),
                    searched: vec![file.to_path_buf()],
                })
            };
        }

        let searched: Vec<PathBuf> = self
            .search_dirs()
            .into_iter()
            .map(|dir| dir.join(file))
            .collect();

        searched
            .iter()
            .find(|candidate| candidate.is_file())
            .cloned()
            .ok_or_else(|| DescriptorError::NotFound {
                file: file.to_path_buf(),
                searched,
            })
    }

    /// Reads, decodes and merges every file into one shared pool.
    #[tracing::instrument(skip(self), fields(files = self.files.len()))]
    pub fn load(&self) -> Result<Arc<DescriptorPool>> {
        let mut sets = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let path = self.locate(file)?;
            let bytes = std::fs::read(&path).map_err(|source| DescriptorError::Io {
                path: path.clone(),
                source,
            })?;
            sets.push(FileDescriptorSet::decode(bytes.as_slice())?);
            tracing::debug!(path = %path.display(), "loaded descriptor set");
        }
        Ok(Arc::new(DescriptorPool::from_sets(sets)))
    }
}
