use std::ops::Deref;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::AppResult;
use crate::git::{CloneMode, Repository};

/// A bare clone living in a temporary directory, deleted on drop.
#[derive(Debug)]
pub struct TemporaryRepository {
    repository: Repository,
    // Declared last so the directory outlives the repository handle.
    _dir: TempDir,
}

impl Deref for TemporaryRepository {
    type Target = Repository;

    fn deref(&self) -> &Self::Target {
        &self.repository
    }
}

/// Clone `url` into a fresh temporary directory.
#[tracing::instrument(level = "debug")]
pub fn temporary_repository(url: &str) -> AppResult<TemporaryRepository> {
    let dir = tempfile::Builder::new().prefix("retrocookie-").tempdir()?;
    let repository = Repository::clone(url, dir.path(), CloneMode::Bare)?;
    debug!("Cloned {url} into {}", dir.path().display());
    Ok(TemporaryRepository {
        repository,
        _dir: dir,
    })
}

/// A remote registered on a repository for the lifetime of the guard.
pub struct TemporaryRemote<'r> {
    repository: &'r Repository,
    name: String,
}

impl<'r> TemporaryRemote<'r> {
    pub fn add(repository: &'r Repository, name: &str, url: &str) -> AppResult<Self> {
        repository.add_remote(name, url)?;
        Ok(Self {
            repository,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TemporaryRemote<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.repository.remove_remote(&self.name) {
            warn!("Failed to remove remote {}: {e}", self.name);
        }
    }
}
