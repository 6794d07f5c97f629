use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;

use retrocookie_dirs::CacheLayout;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::git::{CloneMode, Repository, Worktree};
use crate::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    token: String,
}

/// Application cache: the GitHub token, mirror clones and their worktrees.
#[derive(Debug, Clone)]
pub struct Cache {
    layout: CacheLayout,
}

impl Cache {
    pub fn user() -> AppResult<Self> {
        Ok(Self {
            layout: CacheLayout::user()?,
        })
    }

    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        Self {
            layout: CacheLayout::at(root.as_ref()),
        }
    }

    /// Save a token, readable only by the current user.
    pub fn save_token(&self, token: &str) -> AppResult<()> {
        if token.is_empty() {
            return Err(AppError::Other("empty token".to_string()));
        }
        std::fs::create_dir_all(self.layout.root())?;
        let path = self.layout.token_file();
        let data = serde_json::to_string(&TokenFile {
            token: token.to_string(),
        })?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        // The mode only applies to new files; tighten a file left by older runs.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(data.as_bytes())?;
        debug!("Saved token to {}", path.display());
        Ok(())
    }

    /// Load the saved token, if there is one.
    pub fn load_token(&self) -> AppResult<Option<String>> {
        let path = self.layout.token_file();
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: TokenFile = serde_json::from_slice(&data)?;
        if file.token.is_empty() {
            return Err(AppError::Other("empty token".to_string()));
        }
        Ok(Some(file.token))
    }

    /// Mirror clone of `owner/name`, cloned from `url` or brought up to date.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn repository(&self, owner: &str, name: &str, url: &str) -> AppResult<Repository> {
        let path = self.layout.repository(owner, name);
        if path.exists() {
            let repository = Repository::open(Some(&path))?;
            repository.git(["remote", "update", "--prune"])?;
            info!("Updated {owner}/{name} in {}", path.display());
            Ok(repository)
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let repository = Repository::clone(url, &path, CloneMode::Mirror)?;
            info!("Cloned {owner}/{name} into {}", path.display());
            Ok(repository)
        }
    }

    /// Worktree of the mirror of `owner/name` for importing into `branch`,
    /// checked out at `base`.
    pub fn worktree(
        &self,
        repository: &Repository,
        owner: &str,
        name: &str,
        branch: &str,
        base: &str,
    ) -> AppResult<Worktree> {
        let path = self.layout.worktree(owner, name, branch);
        // Leftovers of an interrupted run are replaced.
        if path.exists() {
            debug!("Removing stale worktree {}", path.display());
            let args = [
                OsStr::new("worktree"),
                OsStr::new("remove"),
                OsStr::new("--force"),
                path.as_os_str(),
            ];
            if let Err(e) = repository.git(args) {
                debug!("git could not remove the stale worktree: {e}");
            }
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }
        repository.worktree(&path, base, true)
    }
}
