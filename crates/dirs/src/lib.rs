use std::env;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirError {
    #[error("Directory not found: {0}")]
    DirNotFound(String),
}

pub type DirResult<T> = Result<T, DirError>;

/// Application name used to namespace directories.
pub static APP_NAME: &str = "retrocookie";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirType {
    Cache,
}

impl Display for DirType {
    /// Pretty-print the default directory path hint for this dir type.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirType::Cache => write!(f, "~/.cache/")?,
        };
        write!(f, "{}", APP_NAME)
    }
}

impl DirType {
    /// XDG environment variable key for this directory type.
    fn xdg_key(&self) -> &'static str {
        match self {
            DirType::Cache => "XDG_CACHE_HOME",
        }
    }

    /// Relative default path under HOME when XDG is not set.
    fn rel_path(&self) -> &'static str {
        match self {
            DirType::Cache => ".cache",
        }
    }

    /// Resolve the directory path from XDG or fallback environment hints.
    pub fn get_dir(&self) -> DirResult<PathBuf> {
        self.resolve(|key| env::var_os(key), env::home_dir())
    }

    fn resolve<F>(&self, var: F, home_dir: Option<PathBuf>) -> DirResult<PathBuf>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        // An empty XDG variable is treated as unset, as the XDG spec requires.
        if let Some(dir) = var(self.xdg_key()).filter(|d| !d.is_empty()) {
            Ok(PathBuf::from(dir).join(APP_NAME))
        } else if let Some(home_dir) = home_dir {
            Ok(home_dir.join(self.rel_path()).join(APP_NAME))
        } else if let Some(home) = var("HOME") {
            Ok(PathBuf::from(home).join(self.rel_path()).join(APP_NAME))
        } else if let Some(userprofile) = var("USERPROFILE") {
            Ok(PathBuf::from(userprofile)
                .join(self.rel_path())
                .join(APP_NAME))
        } else {
            Err(DirError::DirNotFound(self.to_string()))
        }
    }
}

/// Locations of everything retrocookie keeps in its cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Layout rooted at the user cache directory.
    pub fn user() -> DirResult<Self> {
        Ok(Self::at(DirType::Cache.get_dir()?))
    }

    pub fn at<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// JSON file holding the GitHub token.
    pub fn token_file(&self) -> PathBuf {
        self.root.join("token.json")
    }

    /// Mirror clone of `owner/name`.
    pub fn repository(&self, owner: &str, name: &str) -> PathBuf {
        self.root
            .join("repositories")
            .join(owner)
            .join(format!("{name}.git"))
    }

    /// Worktree checkout of `branch` in the mirror of `owner/name`.
    pub fn worktree(&self, owner: &str, name: &str, branch: &str) -> PathBuf {
        self.root
            .join("worktrees")
            .join(owner)
            .join(name)
            .join(branch)
    }
}
