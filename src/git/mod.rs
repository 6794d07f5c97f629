/// Invocation of the `git` executable for porcelain operations.
pub(crate) mod command;

#[cfg(test)]
pub(crate) mod testing;

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use git2::{BranchType, ErrorCode, Oid, RepositoryState};
use tracing::{debug, info, warn};

use crate::{AppError, AppResult};
pub(crate) use command::run_git;

/// How [`Repository::clone`] lays out the new repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// Branches land in `refs/heads`, without a working tree.
    Bare,
    /// Like `Bare`, and `git remote update` mirrors every ref.
    Mirror,
}

/// A git repository, opened through libgit2 for object access and driven
/// through the `git` executable for fetch, rebase, worktrees and pushes.
pub struct Repository {
    repo: git2::Repository,
    path: PathBuf,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .finish()
    }
}

impl Repository {
    /// Open the repository containing `path`, or the current directory.
    #[tracing::instrument(level = "debug")]
    pub fn open(path: Option<&Path>) -> AppResult<Self> {
        let start = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let repo = git2::Repository::discover(&start)?;
        let path = match repo.workdir() {
            Some(workdir) => workdir.to_path_buf(),
            None => repo.path().to_path_buf(),
        };
        Ok(Self { repo, path })
    }

    /// Clone `url` into `dest` using the `git` executable, so credential
    /// helpers and SSH configuration apply as they would for the user.
    #[tracing::instrument(level = "info", skip(dest), fields(dest = %dest.display()))]
    pub fn clone(url: &str, dest: &Path, mode: CloneMode) -> AppResult<Self> {
        let flag = match mode {
            CloneMode::Bare => "--bare",
            CloneMode::Mirror => "--mirror",
        };
        run_git(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                OsStr::new(flag),
                OsStr::new(url),
                dest.as_os_str(),
            ],
        )?;
        Self::open(Some(dest))
    }

    /// Working tree of the repository, or its git directory when bare.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying libgit2 handle.
    pub fn inner(&self) -> &git2::Repository {
        &self.repo
    }

    /// Run `git` inside this repository and return its output.
    pub fn git<I, S>(&self, args: I) -> AppResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_git(Some(&self.path), args)
    }

    pub fn remote_url(&self, name: &str) -> AppResult<String> {
        let remote = self.repo.find_remote(name)?;
        remote
            .url()
            .map(str::to_string)
            .ok_or_else(|| AppError::Other(format!("remote {name} has no UTF-8 URL")))
    }

    /// URLs of all remotes, in the order git lists them.
    pub fn remote_urls(&self) -> AppResult<Vec<String>> {
        let names = self.repo.remotes()?;
        let mut urls = Vec::new();
        for name in names.iter().flatten() {
            match self.remote_url(name) {
                Ok(url) => urls.push(url),
                Err(e) => debug!("Skipping remote {name}: {e}"),
            }
        }
        Ok(urls)
    }

    pub fn head_commit(&self) -> AppResult<Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    pub fn current_branch(&self) -> AppResult<String> {
        let head = self.repo.head()?;
        if !head.is_branch() {
            return Err(AppError::Other("HEAD is detached".to_string()));
        }
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| AppError::Other("current branch name is not UTF-8".to_string()))
    }

    pub fn exists_branch(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Contents of `path` in the tree of `revision`.
    pub fn read_file(&self, revision: &str, path: &Path) -> AppResult<Vec<u8>> {
        let tree = self.repo.revparse_single(revision)?.peel_to_tree()?;
        let entry = tree.get_path(path)?;
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    }

    /// Fetch `refs` from `remote`, updating its remote-tracking branches.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn fetch_remote(&self, remote: &str, refs: &[&str]) -> AppResult<()> {
        let mut args = vec!["fetch", "--quiet", remote];
        args.extend_from_slice(refs);
        self.git(args)?;
        Ok(())
    }

    /// Create branch `name` at `start`. An existing branch is replaced only with `force`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn create_branch(&self, name: &str, start: &str, force: bool) -> AppResult<()> {
        let commit = self.repo.revparse_single(start)?.peel_to_commit()?;
        match self.repo.branch(name, &commit, force) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Exists => Err(AppError::Other(format!(
                "branch {name} already exists"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Replay `upstream..branch` onto `onto`, leaving `branch` checked out.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn rebase(&self, upstream: &str, branch: &str, onto: &str) -> AppResult<()> {
        self.git(["rebase", "--quiet", "--onto", onto, upstream, branch])
            .inspect_err(|_| {
                warn!(
                    "Rebase of {branch} stopped in {}. Resolve the conflicts and run `git rebase --continue`, or `git rebase --abort`.",
                    self.path.display()
                );
            })?;
        Ok(())
    }

    /// Whether a rebase stopped in this checkout and waits for the user.
    pub fn rebase_in_progress(&self) -> bool {
        matches!(
            self.repo.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
                | RepositoryState::ApplyMailboxOrRebase
        )
    }

    pub fn add_remote(&self, name: &str, url: &str) -> AppResult<()> {
        self.repo.remote(name, url)?;
        Ok(())
    }

    /// Remove remote `name` along with its remote-tracking branches.
    pub fn remove_remote(&self, name: &str) -> AppResult<()> {
        self.repo.remote_delete(name)?;
        Ok(())
    }

    /// Check out `base` detached in a new worktree at `path`.
    ///
    /// The worktree is removed again when the returned guard is dropped.
    #[tracing::instrument(level = "info", skip(self, path), fields(path = %path.display()))]
    pub fn worktree(&self, path: &Path, base: &str, force: bool) -> AppResult<Worktree> {
        // Forget worktrees whose directories vanished, e.g. after a crash.
        self.git(["worktree", "prune"])?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut args = vec![
            OsStr::new("worktree"),
            OsStr::new("add"),
            OsStr::new("--quiet"),
            OsStr::new("--detach"),
        ];
        if force {
            args.push(OsStr::new("--force"));
        }
        args.push(path.as_os_str());
        args.push(OsStr::new(base));
        self.git(args)?;
        info!("Created worktree at {}", path.display());
        Ok(Worktree {
            parent: self.path.clone(),
            repository: Repository::open(Some(path))?,
            keep: false,
        })
    }
}

/// A linked worktree that is removed (forcibly) on drop, unless kept.
#[derive(Debug)]
pub struct Worktree {
    parent: PathBuf,
    repository: Repository,
    keep: bool,
}

impl Worktree {
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn path(&self) -> &Path {
        self.repository.path()
    }

    /// Leave the worktree on disk and return its path.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path().to_path_buf()
    }
}

impl Drop for Worktree {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        let path = self.repository.path().as_os_str().to_os_string();
        let args = [
            OsStr::new("worktree"),
            OsStr::new("remove"),
            OsStr::new("--force"),
            path.as_os_str(),
        ];
        if let Err(e) = run_git(Some(&self.parent), args) {
            warn!("Failed to remove worktree {}: {e}", path.to_string_lossy());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TestRepo;
    use super::*;

    #[test]
    fn open_discovers_from_subdirectory() {
        let repo = TestRepo::new();
        repo.commit("initial", &[("src/lib.txt", "hello")]);
        let nested = repo.path().join("src");
        let opened = Repository::open(Some(&nested)).unwrap();
        assert_eq!(
            opened.path().canonicalize().unwrap(),
            repo.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn branches_and_files() {
        let repo = TestRepo::new();
        repo.commit("initial", &[("README.md", "one")]);
        repo.commit("second", &[("README.md", "two")]);
        let repository = repo.open();

        assert_eq!(repository.current_branch().unwrap(), "main");
        assert!(repository.exists_branch("main"));
        assert!(!repository.exists_branch("feature"));

        repository.create_branch("feature", "HEAD~1", false).unwrap();
        assert!(repository.exists_branch("feature"));
        assert_eq!(
            repository.read_file("feature", Path::new("README.md")).unwrap(),
            b"one"
        );

        let err = repository.create_branch("feature", "HEAD", false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        repository.create_branch("feature", "HEAD", true).unwrap();
        assert_eq!(
            repository.read_file("feature", Path::new("README.md")).unwrap(),
            b"two"
        );
    }

    #[test]
    fn remotes_round_trip() {
        let repo = TestRepo::new();
        repo.commit("initial", &[("README.md", "one")]);
        let repository = repo.open();
        repository
            .add_remote("origin", "https://github.com/octo/tmpl.git")
            .unwrap();
        assert_eq!(
            repository.remote_url("origin").unwrap(),
            "https://github.com/octo/tmpl.git"
        );
        assert_eq!(repository.remote_urls().unwrap().len(), 1);
        repository.remove_remote("origin").unwrap();
        assert!(repository.remote_url("origin").is_err());
    }

    #[test]
    fn worktree_is_removed_on_drop() {
        let repo = TestRepo::new();
        repo.commit("initial", &[("README.md", "one")]);
        let repository = repo.open();
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("wt");
        {
            let worktree = repository.worktree(&path, "main", false).unwrap();
            assert!(worktree.path().join("README.md").is_file());
            let checkout = Repository::open(Some(worktree.path())).unwrap();
            assert!(checkout.current_branch().is_err());
        }
        assert!(!path.exists());
    }

    #[test]
    fn kept_worktree_survives_drop() {
        let repo = TestRepo::new();
        repo.commit("initial", &[("README.md", "one")]);
        let repository = repo.open();
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("wt");
        let worktree = repository.worktree(&path, "main", false).unwrap();
        assert!(!worktree.repository().rebase_in_progress());
        let kept = worktree.keep();
        assert_eq!(kept.canonicalize().unwrap(), path.canonicalize().unwrap());
        assert!(path.join("README.md").is_file());
    }

    #[test]
    fn conflicting_rebase_is_left_in_progress() {
        let repo = TestRepo::new();
        repo.commit("initial", &[("README.md", "one\n")]);
        repo.switch_new_branch("feature");
        repo.commit("feature", &[("README.md", "feature\n")]);
        repo.switch("main");
        let onto = repo.commit("main", &[("README.md", "main\n")]);
        let repository = repo.open();

        let err = repository
            .rebase("main~1", "feature", &onto.to_string())
            .unwrap_err();
        assert!(matches!(err, AppError::GitCommand { .. }));
        assert!(repository.rebase_in_progress());
    }
}
