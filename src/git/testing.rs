use std::path::{Path, PathBuf};

use git2::{Oid, RepositoryInitOptions, Signature, Sort, build::CheckoutBuilder};
use tempfile::TempDir;

use super::Repository;

/// Scratch repository with a `main` branch and a local identity, so that
/// both libgit2 and the `git` executable can commit in it.
pub(crate) struct TestRepo {
    _dir: TempDir,
    path: PathBuf,
    repo: git2::Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = git2::Repository::init_opts(&path, &opts).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
            config.set_bool("commit.gpgsign", false).unwrap();
        }
        Self {
            _dir: dir,
            path,
            repo,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn open(&self) -> Repository {
        Repository::open(Some(&self.path)).unwrap()
    }

    pub fn raw(&self) -> &git2::Repository {
        &self.repo
    }

    /// Write `files` to the working tree and commit them on `HEAD`.
    pub fn commit(&self, message: &str, files: &[(&str, &str)]) -> Oid {
        let bytes: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(path, content)| (*path, content.as_bytes()))
            .collect();
        self.commit_bytes(message, &bytes)
    }

    pub fn commit_bytes(&self, message: &str, files: &[(&str, &[u8])]) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (path, content) in files {
            let full = self.path.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Create `name` at `HEAD` and switch to it.
    pub fn switch_new_branch(&self, name: &str) {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo.branch(name, &head, false).unwrap();
        self.switch(name);
    }

    pub fn switch(&self, name: &str) {
        self.repo.set_head(&format!("refs/heads/{name}")).unwrap();
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))
            .unwrap();
    }

    pub fn set_origin(&self, url: &str) {
        self.repo.remote("origin", url).unwrap();
    }

    /// Commit messages reachable from `revision`, newest first.
    pub fn log(&self, revision: &str) -> Vec<String> {
        let mut walk = self.repo.revwalk().unwrap();
        walk.set_sorting(Sort::TOPOLOGICAL).unwrap();
        let start = self
            .repo
            .revparse_single(revision)
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id();
        walk.push(start).unwrap();
        walk.map(|oid| {
            let commit = self.repo.find_commit(oid.unwrap()).unwrap();
            commit.summary().unwrap_or_default().to_string()
        })
        .collect()
    }
}
