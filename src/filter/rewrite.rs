use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{Commit, ObjectType, Oid, Sort};
use tracing::{debug, info, info_span, trace, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

use super::replace::Replacements;
use crate::{AppError, AppResult};
use crate::git::Repository;

const TREE_MODE: i32 = 0o040000;
/// How much of a blob is searched for a NUL byte to tell binary from text.
const BINARY_PROBE_LEN: usize = 8000;

/// Outcome of a history rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub commits: usize,
    pub refs: usize,
}

/// Rewrites every branch and tag of a repository into the shape of a
/// template: files move below `path`, and variable values in file contents
/// and path components become template expressions.
///
/// Commits keep their author, committer, message and parent structure.
/// Intended for throwaway clones, since all refs are replaced in place.
pub struct RepositoryFilter<'r> {
    repository: &'r Repository,
    path: PathBuf,
    replacements: Replacements,
    blobs: HashMap<Oid, Oid>,
    trees: HashMap<Oid, Oid>,
    commits: HashMap<Oid, Oid>,
}

impl<'r> RepositoryFilter<'r> {
    pub fn new(repository: &'r Repository, path: &Path, replacements: Replacements) -> Self {
        Self {
            repository,
            path: path.to_path_buf(),
            replacements,
            blobs: HashMap::new(),
            trees: HashMap::new(),
            commits: HashMap::new(),
        }
    }

    /// Branch and tag refs with the commits they point to.
    fn refs(&self) -> AppResult<Vec<(String, Oid)>> {
        let repo = self.repository.inner();
        let mut refs = Vec::new();
        for reference in repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                warn!("Skipping ref with a non-UTF-8 name");
                continue;
            };
            if !(name.starts_with("refs/heads/") || name.starts_with("refs/tags/")) {
                trace!("Leaving {name} alone");
                continue;
            }
            match reference.peel_to_commit() {
                Ok(commit) => refs.push((name.to_string(), commit.id())),
                Err(e) => debug!("Skipping {name}, which does not point to a commit: {e}"),
            }
        }
        Ok(refs)
    }

    /// Rewrite all commits reachable from branches and tags, then move the refs.
    #[tracing::instrument(name = "Rewriting instance history", level = "info", skip(self), fields(path = %self.path.display()))]
    pub fn run(&mut self) -> AppResult<FilterReport> {
        let repository = self.repository;
        let repo = repository.inner();
        let refs = self.refs()?;

        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        for (_, oid) in &refs {
            walk.push(*oid)?;
        }
        let oids = walk.collect::<Result<Vec<_>, _>>()?;

        let header_span = info_span!("Rewriting commits");
        header_span.pb_set_message("Rewriting...");
        header_span.pb_set_finish_message("Rewrite complete");
        header_span.pb_set_length(oids.len() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            header_span.pb_set_style(&style);
        }
        let header_span_enter = header_span.enter();

        for oid in &oids {
            let commit = repo.find_commit(*oid)?;
            let rewritten = self.rewrite_commit(&commit)?;
            trace!("Rewrote {oid} as {rewritten}");
            self.commits.insert(*oid, rewritten);
            header_span.pb_inc(1);
        }
        std::mem::drop(header_span_enter);
        std::mem::drop(header_span);

        for (name, oid) in &refs {
            let target = self.commits.get(oid).copied().ok_or_else(|| {
                AppError::Other(format!("{name} points to {oid}, which was not rewritten"))
            })?;
            // Annotated tags become lightweight tags on the rewritten commit.
            repo.reference(name, target, true, "retrocookie: rewrite history")?;
            debug!("Moved {name} to {target}");
        }

        let report = FilterReport {
            commits: oids.len(),
            refs: refs.len(),
        };
        info!(
            "Rewrote {} commits on {} refs using {} template variables",
            report.commits,
            report.refs,
            self.replacements.variable_count()
        );
        Ok(report)
    }

    fn rewrite_commit(&mut self, commit: &Commit) -> AppResult<Oid> {
        let repository = self.repository;
        let repo = repository.inner();
        let tree = self.rewrite_tree(commit.tree_id())?;
        let tree = self.nest(tree)?;
        let tree = repo.find_tree(tree)?;

        let parents = commit
            .parent_ids()
            .map(|id| repo.find_commit(self.commits.get(&id).copied().unwrap_or(id)))
            .collect::<Result<Vec<_>, _>>()?;
        let parents: Vec<&Commit> = parents.iter().collect();

        let message = message_text(commit.id(), commit.message_raw_bytes());
        Ok(repo.commit(
            None,
            &commit.author(),
            &commit.committer(),
            &message,
            &tree,
            &parents,
        )?)
    }

    fn rewrite_tree(&mut self, oid: Oid) -> AppResult<Oid> {
        if let Some(done) = self.trees.get(&oid) {
            return Ok(*done);
        }
        let repository = self.repository;
        let repo = repository.inner();
        let tree = repo.find_tree(oid)?;
        let mut builder = repo.treebuilder(None)?;
        for entry in tree.iter() {
            let name = self.replacements.rewrite_name(entry.name_bytes()).into_owned();
            let id = match entry.kind() {
                Some(ObjectType::Tree) => self.rewrite_tree(entry.id())?,
                Some(ObjectType::Blob) => self.rewrite_blob(entry.id())?,
                // Submodule links point into other repositories.
                _ => entry.id(),
            };
            if builder.get(name.clone())?.is_some() {
                warn!(
                    "Two entries map to {} in tree {oid}; keeping the last one",
                    String::from_utf8_lossy(&name)
                );
            }
            builder.insert(name, id, entry.filemode())?;
        }
        let rewritten = builder.write()?;
        self.trees.insert(oid, rewritten);
        Ok(rewritten)
    }

    fn rewrite_blob(&mut self, oid: Oid) -> AppResult<Oid> {
        if let Some(done) = self.blobs.get(&oid) {
            return Ok(*done);
        }
        let repo = self.repository.inner();
        let blob = repo.find_blob(oid)?;
        let rewritten = if is_binary(blob.content()) {
            oid
        } else {
            match self.replacements.rewrite(blob.content()) {
                Cow::Borrowed(_) => oid,
                Cow::Owned(data) => repo.blob(&data)?,
            }
        };
        self.blobs.insert(oid, rewritten);
        Ok(rewritten)
    }

    /// Wrap a root tree in the directories of `path`.
    fn nest(&self, mut oid: Oid) -> AppResult<Oid> {
        let repo = self.repository.inner();
        if repo.find_tree(oid)?.is_empty() {
            return Ok(oid);
        }
        for component in self.path.components().rev() {
            let mut builder = repo.treebuilder(None)?;
            builder.insert(component.as_os_str(), oid, TREE_MODE)?;
            oid = builder.write()?;
        }
        Ok(oid)
    }
}

/// Blobs with a NUL byte near the start are binary and left untouched.
fn is_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_PROBE_LEN)].contains(&0)
}

/// Commit message as text. `git2` only creates commits from `&str`, so invalid
/// bytes are replaced.
fn message_text(oid: Oid, raw: &[u8]) -> Cow<'_, str> {
    let message = String::from_utf8_lossy(raw);
    if let Cow::Owned(_) = message {
        warn!("Message of commit {oid} is not valid UTF-8; invalid bytes were replaced");
    }
    message
}
