use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::Context;
use crate::filter::{FilterReport, Replacements, RepositoryFilter, VariableSelection};
use crate::git::Repository;
use crate::utils::{TemporaryRemote, temporary_repository};
use crate::{AppError, AppResult};

/// Name of the remote through which rewritten commits are fetched.
pub const REMOTE_NAME: &str = "retrocookie";

/// Parameters of a single import from an instance into its template.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Instance branch whose commits are imported.
    pub reference: String,
    /// Instance branch the imported commits are based on.
    pub base: String,
    /// Branch to create in the template, defaulting to `reference`.
    pub branch: Option<String>,
    /// Instance repository, guessed from the template's `origin` when unset.
    pub url: Option<String>,
    pub selection: VariableSelection,
    /// Template checkout, defaulting to the current directory.
    pub path: Option<PathBuf>,
    /// Template directory inside the checkout, detected when unset.
    pub directory: Option<PathBuf>,
    /// Replace `branch` if it already exists.
    pub force: bool,
}

impl ImportOptions {
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self {
            reference: reference.into(),
            base: "master".to_string(),
            branch: None,
            url: None,
            selection: VariableSelection::default(),
            path: None,
            directory: None,
            force: false,
        }
    }
}

/// Guess the URL of the template instance.
pub fn guess_instance_url(repository: &Repository) -> AppResult<String> {
    let url = repository.remote_url("origin")?;
    Ok(match url.strip_suffix(".git") {
        Some(stem) => format!("{stem}-instance.git"),
        None => format!("{url}-instance"),
    })
}

fn is_template_directory_name(name: &str) -> bool {
    ["{{", "cookiecutter", "}}"]
        .iter()
        .all(|token| name.contains(token))
}

/// Locate the subdirectory with the project template.
pub fn find_template_directory(repository: &Repository) -> AppResult<PathBuf> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(repository.path())? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && is_template_directory_name(name)
        {
            candidates.push(PathBuf::from(name));
        }
    }
    candidates.sort();
    debug!("Template directory candidates: {candidates:?}");
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Other("cannot find template directory".to_string()))
}

/// Rewrite the repository using template variables.
pub fn rewrite_commits(
    repository: &Repository,
    template_directory: &Path,
    selection: &VariableSelection,
) -> AppResult<FilterReport> {
    let context = Context::load(repository, "HEAD")?;
    let replacements = Replacements::new(&context, selection);
    RepositoryFilter::new(repository, template_directory, replacements).run()
}

/// Create `branch` with the commits `<remote>/<base>..<remote>/<reference>`
/// replayed on top of the current `HEAD`.
#[tracing::instrument(level = "info", skip(repository))]
pub fn apply_commits(
    repository: &Repository,
    remote: &str,
    base: &str,
    reference: &str,
    branch: Option<&str>,
    force: bool,
) -> AppResult<()> {
    let branch = branch.unwrap_or(reference);
    let onto = repository.head_commit()?.to_string();

    repository.fetch_remote(remote, &[base, reference])?;
    repository.create_branch(branch, &format!("{remote}/{reference}"), force)?;
    repository.rebase(&format!("{remote}/{base}"), branch, &onto)?;
    debug!("Checked out {}", repository.current_branch()?);
    info!("Imported {base}..{reference} into {branch}");
    Ok(())
}

/// Import commits from an instance repository into its template repository.
#[tracing::instrument(name = "Importing commits", level = "info", skip(options), fields(reference = %options.reference))]
pub fn retrocookie(options: &ImportOptions) -> AppResult<()> {
    let repository = Repository::open(options.path.as_deref())?;
    let template_directory = match &options.directory {
        Some(directory) => directory.clone(),
        None => find_template_directory(&repository)?,
    };
    let url = match &options.url {
        Some(url) => url.clone(),
        None => guess_instance_url(&repository)?,
    };
    info!(
        "Importing {url} into {}",
        repository.path().join(&template_directory).display()
    );

    let instance = temporary_repository(&url)?;
    rewrite_commits(&instance, &template_directory, &options.selection)?;

    let instance_path = instance.path().to_string_lossy().into_owned();
    let remote = TemporaryRemote::add(&repository, REMOTE_NAME, &instance_path)?;
    apply_commits(
        &repository,
        remote.name(),
        &options.base,
        &options.reference,
        options.branch.as_deref(),
        options.force,
    )
}

/// Convenience for building a selection from command-line lists.
pub fn selection<I, J>(whitelist: I, blacklist: J) -> VariableSelection
where
    I: IntoIterator<Item = String>,
    J: IntoIterator<Item = String>,
{
    VariableSelection {
        whitelist: whitelist.into_iter().collect::<HashSet<_>>(),
        blacklist: blacklist.into_iter().collect::<HashSet<_>>(),
    }
}
