use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, trace};
use url::Url;

use crate::{AppError, AppResult};

/// Variables git exports to hooks and aliases. Leaking them into a child `git`
/// would point it at the wrong repository.
const GIT_ENV_OVERRIDES: &[&str] = &["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE", "GIT_PREFIX"];

/// Hide credentials embedded in URL arguments before they reach the logs.
fn redact(arg: &str) -> String {
    match Url::parse(arg) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            let _ = url.set_password(None);
            let _ = url.set_username("***");
            url.to_string()
        }
        _ => arg.to_string(),
    }
}

/// Builds a `git` invocation rooted at `cwd` with captured output.
fn git_command<I, S>(cwd: Option<&Path>, args: I) -> (Command, String)
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new("git");
    let mut rendered = Vec::new();
    if let Some(cwd) = cwd {
        cmd.arg("-C").arg(cwd);
    }
    for arg in args {
        rendered.push(redact(&arg.as_ref().to_string_lossy()));
        cmd.arg(arg.as_ref());
    }
    for var in GIT_ENV_OVERRIDES {
        cmd.env_remove(var);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    (cmd, rendered.join(" "))
}

/// Runs `git` with `args` and returns its trimmed standard output.
///
/// A non-zero exit becomes [`AppError::GitCommand`] carrying the rendered
/// command line and the trimmed standard error.
#[tracing::instrument(name = "Running git", level = "debug", skip(args))]
pub(crate) fn run_git<I, S>(cwd: Option<&Path>, args: I) -> AppResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let (mut cmd, rendered) = git_command(cwd, args);
    debug!("git {rendered}");
    let out = cmd.output()?;
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    trace!(%stdout, %stderr, "git {rendered} exited with {}", out.status);
    if out.status.success() {
        Ok(stdout)
    } else {
        // Rebase conflicts are reported on stdout.
        let stderr = if stderr.is_empty() { stdout } else { stderr };
        Err(AppError::GitCommand {
            command: rendered,
            stderr,
        })
    }
}
