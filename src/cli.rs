use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Color, Style, Styles};
use clap::{ArgAction, Args, ColorChoice, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::{Generator, Shell, generate};
use clap_complete_nushell::Nushell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;

use crate::core::{ImportOptions, retrocookie, selection};
use crate::AppResult;
use crate::pr::github::DEFAULT_API_URL;
use crate::pr::{self, PullRequestOptions, cache::Cache};

const STYLES: Styles = Styles::styled()
    .header(Style::new().bold())
    .usage(Style::new().bold())
    .error(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))))
    .literal(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
    .valid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
    .invalid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightRed))))
    .context(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta))))
    .context_value(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
    );

/// Long-form CLI description shown in `--help`.
const LONG_ABOUT: &str = "Retrocookie - Update Cookiecutter templates with changes from their instances

Retrocookie clones a generated project, rewrites its history so that every
file lives in the template directory and literal variable values become
{{cookiecutter.<variable>}} expressions again, and replays the selected commits
onto the template with `git rebase`.

The `pr` command does the same for open GitHub pull requests, and opens
matching pull requests in the template repository.";

/// Retrocookie - Update Cookiecutter templates with changes from their instances.
#[derive(Parser, Debug, Clone)]
#[command(author, version, propagate_version = true, about, long_about = Some(LONG_ABOUT), styles = STYLES)]
pub struct Cli {
    /// Color choice for the output
    #[arg(long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Subcommand to run
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Top-level commands supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Import commits from an instance repository into the template
    ///
    /// Run this from a checkout of the template, or pass its path with -C.
    Import {
        #[command(flatten)]
        args: ImportArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Import pull requests from a repository into its Cookiecutter template
    ///
    /// Each pull request is replayed on the branch retrocookie-pr/<branch> of
    /// the template, pushed, and opened as a pull request with the same title,
    /// body and labels.
    Pr {
        #[command(flatten)]
        args: PrArgs,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Generate shell completion for a given shell
    Completion {
        /// Output file to write the completion script to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The shell to generate the completion for
        #[arg(value_enum)]
        shell: CompletionShell,

        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },
}

/// Arguments of `retrocookie import`.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Instance branch to import
    #[arg(value_name = "REF")]
    pub reference: String,

    /// Instance branch the imported commits are based on
    #[arg(long, default_value = "master")]
    pub base: String,

    /// Template branch to create [default: REF]
    #[arg(long)]
    pub branch: Option<String>,

    /// Instance repository [default: the template's origin with an -instance suffix]
    #[arg(long)]
    pub url: Option<String>,

    /// Replace this variable even when its value is ambiguous
    #[arg(short = 'W', long, value_name = "VARIABLE", action = ArgAction::Append)]
    pub whitelist: Vec<String>,

    /// Never replace this variable
    #[arg(short = 'B', long, value_name = "VARIABLE", action = ArgAction::Append)]
    pub blacklist: Vec<String>,

    /// Template repository [default: the current directory]
    #[arg(short = 'C', long)]
    pub path: Option<PathBuf>,

    /// Template directory inside the repository [default: detected]
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Overwrite an existing branch
    #[arg(long)]
    pub force: bool,
}

impl From<&ImportArgs> for ImportOptions {
    fn from(args: &ImportArgs) -> Self {
        Self {
            reference: args.reference.clone(),
            base: args.base.clone(),
            branch: args.branch.clone(),
            url: args.url.clone(),
            selection: selection(args.whitelist.clone(), args.blacklist.clone()),
            path: args.path.clone(),
            directory: args.directory.clone(),
            force: args.force,
        }
    }
}

/// Arguments of `retrocookie pr`.
#[derive(Args, Debug, Clone)]
pub struct PrArgs {
    /// Pull request numbers or branches [default: all open pull requests]
    #[arg(value_name = "PULL-REQUEST")]
    pub pull_requests: Vec<String>,

    /// GitHub repository containing the pull requests, as OWNER/NAME
    #[arg(short = 'R', long)]
    pub repository: Option<String>,

    /// Create pull requests against this base
    #[arg(long, default_value = "master")]
    pub base: String,

    /// Import pull requests opened by this GitHub user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Overwrite existing pull requests
    #[arg(long)]
    pub force: bool,

    /// GitHub token [default: the cached token, or prompt]
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub REST API root, for GitHub Enterprise hosts
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl From<&PrArgs> for PullRequestOptions {
    fn from(args: &PrArgs) -> Self {
        Self {
            specs: args.pull_requests.clone(),
            repository: args.repository.clone(),
            base: args.base.clone(),
            user: args.user.clone(),
            force: args.force,
            selection: Default::default(),
        }
    }
}

/// Supported completion targets for shell auto-completion.
#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
    Nushell,
}

impl Display for CompletionShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionShell::Bash => "bash",
            CompletionShell::Zsh => "zsh",
            CompletionShell::Fish => "fish",
            CompletionShell::PowerShell => "powershell",
            CompletionShell::Elvish => "elvish",
            CompletionShell::Nushell => "nushell",
        };
        write!(f, "{}", s)
    }
}

impl Generator for &CompletionShell {
    fn generate(&self, cmd: &clap::builder::Command, buf: &mut dyn Write) {
        match self {
            CompletionShell::Bash => Shell::Bash.generate(cmd, buf),
            CompletionShell::Zsh => Shell::Zsh.generate(cmd, buf),
            CompletionShell::Fish => Shell::Fish.generate(cmd, buf),
            CompletionShell::PowerShell => Shell::PowerShell.generate(cmd, buf),
            CompletionShell::Elvish => Shell::Elvish.generate(cmd, buf),
            CompletionShell::Nushell => Nushell.generate(cmd, buf),
        }
    }

    fn file_name(&self, name: &str) -> String {
        match self {
            CompletionShell::Bash => Shell::Bash.file_name(name),
            CompletionShell::Zsh => Shell::Zsh.file_name(name),
            CompletionShell::Fish => Shell::Fish.file_name(name),
            CompletionShell::PowerShell => Shell::PowerShell.file_name(name),
            CompletionShell::Elvish => Shell::Elvish.file_name(name),
            CompletionShell::Nushell => Nushell.file_name(name),
        }
    }
}

pub trait GetVerbosity {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel>;
}

impl GetVerbosity for Cmd {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            Cmd::Import { verbosity, .. } => verbosity,
            Cmd::Pr { verbosity, .. } => verbosity,
            Cmd::Completion { verbosity, .. } => verbosity,
        }
    }
}

impl Cmd {
    /// Execute the chosen top-level command.
    #[tracing::instrument(name = "Running command", level = "debug", skip(self))]
    pub async fn run(&self) -> AppResult<()> {
        match self {
            Cmd::Import { args, .. } => retrocookie(&ImportOptions::from(args)),
            Cmd::Pr { args, .. } => {
                let cache = Cache::user()?;
                let (github, token) =
                    pr::login(&args.api_url, args.token.as_deref(), &cache).await?;
                let options = PullRequestOptions::from(args);
                pr::import_pull_requests(&github, &cache, &token, &options, None).await
            }
            Cmd::Completion { shell, output, .. } => {
                let mut cmd = Cli::command();
                if let Some(output_path) = output {
                    let mut file = std::fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .create(true)
                        .open(output_path)?;
                    generate(shell, &mut cmd, "retrocookie", &mut file);
                    info!(
                        "Generated completion script for {} at {}",
                        shell,
                        output_path.display()
                    );
                } else {
                    generate(shell, &mut cmd, "retrocookie", &mut std::io::stdout());
                }
                Ok(())
            }
        }
    }
}
