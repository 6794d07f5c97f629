use thiserror::Error;

/// Unified application error type to simplify bubbling errors through the import flows.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Errored while handling a file. {0}")]
    Io(#[from] std::io::Error),
    #[error("Error from git. {0}")]
    Git(#[from] git2::Error),
    #[error("`git {command}` failed. {stderr}")]
    GitCommand { command: String, stderr: String },
    #[error("Error serializing json. {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Error communicating with GitHub. {0}")]
    GitHub(#[from] reqwest::Error),
    #[error("GitHub responded with {status}. {message}")]
    GitHubStatus {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("Error parsing a URL. {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Error reading from the terminal. {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("Directory not found error. {0}")]
    Dir(#[from] retrocookie_dirs::DirError),
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for results that bubble `AppError`.
pub type AppResult<T> = Result<T, AppError>;
