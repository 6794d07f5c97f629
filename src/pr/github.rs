use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::{AppError, AppResult};

pub const DEFAULT_API_URL: &str = "https://api.github.com/";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branch {
    #[serde(rename = "ref")]
    pub ref_: String,
    pub label: String,
}

/// Pull request in a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub head: Branch,
    pub base: Branch,
    pub user: User,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl PullRequest {
    /// Branch merged by the pull request.
    pub fn branch(&self) -> &str {
        &self.head.ref_
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|label| label.name.clone()).collect()
    }
}

/// Title, body and base of a pull request being opened or edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestFields {
    pub title: String,
    pub body: String,
    pub base: String,
}

#[derive(Debug, Serialize)]
struct NewPullRequest<'a> {
    head: &'a str,
    #[serde(flatten)]
    fields: &'a PullRequestFields,
}

#[derive(Debug, Serialize)]
struct Labels<'a> {
    labels: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub clone_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pull request operations on one hosted repository.
pub(crate) trait PullRequests {
    async fn pull_request(&self, number: u64) -> AppResult<PullRequest>;
    async fn pull_request_by_head(&self, head: &str) -> AppResult<Option<PullRequest>>;
    async fn pull_requests(&self) -> AppResult<Vec<PullRequest>>;
    async fn create_pull_request(
        &self,
        head: &str,
        fields: &PullRequestFields,
    ) -> AppResult<PullRequest>;
    async fn update_pull_request(
        &self,
        number: u64,
        fields: &PullRequestFields,
    ) -> AppResult<PullRequest>;
    async fn add_labels(&self, number: u64, labels: &[String]) -> AppResult<()>;
    async fn replace_labels(&self, number: u64, labels: &[String]) -> AppResult<()>;
}

/// GitHub REST API client authenticated with a token.
#[derive(Debug, Clone)]
pub struct GitHub {
    client: reqwest::Client,
    api: Url,
}

impl GitHub {
    /// Client for an API root: [`DEFAULT_API_URL`], or a GitHub Enterprise root
    /// such as `https://ghe.example.com/api/v3/`.
    pub fn with_api(api: &str, token: &str) -> AppResult<Self> {
        let mut api = Url::parse(api)?;
        if !api.path().ends_with('/') {
            let path = format!("{}/", api.path());
            api.set_path(&path);
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AppError::Other(format!("invalid token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("retrocookie/", env!("CARGO_PKG_VERSION"))),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self { client, api })
    }

    fn request(&self, method: Method, path: &str) -> AppResult<RequestBuilder> {
        let url = self.api.join(path.trim_start_matches('/'))?;
        trace!("{method} {url}");
        Ok(self.client.request(method, url))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        Err(AppError::GitHubStatus { status, message })
    }

    /// Login of the token's owner; doubles as a check that the token works.
    pub async fn authenticated_user(&self) -> AppResult<String> {
        let user: User = self.send(self.request(Method::GET, "user")?).await?;
        Ok(user.login)
    }

    pub async fn repository(&self, owner: &str, name: &str) -> AppResult<GitHubRepository> {
        let info: RepositoryInfo = self
            .send(self.request(Method::GET, &format!("repos/{owner}/{name}"))?)
            .await?;
        debug!("Found {} at {}", info.full_name, info.clone_url);
        Ok(GitHubRepository {
            github: self.clone(),
            owner: owner.to_string(),
            name: name.to_string(),
            info,
        })
    }
}

/// Whether an error means the token was rejected.
pub fn is_unauthorized(error: &AppError) -> bool {
    matches!(
        error,
        AppError::GitHubStatus {
            status: StatusCode::UNAUTHORIZED,
            ..
        }
    )
}

/// A GitHub repository, with its pull requests.
#[derive(Debug, Clone)]
pub struct GitHubRepository {
    github: GitHub,
    owner: String,
    name: String,
    info: RepositoryInfo,
}

impl GitHubRepository {
    pub fn clone_url(&self) -> &str {
        &self.info.clone_url
    }

    fn path(&self, rest: &str) -> String {
        format!("repos/{}/{}/{rest}", self.owner, self.name)
    }

    fn request(&self, method: Method, rest: &str) -> AppResult<RequestBuilder> {
        self.github.request(method, &self.path(rest))
    }
}

impl PullRequests for GitHubRepository {
    async fn pull_request(&self, number: u64) -> AppResult<PullRequest> {
        let request = self.request(Method::GET, &format!("pulls/{number}"))?;
        self.github.send(request).await
    }

    async fn pull_request_by_head(&self, head: &str) -> AppResult<Option<PullRequest>> {
        let request = self
            .request(Method::GET, "pulls")?
            .query(&[("head", head), ("state", "open")]);
        let pulls: Vec<PullRequest> = self.github.send(request).await?;
        Ok(pulls.into_iter().next())
    }

    async fn pull_requests(&self) -> AppResult<Vec<PullRequest>> {
        let mut pulls = Vec::new();
        for page in 1.. {
            let request = self.request(Method::GET, "pulls")?.query(&[
                ("state", "open".to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let batch: Vec<PullRequest> = self.github.send(request).await?;
            let done = batch.len() < PAGE_SIZE;
            pulls.extend(batch);
            if done {
                break;
            }
        }
        Ok(pulls)
    }

    async fn create_pull_request(
        &self,
        head: &str,
        fields: &PullRequestFields,
    ) -> AppResult<PullRequest> {
        let request = self
            .request(Method::POST, "pulls")?
            .json(&NewPullRequest { head, fields });
        self.github.send(request).await
    }

    async fn update_pull_request(
        &self,
        number: u64,
        fields: &PullRequestFields,
    ) -> AppResult<PullRequest> {
        let request = self
            .request(Method::PATCH, &format!("pulls/{number}"))?
            .json(fields);
        self.github.send(request).await
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> AppResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let request = self
            .request(Method::POST, &format!("issues/{number}/labels"))?
            .json(&Labels { labels });
        let _: Vec<Label> = self.github.send(request).await?;
        Ok(())
    }

    async fn replace_labels(&self, number: u64, labels: &[String]) -> AppResult<()> {
        let request = self
            .request(Method::PUT, &format!("issues/{number}/labels"))?
            .json(&Labels { labels });
        let _: Vec<Label> = self.github.send(request).await?;
        Ok(())
    }
}
