//! Repository API client and the publish workflow.
//!
//! Publishing is a linear script: resolve the base branch head, create a
//! uniquely named branch, commit the CSV file to it and open a pull request.
//! Nothing is rolled back; a failure after the branch exists leaves it behind.

use crate::config::{GitHubAuth, GitHubConfig};
use crate::error::{BirthdaysError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const USER_AGENT: &str = "birthdays-app";
pub const API_VERSION: &str = "2022-11-28";

/// Branch creation attempts after the first one.
pub const MAX_BRANCH_RETRIES: usize = 5;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client with the default timeout and user agent.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Texts attached to the commit and the pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessages {
    pub commit_message: String,
    pub pr_title: String,
    pub pr_body: String,
}

impl PublishMessages {
    pub fn for_file(file_path: &str) -> Self {
        Self {
            commit_message: format!("Update {file_path} via birthdays backend"),
            pr_title: format!("Update {file_path}"),
            pr_body: format!("Automated update of {file_path} via the birthdays backend."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub pr_url: String,
    pub pr_number: u64,
    pub branch: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: Option<RefObject>,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, config: GitHubConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.auth.is_some()
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{tail}",
            self.config.api_url, self.config.owner, self.config.repo
        )
    }

    fn api(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
            .bearer_auth(token)
    }

    /// Bearer token for API calls. App credentials are exchanged for an
    /// installation token on every call.
    pub async fn access_token(&self) -> Result<String> {
        match &self.config.auth {
            None => Err(BirthdaysError::MissingCredentials),
            Some(GitHubAuth::Token(token)) => Ok(token.clone()),
            Some(GitHubAuth::App {
                app_id,
                installation_id,
                private_key,
            }) => {
                let jwt = app_jwt(app_id, private_key, Utc::now())?;
                let url = format!(
                    "{}/app/installations/{installation_id}/access_tokens",
                    self.config.api_url
                );
                let resp = self.api(Method::POST, &url, &jwt).send().await?;
                let body: InstallationToken = expect_json(resp, &[StatusCode::CREATED, StatusCode::OK]).await?;
                Ok(body.token)
            }
        }
    }

    /// Head commit of the base branch.
    pub async fn base_sha(&self, token: &str) -> Result<String> {
        let url = self.repo_url(&format!("git/ref/heads/{}", self.config.base_branch));
        let resp = self.api(Method::GET, &url, token).send().await?;
        let body: RefResponse = expect_json(resp, &[StatusCode::OK]).await?;
        body.object
            .and_then(|o| o.sha)
            .ok_or_else(|| BirthdaysError::GitHub {
                status: 200,
                message: "Failed to resolve base branch HEAD SHA".to_string(),
            })
    }

    /// Create `refs/heads/{name}` at `base_sha`. If the name is taken (422),
    /// retry with a random suffix up to `MAX_BRANCH_RETRIES` times. Returns
    /// the name actually created.
    pub async fn create_branch(&self, token: &str, base_sha: &str, name: &str) -> Result<String> {
        let url = self.repo_url("git/refs");
        let mut candidate = name.to_string();
        for attempt in 0..=MAX_BRANCH_RETRIES {
            if attempt > 0 {
                candidate = format!("{name}-{}", random_suffix());
            }
            let resp = self
                .api(Method::POST, &url, token)
                .json(&json!({ "ref": format!("refs/heads/{candidate}"), "sha": base_sha }))
                .send()
                .await?;
            match resp.status() {
                StatusCode::CREATED => return Ok(candidate),
                StatusCode::UNPROCESSABLE_ENTITY => {
                    tracing::warn!(branch = %candidate, attempt, "branch name already taken");
                }
                _ => return Err(api_error(resp).await),
            }
        }
        Err(BirthdaysError::BranchCollision {
            attempts: MAX_BRANCH_RETRIES + 1,
        })
    }

    /// Blob SHA of the data file on `git_ref`, or `None` if it does not exist.
    pub async fn file_sha(&self, token: &str, git_ref: &str) -> Result<Option<String>> {
        Ok(self.contents(token, git_ref).await?.and_then(|c| c.sha))
    }

    async fn contents(&self, token: &str, git_ref: &str) -> Result<Option<ContentsResponse>> {
        let url = self.repo_url(&format!("contents/{}", self.config.file_path));
        let resp = self
            .api(Method::GET, &url, token)
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(expect_json(resp, &[StatusCode::OK]).await?))
    }

    /// Create or update the data file on `branch`.
    pub async fn put_file(
        &self,
        token: &str,
        branch: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<()> {
        let url = self.repo_url(&format!("contents/{}", self.config.file_path));
        let mut payload = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = sha {
            payload["sha"] = json!(sha);
        }
        let resp = self.api(Method::PUT, &url, token).json(&payload).send().await?;
        if !matches!(resp.status(), StatusCode::OK | StatusCode::CREATED) {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    pub async fn open_pull_request(
        &self,
        token: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<(u64, String)> {
        let url = self.repo_url("pulls");
        let resp = self
            .api(Method::POST, &url, token)
            .json(&json!({
                "title": title,
                "head": head,
                "base": self.config.base_branch,
                "body": body,
            }))
            .send()
            .await?;
        let pr: PullResponse = expect_json(resp, &[StatusCode::CREATED, StatusCode::OK]).await?;
        Ok((pr.number, pr.html_url))
    }

    /// Current contents of the data file on the base branch. A missing file
    /// reads as empty text.
    pub async fn fetch_file(&self) -> Result<String> {
        let token = self.access_token().await?;
        let Some(contents) = self.contents(&token, &self.config.base_branch).await? else {
            return Ok(String::new());
        };
        let encoded: String = contents
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD.decode(encoded).map_err(|e| BirthdaysError::GitHub {
            status: 200,
            message: format!("file content is not valid base64: {e}"),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Run the whole workflow for `csv` and return the pull request.
    pub async fn publish_csv(&self, csv: &str, messages: &PublishMessages) -> Result<PublishOutcome> {
        let token = self.access_token().await?;
        let base_sha = self.base_sha(&token).await?;

        let wanted = branch_name(&self.config.branch_prefix, Utc::now());
        let branch = self.create_branch(&token, &base_sha, &wanted).await?;
        tracing::info!(%branch, base = %self.config.base_branch, "created publish branch");

        let result = async {
            let sha = self.file_sha(&token, &branch).await?;
            self.put_file(&token, &branch, csv, &messages.commit_message, sha.as_deref())
                .await?;
            self.open_pull_request(&token, &branch, &messages.pr_title, &messages.pr_body)
                .await
        }
        .await;

        match result {
            Ok((pr_number, pr_url)) => {
                tracing::info!(%branch, pr_number, %pr_url, "opened pull request");
                Ok(PublishOutcome {
                    pr_url,
                    pr_number,
                    branch,
                })
            }
            Err(e) => {
                tracing::warn!(%branch, error = %e, "publish failed; branch left in place");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `{prefix}-{YYYYMMDDHHMMSS}` in UTC.
pub fn branch_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.format("%Y%m%d%H%M%S"))
}

/// Six random lowercase alphanumerics.
pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// RS256 app JWT, backdated a minute for clock skew and valid nine minutes.
fn app_jwt(app_id: &str, private_key: &str, now: DateTime<Utc>) -> Result<String> {
    let claims = AppClaims {
        iat: now.timestamp() - 60,
        exp: now.timestamp() + 9 * 60,
        iss: app_id.to_string(),
    };
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
        &claims,
        &key,
    )?)
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    accepted: &[StatusCode],
) -> Result<T> {
    if !accepted.contains(&resp.status()) {
        return Err(api_error(resp).await);
    }
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text)?)
}

async fn api_error(resp: reqwest::Response) -> BirthdaysError {
    let status = resp.status().as_u16();
    let url = resp.url().path().to_string();
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(400).collect();
    BirthdaysError::GitHub {
        status,
        message: format!("{url}: {snippet}"),
    }
}
