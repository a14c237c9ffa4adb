use crate::error::{BirthdaysError, Result};
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const DEFAULT_OWNER: &str = "grinwi";
pub const DEFAULT_REPO: &str = "birth-app";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_FILE_PATH: &str = "birthdays.csv";
pub const DEFAULT_BRANCH_PREFIX: &str = "update-birthdays";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 14 * 24 * 60 * 60;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_USERS_PATH: &str = "users.json";

// ---------------------------------------------------------------------------
// GitHubConfig
// ---------------------------------------------------------------------------

/// Credentials for the repository API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubAuth {
    /// Installed GitHub App; exchanged for an installation token per publish.
    App {
        app_id: String,
        installation_id: u64,
        private_key: String,
    },
    /// Pre-issued bearer token.
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub base_branch: String,
    pub file_path: String,
    pub branch_prefix: String,
    pub auth: Option<GitHubAuth>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            base_branch: DEFAULT_BRANCH.to_string(),
            file_path: DEFAULT_FILE_PATH.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            auth: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// HMAC key for session tokens. Without it no session can be issued
    /// and gated routes answer 401.
    pub secret: Option<String>,
    /// Password that creates the first `admin` account on an empty user
    /// book.
    pub admin_initial_password: Option<String>,
    /// Shared token guarding `/sync`.
    pub bootstrap_token: Option<String>,
    pub token_ttl_seconds: u64,
    pub cookie_secure: bool,
    /// Open access: every request acts as admin. Local development only.
    pub disabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            admin_initial_password: None,
            bootstrap_token: None,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            cookie_secure: true,
            disabled: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub github: GitHubConfig,
    pub auth: AuthConfig,
    pub data_path: PathBuf,
    /// JSON file holding accounts and open invites.
    pub users_path: PathBuf,
    /// Upstream for the `/api` proxy routes; `None` means this server.
    pub backend_url: Option<String>,
    pub publish_on_change: bool,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            auth: AuthConfig::default(),
            data_path: PathBuf::from(DEFAULT_FILE_PATH),
            users_path: PathBuf::from(DEFAULT_USERS_PATH),
            backend_url: None,
            publish_on_change: false,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let auth = match (
            get("GITHUB_APP_ID"),
            get("GITHUB_APP_INSTALLATION_ID"),
            get("GITHUB_APP_PRIVATE_KEY"),
        ) {
            (Some(app_id), Some(installation_id), Some(private_key)) => {
                let installation_id = installation_id.parse::<u64>().map_err(|_| {
                    BirthdaysError::Config(format!(
                        "GITHUB_APP_INSTALLATION_ID must be numeric, got '{installation_id}'"
                    ))
                })?;
                Some(GitHubAuth::App {
                    app_id,
                    installation_id,
                    private_key: unescape_pem(&private_key),
                })
            }
            _ => get("GITHUB_TOKEN")
                .or_else(|| get("BIRTHDAY_APP_EDIT_CSV_TOKEN"))
                .map(GitHubAuth::Token),
        };

        let github = GitHubConfig {
            api_url: or("GITHUB_API_URL", DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            owner: or("GITHUB_REPO_OWNER", DEFAULT_OWNER),
            repo: or("GITHUB_REPO", DEFAULT_REPO),
            base_branch: or("GITHUB_BRANCH", DEFAULT_BRANCH),
            file_path: or("GITHUB_FILE_PATH", DEFAULT_FILE_PATH),
            branch_prefix: sanitize_branch_prefix(&or("PR_BRANCH_PREFIX", DEFAULT_BRANCH_PREFIX)),
            auth,
        };

        let token_ttl_seconds = match get("AUTH_TOKEN_TTL_SECONDS") {
            Some(v) => v.parse::<u64>().map_err(|_| {
                BirthdaysError::Config(format!("AUTH_TOKEN_TTL_SECONDS must be numeric, got '{v}'"))
            })?,
            None => DEFAULT_TOKEN_TTL_SECONDS,
        };

        let auth = AuthConfig {
            secret: get("AUTH_SECRET"),
            admin_initial_password: get("ADMIN_INITIAL_PASSWORD"),
            bootstrap_token: get("BOOTSTRAP_TOKEN"),
            token_ttl_seconds,
            cookie_secure: get("COOKIE_SECURE").map_or(true, |v| parse_flag(&v)),
            disabled: get("AUTH_DISABLED").is_some_and(|v| parse_flag(&v)),
        };

        let port = match get("PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| BirthdaysError::Config(format!("PORT must be a port number, got '{v}'")))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            github,
            auth,
            data_path: PathBuf::from(or("DATA_PATH", DEFAULT_FILE_PATH)),
            users_path: PathBuf::from(or("USERS_PATH", DEFAULT_USERS_PATH)),
            backend_url: get("BACKEND_URL").map(|u| u.trim_end_matches('/').to_string()),
            publish_on_change: get("PUBLISH_ON_CHANGE").is_some_and(|v| parse_flag(&v)),
            port,
        })
    }

    /// Key/value view for diagnostics with secrets redacted.
    pub fn env_preview(&self) -> Vec<EnvPreview> {
        let (app_id, installation, key, token) = match &self.github.auth {
            Some(GitHubAuth::App {
                app_id,
                installation_id,
                private_key,
            }) => (
                app_id.clone(),
                installation_id.to_string(),
                redact(private_key),
                String::new(),
            ),
            Some(GitHubAuth::Token(t)) => (String::new(), String::new(), String::new(), redact(t)),
            None => Default::default(),
        };
        let secret = |v: &Option<String>| v.as_deref().map(redact).unwrap_or_default();

        [
            ("GITHUB_API_URL", self.github.api_url.clone()),
            ("GITHUB_REPO_OWNER", self.github.owner.clone()),
            ("GITHUB_REPO", self.github.repo.clone()),
            ("GITHUB_BRANCH", self.github.base_branch.clone()),
            ("GITHUB_FILE_PATH", self.github.file_path.clone()),
            ("PR_BRANCH_PREFIX", self.github.branch_prefix.clone()),
            ("GITHUB_APP_ID", app_id),
            ("GITHUB_APP_INSTALLATION_ID", installation),
            ("GITHUB_APP_PRIVATE_KEY", key),
            ("GITHUB_TOKEN", token),
            ("DATA_PATH", self.data_path.display().to_string()),
            ("USERS_PATH", self.users_path.display().to_string()),
            ("BACKEND_URL", self.backend_url.clone().unwrap_or_default()),
            ("AUTH_SECRET", secret(&self.auth.secret)),
            ("ADMIN_INITIAL_PASSWORD", secret(&self.auth.admin_initial_password)),
            ("AUTH_DISABLED", self.auth.disabled.to_string()),
            ("COOKIE_SECURE", self.auth.cookie_secure.to_string()),
            ("BOOTSTRAP_TOKEN", secret(&self.auth.bootstrap_token)),
        ]
        .into_iter()
        .map(|(key, value)| EnvPreview {
            key: key.to_string(),
            value,
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvPreview {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static PREFIX_RE: OnceLock<Regex> = OnceLock::new();

fn prefix_re() -> &'static Regex {
    PREFIX_RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9._/-]").unwrap())
}

/// Replace characters git refs cannot carry with `-`. Falls back to the
/// default prefix when nothing is left.
pub fn sanitize_branch_prefix(raw: &str) -> String {
    let cleaned = prefix_re().replace_all(raw.trim(), "-").to_string();
    if cleaned.is_empty() {
        DEFAULT_BRANCH_PREFIX.to_string()
    } else {
        cleaned
    }
}

/// `abcd…wxyz (len=N)`, or `<redacted:N>` for short values.
pub fn redact(value: &str) -> String {
    let n = value.chars().count();
    if n == 0 {
        return String::new();
    }
    if n <= 8 {
        return format!("<redacted:{n}>");
    }
    let head: String = value.chars().take(4).collect();
    let tail: String = value.chars().skip(n - 4).collect();
    format!("{head}…{tail} (len={n})")
}

/// PEM keys pasted into single-line env vars often carry literal `\n`.
fn unescape_pem(raw: &str) -> String {
    if raw.contains("\\n") {
        raw.replace("\\n", "\n")
    } else {
        raw.to_string()
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
