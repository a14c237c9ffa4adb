use thiserror::Error;

#[derive(Debug, Error)]
pub enum BirthdaysError {
    #[error("{0}")]
    InvalidRecord(String),

    #[error("Invalid index")]
    InvalidIndex(String),

    #[error("Index out of range")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid or empty CSV")]
    InvalidCsv,

    #[error("{0}")]
    UnsupportedPayload(String),

    #[error("invalid period '{0}'")]
    InvalidPeriod(String),

    #[error("invalid sort key '{0}'")]
    InvalidSortKey(String),

    #[error("invalid modulo '{0}': expected none, 5 or 10")]
    InvalidModulo(String),

    #[error("User already exists")]
    UserExists,

    #[error("Invalid or expired invite token")]
    InvalidInvite,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(
        "missing GitHub credentials: set GITHUB_APP_ID / GITHUB_APP_INSTALLATION_ID / \
         GITHUB_APP_PRIVATE_KEY or GITHUB_TOKEN"
    )]
    MissingCredentials,

    #[error("could not create a unique branch after {attempts} attempts")]
    BranchCollision { attempts: usize },

    #[error("GitHub API error ({status}): {message}")]
    GitHub { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl BirthdaysError {
    /// True for errors caused by the caller's input rather than the
    /// environment or an upstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BirthdaysError::InvalidRecord(_)
                | BirthdaysError::InvalidIndex(_)
                | BirthdaysError::IndexOutOfRange { .. }
                | BirthdaysError::InvalidCsv
                | BirthdaysError::UnsupportedPayload(_)
                | BirthdaysError::InvalidPeriod(_)
                | BirthdaysError::InvalidSortKey(_)
                | BirthdaysError::InvalidModulo(_)
                | BirthdaysError::UserExists
                | BirthdaysError::InvalidInvite
        )
    }
}

pub type Result<T> = std::result::Result<T, BirthdaysError>;
