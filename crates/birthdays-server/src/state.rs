use std::sync::Arc;

use birthdays_core::config::Config;
use birthdays_core::github::{self, GitHubClient};
use birthdays_core::record::Record;
use birthdays_core::store::{CsvFileStore, RecordStore};
use birthdays_core::users::{JsonFileUserStore, MemoryUserStore, UserBook, UserStore};
use tokio::sync::Mutex;

use crate::error::AppError;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordStore>,
    pub users: Arc<dyn UserStore>,
    pub http_client: reqwest::Client,
    pub github: GitHubClient,
    /// Upstream the `/api` proxy forwards to, without trailing slash.
    pub backend_url: String,
    /// Serializes load-modify-save within this process.
    write_lock: Arc<Mutex<()>>,
    users_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// State with an in-memory user book; see [`AppState::with_users`].
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> anyhow::Result<Self> {
        let http_client = github::http_client()?;
        let backend_url = config
            .backend_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", config.port));
        Ok(Self {
            github: GitHubClient::new(http_client.clone(), config.github.clone()),
            config: Arc::new(config),
            store,
            users: Arc::new(MemoryUserStore::default()),
            http_client,
            backend_url,
            write_lock: Arc::new(Mutex::new(())),
            users_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn with_users(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = users;
        self
    }

    /// State backed by the CSV file at `config.data_path` and the user book
    /// at `config.users_path`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(CsvFileStore::new(config.data_path.clone()));
        let users = Arc::new(JsonFileUserStore::new(config.users_path.clone()));
        Ok(Self::new(config, store)?.with_users(users))
    }

    pub async fn load(&self) -> Result<Vec<Record>, AppError> {
        let store = self.store.clone();
        let rows = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
        Ok(rows)
    }

    /// Load, apply `f`, save. `f` failing leaves the store untouched.
    pub async fn mutate<F, T>(&self, f: F) -> Result<(Vec<Record>, T), AppError>
    where
        F: FnOnce(&mut Vec<Record>) -> birthdays_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut rows = store.load()?;
            let out = f(&mut rows)?;
            store.save(&rows)?;
            Ok::<_, birthdays_core::BirthdaysError>((rows, out))
        })
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
        Ok(result)
    }

    /// Load the user book, apply `f`, and save it if `f` changed it. Nothing
    /// is written when `f` fails. Password hashing runs inside `f`, off the
    /// async threads.
    pub async fn mutate_users<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut UserBook) -> birthdays_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.users_lock.lock().await;
        let users = self.users.clone();
        let out = tokio::task::spawn_blocking(move || {
            let mut book = users.load()?;
            let before = book.clone();
            let out = f(&mut book)?;
            if book != before {
                users.save(&book)?;
            }
            Ok::<_, birthdays_core::BirthdaysError>(out)
        })
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
        Ok(out)
    }

    /// Replace the whole list.
    pub async fn replace_all(&self, rows: Vec<Record>) -> Result<(), AppError> {
        self.mutate(move |current| {
            *current = rows;
            Ok(())
        })
        .await
        .map(|_| ())
    }
}
