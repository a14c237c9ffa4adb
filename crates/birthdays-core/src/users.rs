//! Accounts and one-time invites.
//!
//! Passwords are stored as PBKDF2-HMAC-SHA256 digests with a per-user salt,
//! both base64url without padding. The whole book (users plus open invites)
//! is read and replaced as one JSON document.

use crate::error::{BirthdaysError, Result};
use crate::io::atomic_write;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use subtle::ConstantTimeEq;

pub const PBKDF2_ROUNDS: u32 = 200_000;
pub const ADMIN_USERNAME: &str = "admin";

const SALT_BYTES: usize = 16;
const DIGEST_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// `admin` or `user`, case-insensitive; anything else is a plain user.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Role::Admin,
            _ => Role::User,
        }
    }
}

// ---------------------------------------------------------------------------
// Password hashing
// ---------------------------------------------------------------------------

fn digest(password: &str, salt: &[u8], rounds: u32) -> [u8; DIGEST_BYTES] {
    let mut out = [0u8; DIGEST_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub hash: String,
    pub salt: String,
    pub role: Role,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
}

fn default_rounds() -> u32 {
    PBKDF2_ROUNDS
}

impl UserEntry {
    /// Hash `password` under a fresh random salt.
    pub fn new(password: &str, role: Role, rounds: u32) -> Self {
        let salt: [u8; SALT_BYTES] = rand::random();
        Self {
            hash: URL_SAFE_NO_PAD.encode(digest(password, &salt, rounds)),
            salt: URL_SAFE_NO_PAD.encode(salt),
            role,
            rounds,
        }
    }

    pub fn verify(&self, password: &str) -> bool {
        let (Ok(salt), Ok(expected)) = (
            URL_SAFE_NO_PAD.decode(&self.salt),
            URL_SAFE_NO_PAD.decode(&self.hash),
        ) else {
            return false;
        };
        digest(password, &salt, self.rounds)
            .as_slice()
            .ct_eq(&expected)
            .into()
    }
}

// ---------------------------------------------------------------------------
// UserBook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub role: Role,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBook {
    #[serde(default)]
    pub users: BTreeMap<String, UserEntry>,
    #[serde(default)]
    pub invites: BTreeMap<String, Invite>,
}

impl UserBook {
    pub fn create_user(&mut self, username: &str, password: &str, role: Role) -> Result<()> {
        if self.users.contains_key(username) {
            return Err(BirthdaysError::UserExists);
        }
        self.users.insert(
            username.to_string(),
            UserEntry::new(password, role, PBKDF2_ROUNDS),
        );
        Ok(())
    }

    /// Role of the account if the password matches.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Role> {
        let user = self.users.get(username)?;
        user.verify(password).then_some(user.role)
    }

    /// Create the first admin when the book has no users, `initial` is set,
    /// and the caller presented `admin` with exactly that password.
    pub fn bootstrap_admin(&mut self, username: &str, password: &str, initial: Option<&str>) -> bool {
        let Some(initial) = initial else {
            return false;
        };
        if !self.users.is_empty()
            || username != ADMIN_USERNAME
            || !bool::from(password.as_bytes().ct_eq(initial.as_bytes()))
        {
            return false;
        }
        self.create_user(ADMIN_USERNAME, initial, Role::Admin).is_ok()
    }

    /// Issue a one-time invite token for `role`.
    pub fn create_invite(&mut self, role: Role, now: i64) -> String {
        let bytes: [u8; 24] = rand::random();
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.invites.insert(token.clone(), Invite { role, created_at: now });
        token
    }

    /// Remove and return the invite. A token works once.
    pub fn consume_invite(&mut self, token: &str) -> Option<Invite> {
        self.invites.remove(token)
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub trait UserStore: Send + Sync {
    fn load(&self) -> Result<UserBook>;
    fn save(&self, book: &UserBook) -> Result<()>;
}

/// The book as a JSON file. A missing file is an empty book.
#[derive(Debug, Clone)]
pub struct JsonFileUserStore {
    path: PathBuf,
}

impl JsonFileUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UserStore for JsonFileUserStore {
    fn load(&self) -> Result<UserBook> {
        if !self.path.exists() {
            return Ok(UserBook::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, book: &UserBook) -> Result<()> {
        let json = serde_json::to_string_pretty(book)?;
        atomic_write(&self.path, json.as_bytes())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    book: RwLock<UserBook>,
}

impl MemoryUserStore {
    pub fn new(book: UserBook) -> Self {
        Self {
            book: RwLock::new(book),
        }
    }
}

impl UserStore for MemoryUserStore {
    fn load(&self) -> Result<UserBook> {
        Ok(self.book.read().map(|b| b.clone()).unwrap_or_default())
    }

    fn save(&self, book: &UserBook) -> Result<()> {
        if let Ok(mut guard) = self.book.write() {
            *guard = book.clone();
        }
        Ok(())
    }
}
