pub mod calendar;
pub mod codec;
pub mod config;
pub mod error;
pub mod github;
pub mod io;
pub mod record;
pub mod store;
pub mod users;

pub use error::{BirthdaysError, Result};
