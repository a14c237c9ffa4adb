pub mod auth;
pub mod csv;
pub mod health;
pub mod people;
pub mod sync;
