//! Database layer for Trilan

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{ChangeListener, LocalStore, StoreStats};
