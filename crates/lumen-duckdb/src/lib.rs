pub mod backend;
pub mod event;
pub mod queries;
pub mod schema;
pub mod session;
pub mod user;
pub mod website;

pub use backend::{DuckDbBackend, StoreError};
