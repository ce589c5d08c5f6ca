pub mod cache;
pub mod config;
pub mod error;
pub mod filters;
pub mod flatten;
pub mod identity;
pub mod model;
