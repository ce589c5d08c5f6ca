pub mod app;
pub mod auth;
pub mod block;
pub mod client_info;
pub mod error;
pub mod resolve;
pub mod routes;
pub mod state;
pub mod token;
