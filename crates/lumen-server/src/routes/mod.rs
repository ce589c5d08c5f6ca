pub mod health;
pub mod send;
pub mod users;
pub mod websites;
