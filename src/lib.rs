pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod jobs;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod workers;

pub use workers::{default_handlers, Worker};
