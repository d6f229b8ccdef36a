pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod operations;
pub mod storage;
pub mod utils;

pub use error::ShareError;

pub type Result<T> = std::result::Result<T, ShareError>;
