pub mod cli;
pub mod config;
pub mod controller;
pub mod data_models;
pub mod error;
pub mod extractor;
pub mod rate_limiter;
pub mod search_client;
pub mod session;
pub mod telegram;
