pub mod config;
pub mod errors;
pub mod models;
pub mod parsers;
pub mod provider;
pub mod services;
