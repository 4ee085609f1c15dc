pub mod agents;
pub mod config;
pub mod cookies;
pub mod formatter;
pub mod models;
pub mod providers;
pub mod sanitize;
pub mod secret;
pub mod service;
