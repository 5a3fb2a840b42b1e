pub mod config;
pub mod health;
pub mod logging;
pub mod server;
pub mod service;
pub mod supervisor;
