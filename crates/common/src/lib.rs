pub mod actors;
pub mod config;
pub mod events;
pub mod lease;
pub mod logger;
pub mod models;
