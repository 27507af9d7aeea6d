pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod generate;
pub mod i18n;
pub mod logging;
pub mod planner;
pub mod prompt;
pub mod request;
pub mod session;
pub mod subprocess;
pub mod table;
