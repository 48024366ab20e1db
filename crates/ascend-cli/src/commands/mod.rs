pub mod auth;
pub mod config;
pub mod report;
pub mod serve;
pub mod stats;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;
