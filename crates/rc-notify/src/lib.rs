//! RocketChat notifications: webhook messages, file uploads and a command
//! wrapper that reports how a command went.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod message;
pub mod orchestrator;
pub mod runner;
pub mod sink;
