pub mod cli;
pub mod commands;
pub mod common;
pub mod context;
pub mod extract;
pub mod kb;
pub mod providers;
pub mod resolve;
pub mod streaming;
