pub mod cli;
pub mod clients;
pub mod load_config;

pub use cli::{run, Cli, Commands};
