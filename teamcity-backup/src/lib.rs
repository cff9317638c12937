pub mod cli;
pub mod load_config;
pub mod logging;

pub use cli::{run, Cli};
