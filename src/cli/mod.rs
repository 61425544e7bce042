pub mod config_cmd;
pub mod output;
pub mod prompt;
pub mod renderer;
pub mod setup_cmd;
pub mod usage_cmd;
pub mod watch_cmd;
