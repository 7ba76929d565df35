pub mod config;
pub mod replay;

pub use config::ConfigCommand;
pub use replay::ReplayCommand;
