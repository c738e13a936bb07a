pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod locate;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod recover;
pub mod snapshot;
pub mod time;
