pub mod cli;
pub mod config;
pub mod delta;
pub mod error;
pub mod export;
pub mod logging;
pub mod matching;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod registry;
pub mod util;
