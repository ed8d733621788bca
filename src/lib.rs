pub mod build_info;
pub mod commands;
pub mod compare;
pub mod config;
pub mod correlate;
pub mod diff;
pub mod error;
pub mod index;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod output;
pub mod store;
pub mod telemetry;
