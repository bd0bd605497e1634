pub mod cli;
pub mod fetcher;
pub mod git;
pub mod model;
pub mod resolver;

mod api;
mod config;
mod flock;

pub use api::{LockMode, Modpin, ModpinBuilder};
pub use config::ModpinConfig;
