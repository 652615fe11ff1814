#![deny(unreachable_pub)]
pub mod config;
pub mod grid;
pub mod runner;
pub mod web;

pub use grid::{GridError, GridResult};
pub use runner::GridRunner;
