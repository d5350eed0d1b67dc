//! Goal progress tracking: goals with a fixed track of numbered steps that
//! are completed strictly in order, gated by per-plan limits.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod limits;
pub mod model;
pub mod store;
pub mod util;
