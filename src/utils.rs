//! Utilities that are used across the pipeline stages.

pub mod command;
pub mod display;
pub mod formats;
pub mod pathbuf;
