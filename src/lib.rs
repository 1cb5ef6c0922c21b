//! `seqflow` takes batches of sequencing samples through a fixed series of
//! processing stages (read preprocessing, alignment, quality control, and
//! analysis) and compiles cross-sample summary tables at the end. Each
//! sample runs as its own job on a batch scheduler (or on the local
//! machine), and every stage skips work whose output already exists, so an
//! interrupted run can simply be started again.
//!
//! This package is composed of both a library crate and a binary crate. The
//! binary is a thin wrapper around [`pipeline::Pipeline`].
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]

pub mod aggregate;
pub mod alignment;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod layout;
pub mod pipeline;
pub mod qc;
pub mod quantification;
pub mod sample;
pub mod utils;
