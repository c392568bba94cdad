//! Core library for the workbook-tools command line application.
//!
//! The library exposes the bulk workbook transformation engines that power
//! the command-line interface as well as the tests. The modules keep
//! responsibilities narrow and composable: codec and destination adapters
//! live under [`io`], plan value objects inside [`plan`], the transformation
//! engines in [`engine`], and plan-file orchestration under [`runner`].

pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod model;
pub mod naming;
pub mod passwords;
pub mod plan;
pub mod progress;
pub mod runner;

pub use error::{Result, WorkbookError};
