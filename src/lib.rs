//! Common functionality for gridcommit.
#![warn(missing_docs)]
pub mod cli;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod schedule;
pub mod solver;
pub mod system;
