//! Library exports for the VinAI label capture subsystem.
//!
//! Exposes the capture session driver, the square-crop transform and the
//! configuration data structures so that other front ends can share them with
//! the command-line tool.

pub mod capture;
pub mod config;

pub use config::Config;
