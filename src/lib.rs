// ABOUTME: Library root for lockclaw — re-exports all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod cli;
pub mod config;
pub mod oauth;
pub mod permission;
pub mod prompt;
pub mod vault;
