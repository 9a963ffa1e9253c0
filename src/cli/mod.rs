//! CLI entrypoints

pub mod commands;
