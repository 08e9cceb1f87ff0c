// LogTally - platform/mod.rs
//
// Platform abstraction layer: config.toml, platform directories, file access.
// Dependencies: standard library, directories, chrono.
// Must NOT depend on: core, app.

pub mod config;
pub mod fs;
