// LogTally - core/mod.rs
//
// Core matching and aggregation layer.
// Must NOT depend on: platform, app, or the filesystem directly.

pub mod aggregate;
pub mod application;
pub mod filter;
pub mod format;
pub mod model;
pub mod pipeline;
pub mod remap;
pub mod report;
pub mod rule;
pub mod sink;
pub mod threads;
pub mod timestamp;
