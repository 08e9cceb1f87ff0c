// LogTally - app/mod.rs
//
// Application layer: definition loading, input discovery, the run driver,
// and the output dispatcher.
// Dependencies: core and platform layers.

pub mod app_mgr;
pub mod output;
pub mod run;
