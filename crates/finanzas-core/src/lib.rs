// Library root: domain model, configuration and the pure financial
// computations shared by the LLM, app and TUI crates.

pub mod categories;
pub mod config;
pub mod context;
pub mod format;
pub mod ledger;
pub mod model;
pub mod stats;
