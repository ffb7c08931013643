// stratus: CLI and daemon wiring around the reconciliation core.

pub mod cli;
pub mod daemon;
pub mod logging;

pub use cli::run;
