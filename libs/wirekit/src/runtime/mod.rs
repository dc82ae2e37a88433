mod runner;

pub use runner::{run, wait_for_shutdown, RunOptions, ShutdownOptions, ShutdownSignal};
