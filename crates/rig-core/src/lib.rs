pub mod config;
pub mod executor;
pub mod outcome;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod sink;
pub mod stats;

pub use config::*;
pub use executor::*;
pub use outcome::*;
pub use pool::*;
pub use progress::*;
pub use queue::*;
pub use runner::*;
pub use sink::*;
pub use stats::*;
