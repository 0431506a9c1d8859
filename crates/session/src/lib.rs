//! Session orchestration: owns the dataset registry, tile store, fetch
//! coordinator and query batcher, and turns user actions and network
//! completions into [`Effect`]s for a driver to execute.

pub mod codec;
pub mod config;
pub mod display;
pub mod driver;
pub mod http;
pub mod orchestrator;
pub mod persist;

pub use codec::*;
pub use config::*;
pub use display::*;
pub use driver::*;
pub use http::*;
pub use orchestrator::*;
pub use persist::*;
