pub mod batcher;
pub mod error;
pub mod provider;
pub mod sink;
pub mod transport;

pub use batcher::*;
pub use error::*;
pub use provider::{Candidate, QueryProvider, provider_for};
pub use sink::*;
pub use transport::*;
