pub mod dataset;
pub mod decode;
pub mod events;
pub mod fetch;
pub mod residency;
pub mod store;

pub use dataset::*;
pub use decode::*;
pub use events::*;
pub use fetch::*;
pub use residency::*;
pub use store::*;
