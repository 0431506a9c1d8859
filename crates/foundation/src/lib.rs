pub mod geo;
pub mod tiles;

// Foundation crate: pure coordinate math only, no I/O.
pub use geo::*;
pub use tiles::*;
