/// Lifecycle of one dataset tile.
///
/// Empty → Loading → Loaded | Failed. Both end states are terminal: a tile
/// that reached them is never fetched again for the lifetime of the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TileStatus {
    #[default]
    Empty,
    Loading,
    Loaded,
    Failed,
}
