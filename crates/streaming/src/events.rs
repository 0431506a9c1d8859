use crate::store::TileKey;

/// Notifications for the display collaborator.
///
/// Points are addressed by tile and index; the receiver reads the current
/// point state back from the tile store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PointAdded { key: TileKey, index: usize },
    PointScored { key: TileKey, index: usize },
    /// A display setting changed how an already loaded point is shown.
    PointRestyled { key: TileKey, index: usize },
    DatasetToggled { dataset_id: String, visible: bool },
    SettingChanged { setting_id: String, enabled: bool },
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}
