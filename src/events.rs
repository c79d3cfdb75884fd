use tokio::sync::broadcast;

/// Connectivity and authentication transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Online,
    Offline,
    LoggedIn { user_id: String },
    LoggedOut,
}

/// Broadcast channel for [`AppEvent`]s.
///
/// Every subscriber sees events in the order they were published. Dropping a
/// receiver unsubscribes it. Subscribers that fall more than `capacity`
/// events behind skip the oldest ones.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: AppEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
