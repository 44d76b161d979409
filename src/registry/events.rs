use crate::registry::types::{ProviderStatus, ProviderUsage};
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow observers skip the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published by the registry after a mutation has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered { name: String },
    Removed { name: String },
    Updated { name: String },
    Toggled { name: String, enabled: bool },
    StatusUpdated { status: ProviderStatus },
    UsageUpdated { usage: ProviderUsage },
    CurrentChanged { name: String },
}

impl RegistryEvent {
    pub fn provider(&self) -> &str {
        match self {
            RegistryEvent::Registered { name }
            | RegistryEvent::Removed { name }
            | RegistryEvent::Updated { name }
            | RegistryEvent::Toggled { name, .. }
            | RegistryEvent::CurrentChanged { name } => name,
            RegistryEvent::StatusUpdated { status } => &status.name,
            RegistryEvent::UsageUpdated { usage } => &usage.provider,
        }
    }
}

/// Publishing side of the registry's event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: RegistryEvent) {
        // No subscribers is the normal case outside the UI layer.
        let _ = self.sender.send(event);
    }
}
