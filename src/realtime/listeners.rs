//! Listener registry shared by transport handles

use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;
use uuid::Uuid;

use super::events::{EventName, InboundEvent};

pub type Listener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Token returned by `on`, used to remove the registration again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type Registrations = SmallVec<[(ListenerId, Listener); 4]>;

/// event name -> registrations, in registration order
#[derive(Default)]
pub struct Listeners {
    inner: DashMap<EventName, Registrations>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: EventName, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        tracing::trace!(event = %event, listener_id = %id, "Listener registered");
        self.inner.entry(event).or_default().push((id, listener));
        id
    }

    /// Returns false when the id was not registered under `event`
    pub fn remove(&self, event: &EventName, id: ListenerId) -> bool {
        let Some(mut registrations) = self.inner.get_mut(event) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|(existing, _)| *existing != id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            drop(registrations);
            self.inner.remove_if(event, |_, regs| regs.is_empty());
        }

        if removed {
            tracing::trace!(event = %event, listener_id = %id, "Listener removed");
        }
        removed
    }

    /// Invoke every listener registered for the event's name.
    ///
    /// Callbacks run after the map shard is released, so a listener may
    /// register or remove listeners itself.
    pub fn emit(&self, event: &InboundEvent) -> usize {
        let name = event.name();
        let snapshot: Registrations = match self.inner.get(&name) {
            Some(registrations) => registrations.clone(),
            None => return 0,
        };

        for (_, listener) in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    pub fn count(&self, event: &EventName) -> usize {
        self.inner.get(event).map(|regs| regs.len()).unwrap_or(0)
    }
}
