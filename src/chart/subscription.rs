//! Explicit listener handles for chart input events.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    PointerMove,
    PointerLeave,
    Resize,
}

impl ListenerKind {
    pub const ALL: [ListenerKind; 3] = [
        ListenerKind::PointerMove,
        ListenerKind::PointerLeave,
        ListenerKind::Resize,
    ];
}

/// Handle returned when listeners are attached. Disposing it detaches
/// everything it attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next: u64,
    active: HashMap<SubscriptionId, Vec<ListenerKind>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, kinds: &[ListenerKind]) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.active.insert(id, kinds.to_vec());
        id
    }

    /// Detach a subscription. Returns false if it was already disposed.
    pub fn dispose(&mut self, id: SubscriptionId) -> bool {
        self.active.remove(&id).is_some()
    }

    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.active.contains_key(&id)
    }

    /// Number of attached listeners of `kind` across all subscriptions.
    pub fn listener_count(&self, kind: ListenerKind) -> usize {
        self.active
            .values()
            .map(|kinds| kinds.iter().filter(|k| **k == kind).count())
            .sum()
    }

    pub fn subscription_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_is_idempotent() {
        let mut reg = ListenerRegistry::new();
        let id = reg.attach(&ListenerKind::ALL);
        assert_eq!(reg.listener_count(ListenerKind::Resize), 1);
        assert!(reg.dispose(id));
        assert!(!reg.dispose(id));
        assert_eq!(reg.listener_count(ListenerKind::Resize), 0);
        assert!(!reg.is_active(id));
    }

    #[test]
    fn test_ids_are_unique() {
        let mut reg = ListenerRegistry::new();
        let a = reg.attach(&[ListenerKind::PointerMove]);
        let b = reg.attach(&[ListenerKind::PointerMove]);
        assert_ne!(a, b);
        assert_eq!(reg.listener_count(ListenerKind::PointerMove), 2);
        reg.dispose(a);
        assert_eq!(reg.subscription_count(), 1);
    }
}
