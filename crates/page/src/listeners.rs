use std::collections::BTreeMap;

/// Document-level event kinds the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Resize,
    PointerMove,
    TransitionEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
struct Registration {
    kind: EventKind,
    label: String,
}

/// Bookkeeping for document-level listeners.
///
/// Dispatch is performed by whoever owns the page; the registry records who
/// is subscribed so hosts only forward events that somebody listens for.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    next: u64,
    registrations: BTreeMap<ListenerId, Registration>,
}

impl ListenerRegistry {
    pub fn listen(&mut self, kind: EventKind, label: impl Into<String>) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        let label = label.into();
        tracing::trace!(?kind, %label, listener = id.0, "listener registered");
        self.registrations.insert(id, Registration { kind, label });
        id
    }

    /// Returns `false` when the listener was already removed.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        match self.registrations.remove(&id) {
            Some(registration) => {
                tracing::trace!(
                    kind = ?registration.kind,
                    label = %registration.label,
                    listener = id.0,
                    "listener removed"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.registrations.contains_key(&id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registrations
            .values()
            .filter(|registration| registration.kind == kind)
            .count()
    }

    pub fn labels(&self, kind: EventKind) -> Vec<&str> {
        self.registrations
            .values()
            .filter(|registration| registration.kind == kind)
            .map(|registration| registration.label.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisten_is_idempotent() {
        let mut registry = ListenerRegistry::default();
        let resize = registry.listen(EventKind::Resize, "mirror clip");
        registry.listen(EventKind::PointerMove, "tilt");
        assert_eq!(registry.listener_count(EventKind::Resize), 1);
        assert!(registry.unlisten(resize));
        assert!(!registry.unlisten(resize));
        assert_eq!(registry.listener_count(EventKind::Resize), 0);
        assert_eq!(registry.labels(EventKind::PointerMove), vec!["tilt"]);
    }
}
