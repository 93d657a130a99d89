//! In-process notification transport.

use super::record::ChangeRecord;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

/// Receiver of flushed change records. Delivery is best effort.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, record: &ChangeRecord);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeRecord) + Send + Sync,
{
    fn on_change(&self, record: &ChangeRecord) {
        self(record)
    }
}

/// Subscriber list injected into a store; shared via `Arc` by any number of stores.
#[derive(Default)]
pub struct ChangeBus {
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Delivers `record` to every listener registered at call time.
    pub fn publish(&self, record: &ChangeRecord) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            listener.on_change(record);
        }
    }
}

impl Debug for ChangeBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ChangeBus;
    use crate::changes::ChangeRecord;
    use std::sync::{Arc, Mutex};

    #[test]
    fn publish_reaches_every_listener() {
        let bus = ChangeBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(Arc::new(move |record: &ChangeRecord| {
                seen.lock().unwrap().push((name, record.table.clone()));
            }));
        }

        bus.publish(&ChangeRecord::new("files"));

        assert_eq!(bus.listener_count(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first", "files".to_string()), ("second", "files".to_string())]
        );
    }
}
