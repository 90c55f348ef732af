use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::engine::EngineError;
use crate::task::TaskView;

/// Callback invoked with each merged event for a subscribed task id. The
/// error, if any, is the engine's payload passed through unmodified.
pub type EventHandler = Arc<dyn Fn(Option<&EngineError>, &TaskView) + Send + Sync>;

/// Per-task handler lists: ordered, duplicate-free (handler identity is the
/// `Arc` pointer). Dispatch is synchronous and in insertion order; handlers
/// are not isolated from each other, so a panicking handler unwinds through
/// the caller.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: Mutex<HashMap<String, Vec<EventHandler>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` for `id` unless that exact handler is already
    /// registered.
    pub fn subscribe(&self, id: &str, handler: EventHandler) {
        let mut map = self.inner.lock().expect("subscriber registry poisoned");
        let handlers = map.entry(id.to_string()).or_default();
        if !handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            handlers.push(handler);
        }
    }

    /// With a handler, removes that handler; without one, drops every handler
    /// for `id`. Entries never linger empty.
    pub fn unsubscribe(&self, id: &str, handler: Option<&EventHandler>) {
        let mut map = self.inner.lock().expect("subscriber registry poisoned");
        match handler {
            None => {
                map.remove(id);
            }
            Some(handler) => {
                if let Some(handlers) = map.get_mut(id) {
                    handlers.retain(|h| !Arc::ptr_eq(h, handler));
                    if handlers.is_empty() {
                        map.remove(id);
                    }
                }
            }
        }
    }

    /// Invokes every handler currently registered for `id`, in insertion
    /// order. The list is snapshotted first so a handler may re-enter the
    /// registry.
    pub fn dispatch(&self, id: &str, error: Option<&EngineError>, view: &TaskView) {
        let handlers: Vec<EventHandler> = {
            let map = self.inner.lock().expect("subscriber registry poisoned");
            map.get(id).cloned().unwrap_or_default()
        };
        for handler in &handlers {
            handler(error, view);
        }
    }

    pub fn handler_count(&self, id: &str) -> usize {
        self.inner
            .lock()
            .expect("subscriber registry poisoned")
            .get(id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn view(id: &str) -> TaskView {
        TaskView::from_task(&Task {
            id: id.to_string(),
            state: None,
            bytes: None,
            total_bytes: None,
        })
    }

    fn counting_handler(hits: Arc<Mutex<Vec<u32>>>, tag: u32) -> EventHandler {
        Arc::new(move |_error, _view| {
            hits.lock().unwrap().push(tag);
        })
    }

    #[test]
    fn same_handler_registers_once() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let handler = counting_handler(hits.clone(), 1);

        registry.subscribe("t1", handler.clone());
        registry.subscribe("t1", handler);
        registry.dispatch("t1", None, &view("t1"));

        assert_eq!(hits.lock().unwrap().len(), 1);
    }

    #[test]
    fn dispatch_runs_in_insertion_order() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe("t1", counting_handler(hits.clone(), 1));
        registry.subscribe("t1", counting_handler(hits.clone(), 2));
        registry.subscribe("t1", counting_handler(hits.clone(), 3));

        registry.dispatch("t1", None, &view("t1"));
        assert_eq!(*hits.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unsubscribe_without_handler_drops_everything() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe("t1", counting_handler(hits.clone(), 1));
        registry.subscribe("t1", counting_handler(hits.clone(), 2));

        registry.unsubscribe("t1", None);
        registry.dispatch("t1", None, &view("t1"));

        assert!(hits.lock().unwrap().is_empty());
        assert_eq!(registry.handler_count("t1"), 0);
    }

    #[test]
    fn unsubscribe_removes_specific_handler_including_first() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let first = counting_handler(hits.clone(), 1);
        registry.subscribe("t1", first.clone());
        registry.subscribe("t1", counting_handler(hits.clone(), 2));

        registry.unsubscribe("t1", Some(&first));
        registry.dispatch("t1", None, &view("t1"));

        assert_eq!(*hits.lock().unwrap(), vec![2]);
    }

    #[test]
    fn unsubscribe_unknown_id_is_a_noop() {
        let registry = SubscriberRegistry::new();
        let handler = counting_handler(Arc::new(Mutex::new(Vec::new())), 1);
        registry.unsubscribe("missing", Some(&handler));
        registry.unsubscribe("missing", None);
    }

    #[test]
    fn dispatch_only_reaches_the_target_id() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe("t1", counting_handler(hits.clone(), 1));
        registry.subscribe("t2", counting_handler(hits.clone(), 2));

        registry.dispatch("t2", None, &view("t2"));
        assert_eq!(*hits.lock().unwrap(), vec![2]);
    }
}
