//! Process-local domain-event bus. Deliberately NOT the teacher's
//! `seesaw::EventBus` (a `tokio::sync::broadcast` fan-out, at-most-once
//! and lossy to slow subscribers): this bus dispatches to every handler
//! registered for a type, sequentially, in registration order, and never
//! lets one handler's error abort its siblings — the ordering and
//! resilience guarantees the component design calls for.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait Handler<E>: Send + Sync {
    async fn handle(&self, event: &E);
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_any(&self, event: &(dyn Any + Send + Sync));
}

struct HandlerAdapter<E, H> {
    inner: H,
    _marker: std::marker::PhantomData<E>,
}

#[async_trait]
impl<E, H> ErasedHandler for HandlerAdapter<E, H>
where
    E: Send + Sync + 'static,
    H: Handler<E>,
{
    async fn handle_any(&self, event: &(dyn Any + Send + Sync)) {
        if let Some(typed) = event.downcast_ref::<E>() {
            self.inner.handle(typed).await;
        }
    }
}

/// In-process publish/subscribe connecting user-context events to the
/// scheduling reactors. Written at startup (subscribe), read thereafter
/// (publish) — the only in-process shared state besides the store.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent-append: multiple handlers for the same event type are
    /// permitted and run in subscription order.
    pub async fn subscribe<E, H>(&self, handler: H)
    where
        E: Send + Sync + 'static,
        H: Handler<E> + 'static,
    {
        let adapter: Arc<dyn ErasedHandler> = Arc::new(HandlerAdapter {
            inner: handler,
            _marker: std::marker::PhantomData::<E>,
        });
        let mut handlers = self.handlers.write().await;
        handlers.entry(TypeId::of::<E>()).or_default().push(adapter);
    }

    /// Invokes handlers for `event`'s type sequentially, in registration
    /// order. A handler that errors internally is expected to catch its
    /// own error and log it; this bus has no error channel of its own
    /// because its contract is "never abort siblings" — there is nothing
    /// for a caught error to propagate to.
    pub async fn publish<E>(&self, event: E)
    where
        E: Send + Sync + 'static,
    {
        let handlers = self.handlers.read().await;
        let Some(list) = handlers.get(&TypeId::of::<E>()) else {
            return;
        };
        let boxed: Box<dyn Any + Send + Sync> = Box::new(event);
        for handler in list {
            handler.handle_any(boxed.as_ref()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted(Arc<AtomicUsize>, usize);

    #[async_trait]
    impl Handler<u32> for Counted {
        async fn handle(&self, _event: &u32) {
            self.0.store(self.1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn handlers_for_same_type_run_in_registration_order() {
        let bus = EventBus::new();
        let last = Arc::new(AtomicUsize::new(0));
        bus.subscribe::<u32, _>(Counted(last.clone(), 1)).await;
        bus.subscribe::<u32, _>(Counted(last.clone(), 2)).await;
        bus.publish(7u32).await;
        assert_eq!(last.load(Ordering::SeqCst), 2);
    }

    struct Recording(Arc<RwLock<Vec<&'static str>>>, &'static str);

    #[async_trait]
    impl<E: Send + Sync + 'static> Handler<E> for Recording {
        async fn handle(&self, _event: &E) {
            self.0.write().await.push(self.1);
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(42u32).await;
    }

    #[tokio::test]
    async fn distinct_event_types_have_independent_handler_lists() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));
        bus.subscribe::<u32, _>(Recording(order.clone(), "u32")).await;
        bus.subscribe::<i64, _>(Recording(order.clone(), "i64")).await;
        bus.publish(1u32).await;
        bus.publish(2i64).await;
        assert_eq!(*order.read().await, vec!["u32", "i64"]);
    }
}
