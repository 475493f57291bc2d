use super::types::Event;
use crate::dispatch::DispatchTarget;
use crate::events::EventPriority;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Call convention of a listener, fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Suspending,
    Plain,
}

type SuspendingFn<E> = Arc<dyn Fn(Arc<E>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type PlainFn<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;
type TargetResolver<E> = Arc<dyn Fn(&E) -> DispatchTarget + Send + Sync>;

enum Handler<E> {
    Suspending(SuspendingFn<E>),
    Plain(PlainFn<E>),
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Handler::Suspending(f) => Handler::Suspending(Arc::clone(f)),
            Handler::Plain(f) => Handler::Plain(Arc::clone(f)),
        }
    }
}

/// One listener for events of type `E`.
///
/// ```rust,ignore
/// let registration = ListenerRegistration::suspending("greet", |event: Arc<PlayerJoin>| async move {
///     event.greet().await
/// })
/// .with_priority(EventPriority::High)
/// .ignore_cancelled(true);
/// ```
pub struct ListenerRegistration<E: Event> {
    name: Arc<str>,
    priority: EventPriority,
    ignore_cancelled: bool,
    resolver: Option<TargetResolver<E>>,
    handler: Handler<E>,
}

impl<E: Event> Clone for ListenerRegistration<E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            priority: self.priority,
            ignore_cancelled: self.ignore_cancelled,
            resolver: self.resolver.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<E: Event> ListenerRegistration<E> {
    /// A listener that may suspend.
    pub fn suspending<F, Fut>(name: impl Into<Arc<str>>, handler: F) -> Self
    where
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::with_handler(
            name,
            Handler::Suspending(Arc::new(move |event| handler(event).boxed())),
        )
    }

    /// A listener that runs to completion without suspending.
    pub fn plain<F>(name: impl Into<Arc<str>>, handler: F) -> Self
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_handler(name, Handler::Plain(Arc::new(handler)))
    }

    fn with_handler(name: impl Into<Arc<str>>, handler: Handler<E>) -> Self {
        Self {
            name: name.into(),
            priority: EventPriority::default(),
            ignore_cancelled: false,
            resolver: None,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Skip this listener for events that are already cancelled.
    pub fn ignore_cancelled(mut self, ignore: bool) -> Self {
        self.ignore_cancelled = ignore;
        self
    }

    /// Pick the dispatch target per event, e.g. the region of the player involved.
    pub fn with_target<R>(mut self, resolver: R) -> Self
    where
        R: Fn(&E) -> DispatchTarget + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub fn ignores_cancelled(&self) -> bool {
        self.ignore_cancelled
    }

    pub fn handler_kind(&self) -> HandlerKind {
        match self.handler {
            Handler::Suspending(_) => HandlerKind::Suspending,
            Handler::Plain(_) => HandlerKind::Plain,
        }
    }

    /// Where this listener runs for `event`. Defaults to the worker pool for
    /// asynchronous events and the main thread otherwise.
    pub fn resolve_target(&self, event: &E) -> DispatchTarget {
        match &self.resolver {
            Some(resolver) => resolver(event),
            None if event.is_asynchronous() => DispatchTarget::WorkerPool,
            None => DispatchTarget::MainThread,
        }
    }

    /// Whether the listener must be skipped for `event` in its current state.
    pub(crate) fn skips(&self, event: &E) -> bool {
        self.ignore_cancelled
            && event
                .cancellable()
                .is_some_and(|cancellable| cancellable.is_cancelled())
    }

    /// The listener body. The handler itself is only called when the
    /// returned future is first polled.
    pub(crate) fn invoke(&self, event: Arc<E>) -> BoxFuture<'static, anyhow::Result<()>> {
        match self.handler.clone() {
            Handler::Suspending(handler) => async move { handler(event).await }.boxed(),
            Handler::Plain(handler) => async move { handler(&event) }.boxed(),
        }
    }
}

impl<E: Event> fmt::Debug for ListenerRegistration<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .field("handler_kind", &self.handler_kind())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CancelFlag, Cancellable};

    struct Chat {
        asynchronous: bool,
        cancel: CancelFlag,
    }

    impl Event for Chat {
        fn is_asynchronous(&self) -> bool {
            self.asynchronous
        }

        fn cancellable(&self) -> Option<&dyn Cancellable> {
            Some(&self.cancel)
        }
    }

    fn chat(asynchronous: bool) -> Chat {
        Chat {
            asynchronous,
            cancel: CancelFlag::default(),
        }
    }

    #[test]
    fn test_default_target_follows_synchronicity() {
        let registration = ListenerRegistration::<Chat>::plain("log", |_| Ok(()));
        assert_eq!(registration.resolve_target(&chat(false)), DispatchTarget::MainThread);
        assert_eq!(registration.resolve_target(&chat(true)), DispatchTarget::WorkerPool);
    }

    #[test]
    fn test_explicit_target_wins() {
        let registration = ListenerRegistration::<Chat>::plain("log", |_| Ok(()))
            .with_target(|_| DispatchTarget::GlobalRegion);
        assert_eq!(registration.resolve_target(&chat(false)), DispatchTarget::GlobalRegion);
    }

    #[test]
    fn test_skips_only_cancelled_events_when_ignoring() {
        let ignoring = ListenerRegistration::<Chat>::plain("filter", |_| Ok(())).ignore_cancelled(true);
        let observing = ListenerRegistration::<Chat>::plain("audit", |_| Ok(()));

        let event = chat(false);
        assert!(!ignoring.skips(&event));
        event.cancel.set_cancelled(true);
        assert!(ignoring.skips(&event));
        assert!(!observing.skips(&event));
    }

    #[test]
    fn test_handler_kind_is_fixed_at_registration() {
        let plain = ListenerRegistration::<Chat>::plain("p", |_| Ok(()));
        let suspending = ListenerRegistration::<Chat>::suspending("s", |_| async { anyhow::Ok(()) });
        assert_eq!(plain.handler_kind(), HandlerKind::Plain);
        assert_eq!(suspending.handler_kind(), HandlerKind::Suspending);
        assert_eq!(plain.priority(), EventPriority::Normal);
        assert!(!plain.ignores_cancelled());
    }
}
