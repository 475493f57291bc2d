//! Adapts async command callbacks to a host's synchronous command interface.
//!
//! The host needs an answer before the callback returns, so the bridge hands
//! back an optimistic default and launches the real callback on the session.
//! When the bridge is called on the main thread and the callback finishes
//! without suspending, the task runs inline and its real result replaces the
//! default before the host sees it. A callback that suspends answers too late:
//! the host keeps the default.

use crate::dispatch::DispatchTarget;
use crate::session::Session;
use crate::task::StartMode;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// One command invocation as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub sender: String,
    pub label: String,
    pub args: Vec<String>,
}

impl CommandInvocation {
    pub fn new(sender: impl Into<String>, label: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            sender: sender.into(),
            label: label.into(),
            args,
        }
    }
}

/// Synchronous callback handed to the host's command table.
pub type HostCommandCallback = Box<dyn Fn(CommandInvocation) -> bool + Send + Sync>;

/// Synchronous tab completer handed to the host.
pub type HostTabCompleter = Box<dyn Fn(CommandInvocation) -> Vec<String> + Send + Sync>;

/// Wraps async command and tab-completion callbacks for one session.
#[derive(Clone)]
pub struct CommandBridge {
    session: Arc<Session>,
    target: DispatchTarget,
}

impl CommandBridge {
    /// Bridge that runs callbacks on the main thread.
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            target: DispatchTarget::MainThread,
        }
    }

    pub fn with_target(mut self, target: DispatchTarget) -> Self {
        self.target = target;
        self
    }

    /// Wrap a command executor. The host sees `true` unless the callback
    /// answers `false` before its first suspension point.
    pub fn wrap_command<F, Fut>(&self, callback: F) -> HostCommandCallback
    where
        F: Fn(CommandInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let bridge = self.clone();
        let callback = Arc::new(callback);
        Box::new(move |invocation| {
            let callback = Arc::clone(&callback);
            bridge.answer(true, async move { callback(invocation).await })
        })
    }

    /// Wrap a tab completer. The host sees an empty list unless the callback
    /// answers before its first suspension point.
    pub fn wrap_tab_completer<F, Fut>(&self, callback: F) -> HostTabCompleter
    where
        F: Fn(CommandInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<String>>> + Send + 'static,
    {
        let bridge = self.clone();
        let callback = Arc::new(callback);
        Box::new(move |invocation| {
            let callback = Arc::clone(&callback);
            bridge.answer(Vec::new(), async move { callback(invocation).await })
        })
    }

    fn answer<T, Fut>(&self, default: T, callback: Fut) -> T
    where
        T: Clone + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(default));
        let writer = Arc::clone(&slot);
        self.session
            .launch(self.target.clone(), StartMode::Default, async move {
                let value = callback.await?;
                *writer.lock() = value;
                Ok(())
            });

        let answer = slot.lock().clone();
        answer
    }
}

impl std::fmt::Debug for CommandBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBridge")
            .field("owner", self.session.owner())
            .field("target", &self.target)
            .finish()
    }
}
