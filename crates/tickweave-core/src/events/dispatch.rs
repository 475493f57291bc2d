use super::bus::RegisteredListener;
use super::types::{Event, EventExecutionMode};
use crate::dispatch::DispatchTarget;
use crate::error::{is_cancellation, SchedulingError, SchedulingResult, TaskPanicked};
use crate::host::{Host, OwnerId};
use crate::registry::SessionRegistry;
use crate::task::{StartMode, TaskHandle};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub(crate) fn fire<E: Event>(
    registry: &SessionRegistry,
    firing_owner: &OwnerId,
    event: Arc<E>,
    mode: EventExecutionMode,
) -> SchedulingResult<Vec<TaskHandle>> {
    check_firing_thread(registry.host().as_ref(), event.as_ref())?;

    let listeners = registry.bus().listeners::<E>();
    tracing::trace!(
        event = event.event_name(),
        listeners = listeners.len(),
        ?mode,
        "firing event"
    );

    match mode {
        EventExecutionMode::Concurrent => Ok(listeners
            .iter()
            .filter_map(|listener| launch_listener(registry, listener, &event))
            .collect()),
        EventExecutionMode::Consecutive => {
            let session = registry.get_or_create(firing_owner)?;
            let registry = registry.clone();
            let sequence = session.launch(DispatchTarget::Unconfined, StartMode::Default, async move {
                for listener in listeners.iter() {
                    if let Some(handle) = launch_listener(&registry, listener, &event) {
                        handle.join().await;
                    }
                }
                Ok(())
            });
            Ok(vec![sequence])
        }
    }
}

fn check_firing_thread<E: Event>(host: &dyn Host, event: &E) -> SchedulingResult<()> {
    let on_tick_thread = host.is_tick_thread();
    let expected = match (event.is_asynchronous(), on_tick_thread) {
        (true, true) => "off the tick threads because it is asynchronous",
        (false, false) => "from a tick thread because it is synchronous",
        _ => return Ok(()),
    };
    Err(SchedulingError::WrongThread {
        event: event.event_name().to_string(),
        expected,
    })
}

/// Launch one listener on its owner's session. Disabled owners and listeners
/// that ignore the event's cancelled state are skipped.
fn launch_listener<E: Event>(
    registry: &SessionRegistry,
    listener: &Arc<RegisteredListener<E>>,
    event: &Arc<E>,
) -> Option<TaskHandle> {
    if !registry.host().is_owner_enabled(&listener.owner) {
        return None;
    }
    if listener.registration.skips(event) {
        return None;
    }
    let session = registry.get_or_create(&listener.owner).ok()?;

    let target = listener.registration.resolve_target(event);
    Some(session.launch(
        target,
        StartMode::Default,
        run_listener(Arc::clone(listener), Arc::clone(event)),
    ))
}

/// Listener failures stop here: they are logged and the task completes, so
/// the remaining listeners still run. Cancellation passes through.
async fn run_listener<E: Event>(listener: Arc<RegisteredListener<E>>, event: Arc<E>) -> anyhow::Result<()> {
    let outcome = AssertUnwindSafe(listener.registration.invoke(Arc::clone(&event)))
        .catch_unwind()
        .await;

    let error = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(error)) => error,
        Err(payload) => TaskPanicked::from_payload(payload).into(),
    };
    if is_cancellation(&error) {
        return Err(error);
    }

    tracing::error!(
        event = event.event_name(),
        owner = %listener.owner,
        listener = listener.registration.name(),
        "could not pass event to listener: {:#}",
        error
    );
    Ok(())
}
