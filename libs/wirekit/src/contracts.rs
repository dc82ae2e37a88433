use std::sync::Arc;

use crate::component::ComponentRecord;
use crate::index::ComponentIndex;
use crate::logger::ComponentLogger;
use crate::slot::Dep;

/// Lifecycle: started once, in registration order, after wiring and decoration.
pub trait Startable: Send + Sync {
    /// Called once by `start_components`. An error aborts the remaining starts.
    fn start_component(&self) -> anyhow::Result<()>;
}

/// Answer to "may this component be stopped now?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Still busy, optionally with a reason that is logged while draining.
    NotReady(Option<String>),
}

impl Readiness {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Readiness::NotReady(Some(reason.into()))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Readiness::Ready => None,
            Readiness::NotReady(reason) => reason.as_deref(),
        }
    }
}

/// Lifecycle: prepare → drain → stop, driven by `shutdown_components`.
pub trait Stoppable: Send + Sync {
    /// Signal intent to stop; must not block.
    fn prepare_to_stop(&self) {}

    /// Polled while draining until every stoppable component is ready.
    fn ready_to_stop(&self) -> Readiness {
        Readiness::Ready
    }

    /// Called once, whether or not draining succeeded.
    fn stop(&self) -> anyhow::Result<()>;
}

/// Cross-cutting mutator applied to every other component after wiring.
///
/// Implementations should be idempotent and only fill slots that are still
/// unset, so that when several decorators offer the same thing the first wins.
pub trait Decorator: Send + Sync {
    fn of_interest(&self, component: &ComponentRecord) -> bool;

    fn decorate_component(&self, component: &ComponentRecord, index: &Arc<ComponentIndex>);
}

/// A `(predicate, mutate)` pair usable as a decorator.
pub struct FnDecorator<P, M> {
    predicate: P,
    mutate: M,
}

impl<P, M> Decorator for FnDecorator<P, M>
where
    P: Fn(&ComponentRecord) -> bool + Send + Sync,
    M: Fn(&ComponentRecord, &Arc<ComponentIndex>) + Send + Sync,
{
    fn of_interest(&self, component: &ComponentRecord) -> bool {
        (self.predicate)(component)
    }

    fn decorate_component(&self, component: &ComponentRecord, index: &Arc<ComponentIndex>) {
        (self.mutate)(component, index)
    }
}

pub fn decorator_fn<P, M>(predicate: P, mutate: M) -> FnDecorator<P, M>
where
    P: Fn(&ComponentRecord) -> bool + Send + Sync,
    M: Fn(&ComponentRecord, &Arc<ComponentIndex>) + Send + Sync,
{
    FnDecorator { predicate, mutate }
}

/// Components that want read-only access to the component index
/// (for capability-based discovery at their own start time).
pub trait IndexAware: Send + Sync {
    fn index_slot(&self) -> &Dep<ComponentIndex>;
}

/// Components that want a logger bound to their registered name.
pub trait LoggerAware: Send + Sync {
    fn logger_slot(&self) -> &Dep<ComponentLogger>;
}
