//! The component container: registration, wiring, decoration.
//!
//! `populate` runs once and produces a container whose index is frozen.
//! Lifecycle (start / shutdown) lives in `lifecycle.rs`.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::component::{ComponentRecord, ProtoComponents, WiringIntents};
use crate::config::ConfigProvider;
use crate::contracts::{Decorator, IndexAware, Startable, Stoppable};
use crate::index::ComponentIndex;
use crate::lifecycle::{DrainPolicy, LifecycleState};
use crate::slot::InjectError;
use crate::FRAMEWORK_PREFIX;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("a component named '{name}' is already registered")]
    DuplicateComponent { name: String },

    #[error("component '{component}' field '{field}' depends on '{target}', which is not registered{}", hint_suffix(.hint))]
    MissingDependency {
        component: String,
        field: String,
        target: String,
        hint: Option<String>,
    },

    #[error("cannot inject into component '{component}' field '{field}'")]
    Injection {
        component: String,
        field: String,
        #[source]
        source: InjectError,
    },

    #[error("start failed for component '{component}'")]
    Start {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot {operation} while the container is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("shutdown has already been requested")]
    ShutdownInProgress,
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

/// Closest registered name, if any is similar enough to be a likely typo.
fn suggest<'a>(missing: &str, names: impl Iterator<Item = &'a str>) -> Option<String> {
    names
        .map(|name| (name, strsim::jaro_winkler(missing, name)))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.to_owned())
}

/// Hands the frozen index to every `IndexAware` component.
struct IndexDecorator;

impl Decorator for IndexDecorator {
    fn of_interest(&self, component: &ComponentRecord) -> bool {
        component.has_capability::<dyn IndexAware>()
    }

    fn decorate_component(&self, component: &ComponentRecord, index: &Arc<ComponentIndex>) {
        if let Some(aware) = component.capability::<dyn IndexAware>() {
            aware.index_slot().set_if_unset(Arc::clone(index));
        }
    }
}

/// Fully wired set of components plus their lifecycle bookkeeping.
pub struct ComponentContainer {
    pub(crate) index: Arc<ComponentIndex>,
    pub(crate) startable: Vec<(String, Arc<dyn Startable>)>,
    pub(crate) stoppable: Vec<(String, Arc<dyn Stoppable>)>,
    decorators: Vec<String>,
    pub(crate) drain: DrainPolicy,
    pub(crate) state: Mutex<LifecycleState>,
    pub(crate) shutdown_gate: AtomicBool,
}

/// A decorator in application order; `owner` is the position of the
/// component that provides it, if any.
struct AppliedDecorator {
    name: String,
    owner: Option<usize>,
    decorator: Arc<dyn Decorator>,
}

impl ComponentContainer {
    /// Register, wire, configure and decorate every proto-component.
    ///
    /// Missing dependency targets and injection failures abort; config promises
    /// that cannot be honoured are logged and the field is left unset.
    pub fn populate(
        protos: ProtoComponents,
        config: &dyn ConfigProvider,
    ) -> Result<Self, ContainerError> {
        let (protos, extra_decorators) = protos.into_parts();

        tracing::info!("Phase: register");
        let mut index = ComponentIndex::default();
        let mut intents: Vec<(usize, WiringIntents)> = Vec::with_capacity(protos.len());
        let mut startable = Vec::new();
        let mut stoppable = Vec::new();
        let mut component_decorators = Vec::new();

        for proto in protos {
            let (record, wiring) = proto.into_parts();
            let name = record.name().to_owned();
            if let Some(s) = record.capability::<dyn Startable>() {
                startable.push((name.clone(), s));
            }
            if let Some(s) = record.capability::<dyn Stoppable>() {
                stoppable.push((name.clone(), s));
            }
            let as_decorator = record.capability::<dyn Decorator>();
            let position = index
                .insert(record)
                .map_err(|_| ContainerError::DuplicateComponent { name: name.clone() })?;
            if let Some(d) = as_decorator {
                component_decorators.push(AppliedDecorator {
                    name: name.clone(),
                    owner: Some(position),
                    decorator: d,
                });
            }
            tracing::debug!(component = %name, "Registered component");
            intents.push((position, wiring));
        }

        tracing::info!("Phase: wire");
        for (position, wiring) in &intents {
            let record = index.record_at(*position);
            resolve_dependencies(&index, record, &wiring.dependencies)?;
        }

        tracing::info!("Phase: config");
        for (position, wiring) in &intents {
            let record = index.record_at(*position);
            resolve_config_promises(config, record, &wiring.config_promises);
        }

        let index = Arc::new(index);

        let mut decorators: Vec<AppliedDecorator> =
            Vec::with_capacity(1 + extra_decorators.len() + component_decorators.len());
        decorators.push(AppliedDecorator {
            name: format!("{FRAMEWORK_PREFIX}IndexDecorator"),
            owner: None,
            decorator: Arc::new(IndexDecorator),
        });
        decorators.extend(
            extra_decorators
                .into_iter()
                .map(|(name, decorator)| AppliedDecorator {
                    name,
                    owner: None,
                    decorator,
                }),
        );
        decorators.extend(component_decorators);

        tracing::info!("Phase: decorate");
        for (position, record) in index.components().enumerate() {
            for applied in &decorators {
                // a decorator component never decorates itself
                if applied.owner == Some(position) {
                    continue;
                }
                if applied.decorator.of_interest(record) {
                    tracing::debug!(
                        component = record.name(),
                        decorator = %applied.name,
                        "Decorating component"
                    );
                    applied.decorator.decorate_component(record, &index);
                }
            }
        }

        tracing::info!(
            components = index.len(),
            startable = startable.len(),
            stoppable = stoppable.len(),
            decorators = decorators.len(),
            "Container populated"
        );

        Ok(Self {
            index,
            startable,
            stoppable,
            decorators: decorators.into_iter().map(|applied| applied.name).collect(),
            drain: DrainPolicy::default(),
            state: Mutex::new(LifecycleState::Unstarted),
            shutdown_gate: AtomicBool::new(false),
        })
    }

    /// Replace the drain policy used by `shutdown_components`.
    pub fn with_drain_policy(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    pub fn index(&self) -> &Arc<ComponentIndex> {
        &self.index
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn drain_policy(&self) -> &DrainPolicy {
        &self.drain
    }

    /// Decorator names in the order they were applied.
    pub fn decorators(&self) -> &[String] {
        &self.decorators
    }

    pub fn startable_names(&self) -> impl Iterator<Item = &str> {
        self.startable.iter().map(|(n, _)| n.as_str())
    }

    pub fn stoppable_names(&self) -> impl Iterator<Item = &str> {
        self.stoppable.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for ComponentContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContainer")
            .field("index", &self.index)
            .field("decorators", &self.decorators)
            .field("state", &self.state())
            .finish()
    }
}

fn resolve_dependencies(
    index: &ComponentIndex,
    record: &ComponentRecord,
    dependencies: &[(String, String)],
) -> Result<(), ContainerError> {
    for (field, target_name) in dependencies {
        let Some(target) = index.get(target_name) else {
            return Err(ContainerError::MissingDependency {
                component: record.name().to_owned(),
                field: field.clone(),
                target: target_name.clone(),
                hint: suggest(target_name, index.names()),
            });
        };
        record
            .instance()
            .inject_dependency(field, target)
            .map_err(|source| ContainerError::Injection {
                component: record.name().to_owned(),
                field: field.clone(),
                source,
            })?;
        tracing::trace!(
            component = record.name(),
            field = %field,
            target = %target_name,
            "Injected dependency"
        );
    }
    Ok(())
}

fn resolve_config_promises(
    config: &dyn ConfigProvider,
    record: &ComponentRecord,
    promises: &[(String, String)],
) {
    for (field, path) in promises {
        let Some(value) = config.value(path).filter(|v| !v.is_null()) else {
            tracing::error!(
                component = record.name(),
                field = %field,
                path = %path,
                "No config value available for promised field; leaving it unset"
            );
            continue;
        };
        if let Err(err) = record.instance().inject_config(field, value) {
            tracing::error!(
                component = record.name(),
                field = %field,
                path = %path,
                error = %err,
                "Unable to set config on field; leaving it unset"
            );
        }
    }
}
