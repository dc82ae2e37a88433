//! # WireKit - Component Container
//!
//! An inversion-of-control runtime that assembles independently-built component
//! instances into a wired application graph, enriches them through decorators and
//! drives a two-phase start/stop lifecycle across them.
//!
//! ## Features
//!
//! - **Pre-built graphs**: components are allocated first, then wired by name, so
//!   mutually-referencing components need no construction order
//! - **Setter tables**: `#[derive(Component)]` generates the field table used for
//!   dependency and config injection; no runtime reflection
//! - **Capabilities**: components declare the behaviour contracts they offer
//!   (`Startable`, `Stoppable`, `Decorator`, user traits) and can be discovered by them
//! - **Phase-based lifecycle**: register → wire → decorate → start → prepare → drain → stop
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wirekit::{Component, ComponentContainer, ConfigAccessor, Dep, ProtoComponents, Setting, Startable};
//!
//! #[derive(Component, Default)]
//! #[component(capabilities = [Startable])]
//! struct Greeter {
//!     #[inject]
//!     clock: Dep<Clock>,
//!     #[config]
//!     greeting: Setting<String>,
//! }
//!
//! let mut protos = ProtoComponents::default();
//! protos.wrap_and_add_proto("clock", Arc::new(Clock::default()));
//! protos
//!     .wrap_and_add_proto("greeter", Arc::new(Greeter::default()))
//!     .add_dependency("clock", "clock")
//!     .add_config_promise("greeting", "greeter.greeting");
//!
//! let container = ComponentContainer::populate(protos, &ConfigAccessor::empty())?;
//! container.start_components()?;
//! ```

// Lets the derive output (which names `::wirekit`) compile inside this crate's own tests.
extern crate self as wirekit;

pub use anyhow::Result;
pub use serde_json;

// Re-export inventory for facility registration
pub use inventory;

pub mod capability;
pub mod component;
pub mod config;
pub mod container;
pub mod contracts;
pub mod facility;
pub mod index;
pub mod lifecycle;
pub mod logger;
pub mod runtime;
pub mod slot;

pub use capability::{CapabilityKey, Capabilities};
pub use component::{Component, ComponentRecord, ProtoComponent, ProtoComponents};
pub use config::{merge_json, ConfigAccessor, ConfigError, ConfigProvider, ConfigProviderExt};
pub use container::{ComponentContainer, ContainerError};
pub use contracts::{
    decorator_fn, Decorator, FnDecorator, IndexAware, LoggerAware, Readiness, Startable,
    Stoppable,
};
pub use facility::{
    facility_enabled, FacilitiesInitialiser, FacilityBuilder, FacilityContext, FacilityError,
    FacilityRegistration,
};
pub use index::ComponentIndex;
pub use lifecycle::{DrainPolicy, LifecycleState, ShutdownReport};
pub use logger::{
    parse_level, ApplicationLoggingFacility, COMPONENT_LOG_TARGET, ComponentLogger, ComponentLoggerDecorator,
    ComponentLoggerManager,
};
pub use runtime::{run, wait_for_shutdown, RunOptions, ShutdownOptions, ShutdownSignal};
pub use slot::{ConfigKind, ConfigScalar, Dep, InjectError, Setting};

// Re-export the derive from the proc-macro crate
pub use wirekit_macros::Component;

/// Prefix for the names of components the framework registers itself.
pub const FRAMEWORK_PREFIX: &str = "wirekit";
