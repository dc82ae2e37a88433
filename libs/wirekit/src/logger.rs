//! Per-component loggers and the `ApplicationLogging` facility.
//!
//! A `ComponentLogger` is a thin handle over `tracing` that tags every event
//! with the component's registered name and applies its own threshold on top of
//! whatever the global subscriber filters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::level_filters::LevelFilter;
use tracing::Level;

use crate::capability::Capabilities;
use crate::component::{Component, ComponentRecord, ProtoComponents};
use crate::config::ConfigProviderExt;
use crate::contracts::{Decorator, LoggerAware};
use crate::facility::{FacilityBuilder, FacilityContext};
use crate::index::ComponentIndex;
use crate::FRAMEWORK_PREFIX;

pub const DEFAULT_LOG_LEVEL_PATH: &str = "applicationLogger.defaultLogLevel";
pub const COMPONENT_LOG_LEVELS_PATH: &str = "applicationLogger.componentLogLevels";

/// Target of every event a `ComponentLogger` emits. Its own threshold has
/// already been applied, so subscribers should let this target through.
pub const COMPONENT_LOG_TARGET: &str = "wirekit::component";

/// Parse a level label (`trace` .. `error`, `off`, case-insensitive).
/// `fatal` maps to `error`.
pub fn parse_level(label: &str) -> Option<LevelFilter> {
    if label.eq_ignore_ascii_case("fatal") {
        return Some(LevelFilter::ERROR);
    }
    label.parse().ok()
}

/// Logger bound to one component name.
pub struct ComponentLogger {
    name: String,
    threshold: RwLock<LevelFilter>,
    /// Set when the threshold came from a per-component override.
    pinned: bool,
}

impl ComponentLogger {
    pub fn new(name: impl Into<String>, threshold: LevelFilter) -> Self {
        Self {
            name: name.into(),
            threshold: RwLock::new(threshold),
            pinned: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> LevelFilter {
        *self.threshold.read()
    }

    pub fn set_threshold(&self, threshold: LevelFilter) {
        *self.threshold.write() = threshold;
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level <= self.threshold()
    }

    pub fn trace(&self, message: impl fmt::Display) {
        if self.is_enabled(Level::TRACE) {
            tracing::trace!(target: COMPONENT_LOG_TARGET, component = %self.name, "{message}");
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.is_enabled(Level::DEBUG) {
            tracing::debug!(target: COMPONENT_LOG_TARGET, component = %self.name, "{message}");
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        if self.is_enabled(Level::INFO) {
            tracing::info!(target: COMPONENT_LOG_TARGET, component = %self.name, "{message}");
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        if self.is_enabled(Level::WARN) {
            tracing::warn!(target: COMPONENT_LOG_TARGET, component = %self.name, "{message}");
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        if self.is_enabled(Level::ERROR) {
            tracing::error!(target: COMPONENT_LOG_TARGET, component = %self.name, "{message}");
        }
    }
}

impl fmt::Debug for ComponentLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLogger")
            .field("name", &self.name)
            .field("threshold", &self.threshold())
            .finish()
    }
}

/// Hands out component loggers and keeps their thresholds in step with the
/// global level.
pub struct ComponentLoggerManager {
    global: RwLock<LevelFilter>,
    overrides: HashMap<String, LevelFilter>,
    loggers: RwLock<Vec<Arc<ComponentLogger>>>,
}

impl ComponentLoggerManager {
    pub fn new(global: LevelFilter, overrides: HashMap<String, LevelFilter>) -> Self {
        Self {
            global: RwLock::new(global),
            overrides,
            loggers: RwLock::new(Vec::new()),
        }
    }

    pub fn global_threshold(&self) -> LevelFilter {
        *self.global.read()
    }

    /// A logger for `name`, at its override level if one is configured.
    pub fn create_logger(&self, name: &str) -> Arc<ComponentLogger> {
        let logger = match self.overrides.get(name) {
            Some(&level) => ComponentLogger {
                pinned: true,
                ..ComponentLogger::new(name, level)
            },
            None => ComponentLogger::new(name, self.global_threshold()),
        };
        let logger = Arc::new(logger);
        self.loggers.write().push(Arc::clone(&logger));
        logger
    }

    /// Change the global level; loggers with a per-component override keep theirs.
    pub fn update_global_threshold(&self, threshold: LevelFilter) {
        *self.global.write() = threshold;
        for logger in self.loggers.read().iter().filter(|l| !l.pinned) {
            logger.set_threshold(threshold);
        }
    }
}

impl Component for ComponentLoggerManager {}

impl fmt::Debug for ComponentLoggerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLoggerManager")
            .field("global", &self.global_threshold())
            .field("overrides", &self.overrides)
            .field("loggers", &self.loggers.read().len())
            .finish()
    }
}

/// Gives every `LoggerAware` component without a logger one named after it.
pub struct ComponentLoggerDecorator {
    manager: Arc<ComponentLoggerManager>,
}

impl ComponentLoggerDecorator {
    pub fn new(manager: Arc<ComponentLoggerManager>) -> Self {
        Self { manager }
    }
}

impl Decorator for ComponentLoggerDecorator {
    fn of_interest(&self, component: &ComponentRecord) -> bool {
        let wants = component
            .capability::<dyn LoggerAware>()
            .is_some_and(|aware| !aware.logger_slot().is_set());
        tracing::trace!(
            component = component.name(),
            wants_logger = wants,
            "Checked component for logger injection"
        );
        wants
    }

    fn decorate_component(&self, component: &ComponentRecord, _index: &Arc<ComponentIndex>) {
        if let Some(aware) = component.capability::<dyn LoggerAware>() {
            let logger = self.manager.create_logger(component.name());
            aware.logger_slot().set_if_unset(logger);
        }
    }
}

impl Component for ComponentLoggerDecorator {
    fn declare_capabilities(self: Arc<Self>, caps: &mut Capabilities) {
        caps.provide::<dyn Decorator>(self.clone());
        caps.provide::<Self>(self);
    }
}

/// Registers a `ComponentLoggerManager` and its decorator.
#[derive(Debug, Default)]
pub struct ApplicationLoggingFacility;

impl FacilityBuilder for ApplicationLoggingFacility {
    fn facility_name(&self) -> &'static str {
        "ApplicationLogging"
    }

    fn build_and_register(
        &self,
        ctx: &FacilityContext<'_>,
        protos: &mut ProtoComponents,
    ) -> anyhow::Result<()> {
        let global = match ctx.config.string_val(DEFAULT_LOG_LEVEL_PATH) {
            Ok(label) => parse_level(label)
                .ok_or_else(|| anyhow::anyhow!("unknown log level '{label}' at {DEFAULT_LOG_LEVEL_PATH}"))?,
            Err(_) => LevelFilter::INFO,
        };

        let mut overrides = HashMap::new();
        if let Some(levels) = ctx.config.object_val(COMPONENT_LOG_LEVELS_PATH)? {
            for (component, label) in levels {
                match label.as_str().and_then(parse_level) {
                    Some(level) => {
                        overrides.insert(component.clone(), level);
                    }
                    None => tracing::warn!(
                        component = %component,
                        value = %label,
                        "Ignoring unrecognised component log level"
                    ),
                }
            }
        }

        let manager = Arc::new(ComponentLoggerManager::new(global, overrides));
        let decorator = Arc::new(ComponentLoggerDecorator::new(Arc::clone(&manager)));

        protos.wrap_and_add_proto(format!("{FRAMEWORK_PREFIX}ApplicationLoggingManager"), manager);
        protos.wrap_and_add_proto(format!("{FRAMEWORK_PREFIX}ApplicationLoggingDecorator"), decorator);
        Ok(())
    }
}
