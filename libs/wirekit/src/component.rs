//! Component records and proto-components.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::capability::Capabilities;
use crate::contracts::Decorator;
use crate::slot::InjectError;

/// An instance the container can register.
///
/// Usually derived with `#[derive(Component)]`, which fills in the setter table
/// for `#[inject]` / `#[config]` fields and declares the listed capabilities.
pub trait Component: Send + Sync + 'static {
    /// Declare every capability this instance offers. Implementations must also
    /// declare the concrete type so the component can be looked up by it.
    fn declare_capabilities(self: Arc<Self>, caps: &mut Capabilities) {
        caps.provide::<Self>(self);
    }

    /// Assign `target` (or one of its capabilities) into the field named `field`.
    fn inject_dependency(&self, field: &str, target: &ComponentRecord) -> Result<(), InjectError> {
        let _ = target;
        Err(InjectError::UnknownField {
            field: field.to_owned(),
        })
    }

    /// Coerce `value` into the config field named `field`.
    fn inject_config(&self, field: &str, value: &Value) -> Result<(), InjectError> {
        let _ = value;
        Err(InjectError::UnknownField {
            field: field.to_owned(),
        })
    }
}

/// A registered component: its unique name, the instance and what it offers.
pub struct ComponentRecord {
    name: String,
    instance: Arc<dyn Component>,
    capabilities: Capabilities,
}

impl ComponentRecord {
    /// Build the record, asking the instance for its capabilities once.
    pub fn new(name: impl Into<String>, instance: Arc<dyn Component>) -> Self {
        let mut capabilities = Capabilities::new();
        Arc::clone(&instance).declare_capabilities(&mut capabilities);
        Self {
            name: name.into(),
            instance,
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Arc<dyn Component> {
        &self.instance
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn capability<C: ?Sized + 'static>(&self) -> Option<Arc<C>> {
        self.capabilities.get::<C>()
    }

    pub fn has_capability<C: ?Sized + 'static>(&self) -> bool {
        self.capabilities.contains::<C>()
    }

    /// The instance as its concrete type.
    pub fn downcast<T: Component>(&self) -> Option<Arc<T>> {
        self.capabilities.get::<T>()
    }
}

impl fmt::Debug for ComponentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRecord")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// An unwired component plus its pending wiring intents.
///
/// Both intent maps keep insertion order; re-adding a field replaces its target.
pub struct ProtoComponent {
    name: String,
    instance: Arc<dyn Component>,
    dependencies: Vec<(String, String)>,
    config_promises: Vec<(String, String)>,
}

impl ProtoComponent {
    pub fn new(name: impl Into<String>, instance: Arc<dyn Component>) -> Self {
        Self {
            name: name.into(),
            instance,
            dependencies: Vec::new(),
            config_promises: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Arc<dyn Component> {
        &self.instance
    }

    /// Field `field` should receive the component registered as `component_name`.
    pub fn add_dependency(
        &mut self,
        field: impl Into<String>,
        component_name: impl Into<String>,
    ) -> &mut Self {
        upsert(&mut self.dependencies, field.into(), component_name.into());
        self
    }

    /// Field `field` should receive the config value at the dot-separated `path`.
    pub fn add_config_promise(&mut self, field: impl Into<String>, path: impl Into<String>) -> &mut Self {
        upsert(&mut self.config_promises, field.into(), path.into());
        self
    }

    pub fn with_dependency(mut self, field: impl Into<String>, component_name: impl Into<String>) -> Self {
        self.add_dependency(field, component_name);
        self
    }

    pub fn with_config_promise(mut self, field: impl Into<String>, path: impl Into<String>) -> Self {
        self.add_config_promise(field, path);
        self
    }

    pub fn dependencies(&self) -> &[(String, String)] {
        &self.dependencies
    }

    pub fn config_promises(&self) -> &[(String, String)] {
        &self.config_promises
    }

    pub(crate) fn into_parts(self) -> (ComponentRecord, WiringIntents) {
        let record = ComponentRecord::new(self.name, self.instance);
        let intents = WiringIntents {
            dependencies: self.dependencies,
            config_promises: self.config_promises,
        };
        (record, intents)
    }
}

impl fmt::Debug for ProtoComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoComponent")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("config_promises", &self.config_promises)
            .finish()
    }
}

fn upsert(entries: &mut Vec<(String, String)>, key: String, value: String) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

pub(crate) struct WiringIntents {
    pub(crate) dependencies: Vec<(String, String)>,
    pub(crate) config_promises: Vec<(String, String)>,
}

/// Ordered collection of proto-components (and explicitly registered decorators)
/// awaiting `ComponentContainer::populate`.
#[derive(Default)]
pub struct ProtoComponents {
    protos: Vec<ProtoComponent>,
    decorators: Vec<(String, Arc<dyn Decorator>)>,
}

impl ProtoComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, proto: ProtoComponent) -> &mut ProtoComponent {
        self.protos.push(proto);
        let last = self.protos.len() - 1;
        &mut self.protos[last]
    }

    /// Wrap an instance in a proto-component and append it.
    pub fn wrap_and_add_proto(
        &mut self,
        name: impl Into<String>,
        instance: Arc<dyn Component>,
    ) -> &mut ProtoComponent {
        self.push(ProtoComponent::new(name, instance))
    }

    /// Register a decorator that is not itself a component.
    pub fn add_decorator(&mut self, name: impl Into<String>, decorator: impl Decorator + 'static) {
        let decorator: Arc<dyn Decorator> = Arc::new(decorator);
        self.decorators.push((name.into(), decorator));
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProtoComponent> {
        self.protos.iter_mut().find(|p| p.name == name)
    }

    pub fn extend(&mut self, other: ProtoComponents) {
        self.protos.extend(other.protos);
        self.decorators.extend(other.decorators);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.protos.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.protos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protos.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<ProtoComponent>, Vec<(String, Arc<dyn Decorator>)>) {
        (self.protos, self.decorators)
    }
}

impl fmt::Debug for ProtoComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.names().collect();
        let decorators: Vec<&str> = self.decorators.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ProtoComponents")
            .field("components", &names)
            .field("decorators", &decorators)
            .finish()
    }
}
