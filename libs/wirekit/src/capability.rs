//! Capability sets: the behaviour contracts a component instance offers.
//!
//! A capability is keyed by the `TypeId` of either the concrete component type or
//! a trait object type such as `dyn Startable`. The handle stored for a key is the
//! instance itself, already coerced to `Arc<C>`, so lookups never need reflection.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a capability (a concrete type or a `dyn Trait`).
#[derive(Clone, Copy)]
pub struct CapabilityKey {
    id: TypeId,
    name: &'static str,
}

impl CapabilityKey {
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for CapabilityKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CapabilityKey {}

impl Hash for CapabilityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

struct Entry {
    key: CapabilityKey,
    handle: Box<dyn Any + Send + Sync>,
}

/// Ordered set of capabilities declared by one component instance.
#[derive(Default)]
pub struct Capabilities {
    entries: Vec<Entry>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that the instance offers capability `C`.
    ///
    /// Declaring the same capability twice keeps the latest handle.
    pub fn provide<C>(&mut self, instance: Arc<C>) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let key = CapabilityKey::of::<C>();
        let handle: Box<dyn Any + Send + Sync> = Box::new(instance);
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(existing) => existing.handle = handle,
            None => self.entries.push(Entry { key, handle }),
        }
        self
    }

    pub fn get<C>(&self) -> Option<Arc<C>>
    where
        C: ?Sized + 'static,
    {
        let key = CapabilityKey::of::<C>();
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.handle.downcast_ref::<Arc<C>>())
            .cloned()
    }

    pub fn contains<C: ?Sized + 'static>(&self) -> bool {
        self.contains_key(&CapabilityKey::of::<C>())
    }

    pub fn contains_key(&self, key: &CapabilityKey) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = CapabilityKey> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}
