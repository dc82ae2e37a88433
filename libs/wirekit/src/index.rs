//! Read-only component index: name → record and capability → records.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::capability::CapabilityKey;
use crate::component::ComponentRecord;

/// Built once during registration, then frozen behind an `Arc`.
#[derive(Default)]
pub struct ComponentIndex {
    records: Vec<ComponentRecord>, // registration order
    by_name: HashMap<String, usize>,
    by_capability: HashMap<CapabilityKey, Vec<usize>>,
}

impl ComponentIndex {
    /// Insert a record; returns the existing record's position if the name is taken.
    pub(crate) fn insert(&mut self, record: ComponentRecord) -> Result<usize, usize> {
        if let Some(&existing) = self.by_name.get(record.name()) {
            return Err(existing);
        }
        let position = self.records.len();
        for key in record.capabilities().keys() {
            self.by_capability.entry(key).or_default().push(position);
        }
        self.by_name.insert(record.name().to_owned(), position);
        self.records.push(record);
        Ok(position)
    }

    /// Positions come from `insert`, so they are always in bounds.
    pub(crate) fn record_at(&self, position: usize) -> &ComponentRecord {
        &self.records[position]
    }

    pub fn get(&self, name: &str) -> Option<&ComponentRecord> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Capability `C` of the component registered as `name`.
    pub fn find<C: ?Sized + 'static>(&self, name: &str) -> Option<Arc<C>> {
        self.get(name).and_then(ComponentRecord::capability::<C>)
    }

    /// All components, in registration order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.records.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(ComponentRecord::name)
    }

    /// Records declaring capability `C`, in registration order.
    pub fn records_with<C: ?Sized + 'static>(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.by_capability
            .get(&CapabilityKey::of::<C>())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&i| &self.records[i])
    }

    /// Every instance offering capability `C`, in registration order, and no others.
    pub fn find_by_capability<C: ?Sized + 'static>(&self) -> Vec<Arc<C>> {
        self.records_with::<C>()
            .filter_map(ComponentRecord::capability::<C>)
            .collect()
    }

    /// Like `find_by_capability`, paired with the registered names.
    pub fn named_by_capability<C: ?Sized + 'static>(&self) -> Vec<(&str, Arc<C>)> {
        self.records_with::<C>()
            .filter_map(|r| r.capability::<C>().map(|c| (r.name(), c)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Debug for ComponentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.names().collect();
        f.debug_struct("ComponentIndex")
            .field("components", &names)
            .field("capabilities", &self.by_capability.len())
            .finish()
    }
}
