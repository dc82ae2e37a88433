//! Injection slots.
//!
//! Components are shared (`Arc`) before they are wired, so every field the
//! container fills is an interior slot. `Dep<T>` holds a reference to another
//! component (or any capability it offers), `Setting<T>` holds a scalar coerced
//! from configuration. Writes go through a lock, which makes everything set during
//! `populate` visible to any thread that reads the slot afterwards.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::component::ComponentRecord;
use crate::config::json_kind;

/// Why a single field could not be injected.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("no injectable field named '{field}'")]
    UnknownField { field: String },
    #[error("field '{field}' ({kind}) cannot receive a component reference")]
    NotInjectable { field: String, kind: &'static str },
    #[error("component '{target}' does not provide {expected}")]
    TypeMismatch {
        target: String,
        expected: &'static str,
    },
    #[error("field '{field}' ({kind}) is not a supported config kind (string, bool or integer)")]
    UnsupportedKind { field: String, kind: &'static str },
    #[error("cannot use a {found} config value as {expected}")]
    Coercion {
        expected: ConfigKind,
        found: &'static str,
    },
}

/// Slot for a reference to another component, or to one of its capabilities.
pub struct Dep<T: ?Sized> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> Default for Dep<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T> Dep<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Unconditional assignment; wiring uses this.
    pub fn set(&self, value: Arc<T>) {
        *self.slot.write() = Some(value);
    }

    /// Check-before-set for decorators. Returns `true` if this call filled the slot.
    pub fn set_if_unset(&self, value: Arc<T>) -> bool {
        let mut guard = self.slot.write();
        if guard.is_some() {
            return false;
        }
        *guard = Some(value);
        true
    }

    /// Resolve `T` on the target component and assign it.
    pub fn wire(&self, target: &ComponentRecord) -> Result<(), InjectError> {
        let value = target
            .capability::<T>()
            .ok_or_else(|| InjectError::TypeMismatch {
                target: target.name().to_owned(),
                expected: std::any::type_name::<T>(),
            })?;
        self.set(value);
        Ok(())
    }
}

impl<T: ?Sized> fmt::Debug for Dep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("type", &std::any::type_name::<T>())
            .field("wired", &self.slot.read().is_some())
            .finish()
    }
}

/// Primitive kinds a config promise can be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    String,
    Bool,
    Int,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKind::String => f.write_str("string"),
            ConfigKind::Bool => f.write_str("bool"),
            ConfigKind::Int => f.write_str("integer"),
        }
    }
}

/// Scalar types a `Setting` may hold.
pub trait ConfigScalar: Clone + Send + Sync + 'static {
    const KIND: ConfigKind;

    fn from_config(value: &Value) -> Option<Self>;
}

impl ConfigScalar for String {
    const KIND: ConfigKind = ConfigKind::String;

    fn from_config(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl ConfigScalar for bool {
    const KIND: ConfigKind = ConfigKind::Bool;

    fn from_config(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

macro_rules! int_scalar {
    ($($t:ty),*) => {
        $(
            impl ConfigScalar for $t {
                const KIND: ConfigKind = ConfigKind::Int;

                fn from_config(value: &Value) -> Option<Self> {
                    if let Some(v) = value.as_i64() {
                        return <$t>::try_from(v).ok();
                    }
                    value.as_u64().and_then(|v| <$t>::try_from(v).ok())
                }
            }
        )*
    };
}

int_scalar!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Slot for a value coerced from configuration.
pub struct Setting<T> {
    slot: RwLock<Option<T>>,
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T: ConfigScalar> Setting<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A setting that starts with a value; a config promise overrides it.
    pub fn with_default(value: T) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.slot.read().clone()
    }

    pub fn get_or(&self, fallback: T) -> T {
        self.get().unwrap_or(fallback)
    }

    pub fn get_or_default(&self) -> T
    where
        T: Default,
    {
        self.get().unwrap_or_default()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }

    pub fn set(&self, value: T) {
        *self.slot.write() = Some(value);
    }

    pub fn coerce_from(&self, value: &Value) -> Result<(), InjectError> {
        let coerced = T::from_config(value).ok_or(InjectError::Coercion {
            expected: T::KIND,
            found: json_kind(value),
        })?;
        self.set(coerced);
        Ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Setting").field(&*self.slot.read()).finish()
    }
}
