//! Facilities: optional framework features switched on by configuration.
//!
//! Each facility contributes proto-components before the container is
//! populated. The `facilities` config object maps facility names to `true` /
//! `false`; a facility with no entry is skipped with a warning.

use serde_json::Value;
use thiserror::Error;

use crate::component::ProtoComponents;
use crate::config::{json_kind, ConfigProvider, ConfigProviderExt};
use crate::logger::ApplicationLoggingFacility;

pub const FACILITIES_PATH: &str = "facilities";

/// What a facility builder can see while registering its components.
pub struct FacilityContext<'a> {
    pub config: &'a dyn ConfigProvider,
}

pub trait FacilityBuilder: Send + Sync {
    fn facility_name(&self) -> &'static str;

    /// Facilities that must also be enabled for this one to build.
    fn depends_on_facilities(&self) -> &'static [&'static str] {
        &[]
    }

    fn build_and_register(
        &self,
        ctx: &FacilityContext<'_>,
        protos: &mut ProtoComponents,
    ) -> anyhow::Result<()>;
}

/// Link-time registration of a facility builder.
pub struct FacilityRegistration(pub fn() -> Box<dyn FacilityBuilder>);

inventory::collect!(FacilityRegistration);

#[derive(Debug, Error)]
pub enum FacilityError {
    #[error("facility '{facility}' depends on facility '{dependency}', but '{dependency}' is not enabled in configuration")]
    DependencyDisabled {
        facility: &'static str,
        dependency: &'static str,
    },
    #[error("facility '{facility}' failed to build")]
    Build {
        facility: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("setting for facility '{facility}' must be a bool, found {found}")]
    InvalidSetting {
        facility: &'static str,
        found: &'static str,
    },
    #[error("'facilities' must be an object, found {found}")]
    InvalidSection { found: &'static str },
}

/// Runs every known facility builder against the configuration.
#[derive(Default)]
pub struct FacilitiesInitialiser {
    builders: Vec<Box<dyn FacilityBuilder>>,
}

impl FacilitiesInitialiser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in facilities, then every builder registered with `inventory`
    /// ordered by facility name.
    pub fn discover() -> Self {
        let mut init = Self::new();
        init.add(ApplicationLoggingFacility);

        let mut discovered: Vec<Box<dyn FacilityBuilder>> = inventory::iter::<FacilityRegistration>
            .into_iter()
            .map(|r| (r.0)())
            .collect();
        discovered.sort_by_key(|b| b.facility_name());
        for builder in discovered {
            init.add_boxed(builder);
        }
        init
    }

    /// Append a builder; one with an already-known name is ignored.
    pub fn add(&mut self, builder: impl FacilityBuilder + 'static) -> &mut Self {
        self.add_boxed(Box::new(builder))
    }

    fn add_boxed(&mut self, builder: Box<dyn FacilityBuilder>) -> &mut Self {
        let name = builder.facility_name();
        if self.builders.iter().any(|b| b.facility_name() == name) {
            tracing::warn!(facility = name, "Facility already registered; ignoring duplicate");
        } else {
            self.builders.push(builder);
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.builders.iter().map(|b| b.facility_name())
    }

    /// Build every enabled facility into `protos`; returns the enabled names in build order.
    pub fn initialise(
        &self,
        config: &dyn ConfigProvider,
        protos: &mut ProtoComponents,
    ) -> Result<Vec<&'static str>, FacilityError> {
        let status = match config.value(FACILITIES_PATH) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(FacilityError::InvalidSection {
                    found: json_kind(other),
                })
            }
        };

        let enabled = |name: &'static str| -> Result<Option<bool>, FacilityError> {
            match status.and_then(|s| s.get(name)) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Bool(b)) => Ok(Some(*b)),
                Some(other) => Err(FacilityError::InvalidSetting {
                    facility: name,
                    found: json_kind(other),
                }),
            }
        };

        let ctx = FacilityContext { config };
        let mut built = Vec::new();

        tracing::info!("Phase: facilities");
        for builder in &self.builders {
            let name = builder.facility_name();
            match enabled(name)? {
                None => {
                    tracing::warn!(
                        facility = name,
                        "No setting for facility in the facilities configuration; not enabling it"
                    );
                    continue;
                }
                Some(false) => {
                    tracing::debug!(facility = name, "Facility disabled");
                    continue;
                }
                Some(true) => {}
            }

            for &dependency in builder.depends_on_facilities() {
                if enabled(dependency)? != Some(true) {
                    return Err(FacilityError::DependencyDisabled {
                        facility: name,
                        dependency,
                    });
                }
            }

            builder
                .build_and_register(&ctx, protos)
                .map_err(|source| FacilityError::Build {
                    facility: name,
                    source,
                })?;
            tracing::info!(facility = name, "Facility enabled");
            built.push(name);
        }

        Ok(built)
    }
}

impl std::fmt::Debug for FacilitiesInitialiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.names().collect();
        f.debug_struct("FacilitiesInitialiser")
            .field("facilities", &names)
            .finish()
    }
}

/// `true` if `facilities.<name>` is set to `true`.
pub fn facility_enabled(config: &dyn ConfigProvider, name: &str) -> bool {
    config
        .bool_val(&format!("{FACILITIES_PATH}.{name}"))
        .unwrap_or(false)
}
