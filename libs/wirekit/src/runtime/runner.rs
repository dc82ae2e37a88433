//! WireKit runtime runner.
//!
//! Phase order: **facilities → register → wire → config → decorate → start →
//! wait → prepare → drain → stop**.
//!
//! Shutdown can be driven by OS signals, an external `CancellationToken`,
//! or an arbitrary future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::component::ProtoComponents;
use crate::config::ConfigProvider;
use crate::container::ComponentContainer;
use crate::facility::FacilitiesInitialiser;
use crate::lifecycle::{DrainPolicy, ShutdownReport};

/// The OS signal that ended [`wait_for_shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
        })
    }
}

/// Resolves on the first Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_shutdown() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| ShutdownSignal::Interrupt),
            _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

/// How the runtime should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Options for running a container to completion.
pub struct RunOptions {
    /// Merged configuration; read by facilities and config promises.
    pub config: Arc<dyn ConfigProvider>,
    /// Application components, registered after facility components.
    pub components: ProtoComponents,
    pub facilities: FacilitiesInitialiser,
    pub drain: DrainPolicy,
    /// Shutdown strategy.
    pub shutdown: ShutdownOptions,
}

impl RunOptions {
    /// Discovered facilities, default drain policy, OS signals.
    pub fn new(config: Arc<dyn ConfigProvider>, components: ProtoComponents) -> Self {
        Self {
            config,
            components,
            facilities: FacilitiesInitialiser::discover(),
            drain: DrainPolicy::default(),
            shutdown: ShutdownOptions::Signals,
        }
    }
}

/// Full cycle: facilities → populate → start → wait → shutdown.
///
/// Populate errors are returned as-is. A start failure shuts down whatever was
/// registered before the error is returned.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let started_at = Instant::now();

    // 1. Prepare cancellation token based on shutdown options
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    // 2. Spawn shutdown waiter (Signals / Future)
    match opts.shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                match wait_for_shutdown().await {
                    Ok(signal) => {
                        tracing::info!(%signal, "Shutdown signal received");
                        c.cancel();
                    }
                    Err(e) => tracing::error!(error = %e, "Cannot listen for shutdown signals"),
                }
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    // 3. Facility components first, then the application's
    let mut protos = ProtoComponents::new();
    let enabled = opts.facilities.initialise(opts.config.as_ref(), &mut protos)?;
    tracing::debug!(facilities = ?enabled, "Facilities initialised");
    protos.extend(opts.components);

    // 4. Populate
    let container = ComponentContainer::populate(protos, opts.config.as_ref())?
        .with_drain_policy(opts.drain);
    let container = Arc::new(container);

    // 5. Start
    if let Err(err) = container.start_components() {
        tracing::error!(error = %err, "Startup failed; stopping components");
        shutdown_on_blocking_thread(Arc::clone(&container)).await?;
        return Err(err.into());
    }

    tracing::info!(
        startup_time = ?started_at.elapsed(),
        components = container.index().len(),
        "Ready"
    );

    // 6. Wait, then shut down off the async workers
    cancel.cancelled().await;
    let report = shutdown_on_blocking_thread(container).await?;
    if !report.failed.is_empty() {
        tracing::warn!(failed = ?report.failed, "Some components failed to stop");
    }
    Ok(())
}

async fn shutdown_on_blocking_thread(
    container: Arc<ComponentContainer>,
) -> anyhow::Result<ShutdownReport> {
    let report = tokio::task::spawn_blocking(move || container.shutdown_components()).await??;
    Ok(report)
}
