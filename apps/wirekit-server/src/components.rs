//! Demo component graph: a greeter and a ticker that depend on each other,
//! plus a status board that discovers every `StatusSource` at start.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use wirekit::{
    Component, ComponentIndex, ComponentLogger, Dep, FacilityBuilder, FacilityContext,
    FacilityRegistration, IndexAware, LoggerAware, ProtoComponents, Readiness, Setting,
    Startable, Stoppable,
};

const DEFAULT_PERIOD_MS: u64 = 1000;

/// Anything that can report a one-line status.
pub trait StatusSource: Send + Sync {
    fn status(&self) -> String;
}

/// Log through the component logger when one was injected.
fn log_info(logger: &Dep<ComponentLogger>, message: impl std::fmt::Display) {
    match logger.get() {
        Some(logger) => logger.info(message),
        None => tracing::info!("{message}"),
    }
}

#[derive(Component, Default)]
#[component(capabilities = [StatusSource])]
pub struct Greeter {
    #[config]
    greeting: Setting<String>,
    #[config]
    audience: Setting<String>,
    #[inject]
    ticker: Dep<Ticker>,
}

impl Greeter {
    pub fn greeting(&self) -> String {
        format!(
            "{}, {}!",
            self.greeting.get_or("Hello".to_owned()),
            self.audience.get_or("world".to_owned())
        )
    }
}

impl StatusSource for Greeter {
    fn status(&self) -> String {
        let ticks = self.ticker.get().map_or(0, |t| t.ticks());
        format!("'{}' after {ticks} ticks", self.greeting())
    }
}

/// Ticks on a background thread and greets on every tick.
#[derive(Component, Default)]
#[component(capabilities = [Startable, Stoppable, LoggerAware, StatusSource])]
pub struct Ticker {
    #[config]
    period_ms: Setting<u64>,
    #[inject]
    greeter: Dep<Greeter>,
    logger: Dep<ComponentLogger>,
    ticks: Arc<AtomicU64>,
    stopping: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl LoggerAware for Ticker {
    fn logger_slot(&self) -> &Dep<ComponentLogger> {
        &self.logger
    }
}

impl Startable for Ticker {
    fn start_component(&self) -> anyhow::Result<()> {
        let greeter = self
            .greeter
            .get()
            .ok_or_else(|| anyhow::anyhow!("greeter was not wired"))?;
        let period = Duration::from_millis(self.period_ms.get_or(DEFAULT_PERIOD_MS));
        let ticks = Arc::clone(&self.ticks);
        let stopping = Arc::clone(&self.stopping);
        let logger = self.logger.get();

        let handle = std::thread::Builder::new()
            .name("ticker".to_owned())
            .spawn(move || {
                while !stopping.load(Ordering::Acquire) {
                    let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(logger) = &logger {
                        logger.debug(format!("tick {n}: {}", greeter.greeting()));
                    }
                    std::thread::park_timeout(period);
                }
            })?;
        *self.worker.lock() = Some(handle);

        log_info(&self.logger, format!("Ticking every {period:?}"));
        Ok(())
    }
}

impl Stoppable for Ticker {
    fn prepare_to_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().as_ref() {
            handle.thread().unpark();
        }
    }

    fn ready_to_stop(&self) -> Readiness {
        match self.worker.lock().as_ref() {
            Some(handle) if !handle.is_finished() => Readiness::not_ready("tick in progress"),
            _ => Readiness::Ready,
        }
    }

    fn stop(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.worker.lock().take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("ticker thread panicked"))?;
        }
        log_info(&self.logger, format!("Stopped after {} ticks", self.ticks()));
        Ok(())
    }
}

impl StatusSource for Ticker {
    fn status(&self) -> String {
        format!("{} ticks", self.ticks())
    }
}

/// Logs the status of every `StatusSource` in the container once started.
#[derive(Component, Default)]
#[component(capabilities = [Startable, IndexAware, LoggerAware])]
pub struct StatusBoard {
    index: Dep<ComponentIndex>,
    logger: Dep<ComponentLogger>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let Some(index) = self.index.get() else {
            return Vec::new();
        };
        index
            .named_by_capability::<dyn StatusSource>()
            .into_iter()
            .map(|(name, source)| (name.to_owned(), source.status()))
            .collect()
    }
}

impl IndexAware for StatusBoard {
    fn index_slot(&self) -> &Dep<ComponentIndex> {
        &self.index
    }
}

impl LoggerAware for StatusBoard {
    fn logger_slot(&self) -> &Dep<ComponentLogger> {
        &self.logger
    }
}

impl Startable for StatusBoard {
    fn start_component(&self) -> anyhow::Result<()> {
        for (name, status) in self.snapshot() {
            log_info(&self.logger, format!("{name}: {status}"));
        }
        Ok(())
    }
}

/// Contributes the status board when `facilities.StatusBoard` is on.
pub struct StatusBoardFacility;

impl FacilityBuilder for StatusBoardFacility {
    fn facility_name(&self) -> &'static str {
        "StatusBoard"
    }

    fn depends_on_facilities(&self) -> &'static [&'static str] {
        &["ApplicationLogging"]
    }

    fn build_and_register(
        &self,
        _ctx: &FacilityContext<'_>,
        protos: &mut ProtoComponents,
    ) -> anyhow::Result<()> {
        protos.wrap_and_add_proto("statusBoard", Arc::new(StatusBoard::default()));
        Ok(())
    }
}

fn status_board_facility() -> Box<dyn FacilityBuilder> {
    Box::new(StatusBoardFacility)
}

inventory::submit! {
    FacilityRegistration(status_board_facility)
}

/// The demo graph. `greeter` and `ticker` depend on each other.
pub fn build() -> ProtoComponents {
    let mut protos = ProtoComponents::new();
    protos
        .wrap_and_add_proto("greeter", Arc::new(Greeter::default()))
        .add_dependency("ticker", "ticker")
        .add_config_promise("greeting", "demo.greeter.greeting")
        .add_config_promise("audience", "demo.greeter.audience");
    protos
        .wrap_and_add_proto("ticker", Arc::new(Ticker::default()))
        .add_dependency("greeter", "greeter")
        .add_config_promise("periodMs", "demo.ticker.periodMs");
    protos
}
