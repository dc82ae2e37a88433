//! Start, drain and stop ordering, plus decorator and discovery behaviour.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use wirekit::{
    decorator_fn, Component, ComponentContainer, ComponentIndex, ComponentLogger,
    ComponentLoggerDecorator, ComponentLoggerManager, ComponentRecord, ConfigAccessor,
    ContainerError, Decorator, Dep, DrainPolicy, FacilitiesInitialiser, IndexAware,
    LifecycleState, LoggerAware, ProtoComponents, Readiness, Startable, Stoppable,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}

fn fast_drain(max_attempts: u32) -> DrainPolicy {
    DrainPolicy {
        interval: Duration::from_millis(1),
        max_attempts,
        warn_after: 1,
    }
}

// ---------- Recorder: journals every lifecycle call ----------

#[derive(Component)]
#[component(capabilities = [Startable, Stoppable])]
struct Recorder {
    name: &'static str,
    journal: Journal,
    fail_start: bool,
    fail_stop: bool,
    not_ready_polls: AtomicU32,
}

impl Recorder {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: Arc::clone(journal),
            fail_start: false,
            fail_stop: false,
            not_ready_polls: AtomicU32::new(0),
        }
    }

    fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    fn busy_for(self, polls: u32) -> Self {
        self.not_ready_polls.store(polls, Ordering::SeqCst);
        self
    }

    fn record(&self, event: &str) {
        self.journal.lock().push(format!("{event}:{}", self.name));
    }
}

impl Startable for Recorder {
    fn start_component(&self) -> anyhow::Result<()> {
        self.record("start");
        if self.fail_start {
            anyhow::bail!("{} refused to start", self.name);
        }
        Ok(())
    }
}

impl Stoppable for Recorder {
    fn prepare_to_stop(&self) {
        self.record("prepare");
    }

    fn ready_to_stop(&self) -> Readiness {
        let remaining = self.not_ready_polls.load(Ordering::SeqCst);
        if remaining == 0 {
            return Readiness::Ready;
        }
        self.not_ready_polls.store(remaining - 1, Ordering::SeqCst);
        self.record("busy");
        Readiness::not_ready("requests in flight")
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.record("stop");
        if self.fail_stop {
            anyhow::bail!("{} failed to stop", self.name);
        }
        Ok(())
    }
}

fn container_of(recorders: Vec<Recorder>, drain: DrainPolicy) -> ComponentContainer {
    let mut protos = ProtoComponents::new();
    for recorder in recorders {
        let name = recorder.name;
        protos.wrap_and_add_proto(name, Arc::new(recorder));
    }
    ComponentContainer::populate(protos, &ConfigAccessor::empty())
        .unwrap()
        .with_drain_policy(drain)
}

// ---------- Start ----------

#[test]
fn start_stops_at_the_first_failure() {
    let log = journal();
    let container = container_of(
        vec![
            Recorder::new("s1", &log),
            Recorder::new("s2", &log).failing_start(),
            Recorder::new("s3", &log),
        ],
        fast_drain(1),
    );

    match container.start_components().unwrap_err() {
        ContainerError::Start { component, .. } => assert_eq!(component, "s2"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(entries(&log), vec!["start:s1", "start:s2"]);
    assert_eq!(container.state(), LifecycleState::FailedAt(1));

    assert!(matches!(
        container.start_components(),
        Err(ContainerError::InvalidState { .. })
    ));
}

#[test]
fn start_runs_in_registration_order() {
    let log = journal();
    let container = container_of(
        vec![Recorder::new("b", &log), Recorder::new("a", &log), Recorder::new("c", &log)],
        fast_drain(1),
    );
    container.start_components().unwrap();
    assert_eq!(entries(&log), vec!["start:b", "start:a", "start:c"]);
    assert_eq!(container.state(), LifecycleState::Started);
}

// ---------- Shutdown ----------

#[test]
fn stop_waits_for_readiness_then_stops_everything() {
    let log = journal();
    let container = container_of(
        vec![Recorder::new("x", &log).busy_for(2), Recorder::new("y", &log)],
        fast_drain(10),
    );
    container.start_components().unwrap();
    log.lock().clear();

    let report = container.shutdown_components().unwrap();
    assert!(report.drained);
    assert_eq!(report.attempts, 3);
    assert!(report.failed.is_empty());

    assert_eq!(
        entries(&log),
        vec![
            "prepare:x",
            "prepare:y",
            "busy:x",
            "busy:x",
            "stop:x",
            "stop:y"
        ]
    );
    assert_eq!(container.state(), LifecycleState::Stopped);
}

#[test]
fn exhausted_drain_still_stops_everything() {
    let log = journal();
    let container = container_of(
        vec![
            Recorder::new("x", &log).busy_for(100),
            Recorder::new("y", &log).failing_stop(),
            Recorder::new("z", &log),
        ],
        fast_drain(3),
    );

    let report = container.shutdown_components().unwrap();
    assert!(!report.drained);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.failed, vec!["y".to_owned()]);

    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| *e == "busy:x").count(), 3);
    for name in ["x", "y", "z"] {
        assert!(log.contains(&format!("stop:{name}")), "{name} not stopped");
    }
}

#[test]
fn second_shutdown_is_rejected() {
    let log = journal();
    let container = container_of(vec![Recorder::new("x", &log)], fast_drain(1));

    container.shutdown_components().unwrap();
    assert!(matches!(
        container.shutdown_components(),
        Err(ContainerError::ShutdownInProgress)
    ));
    assert_eq!(entries(&log).iter().filter(|e| *e == "stop:x").count(), 1);
}

#[test]
fn concurrent_shutdowns_enter_once() {
    let log = journal();
    let container = Arc::new(container_of(
        vec![Recorder::new("x", &log).busy_for(3)],
        fast_drain(10),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let c = Arc::clone(&container);
            std::thread::spawn(move || c.shutdown_components().is_ok())
        })
        .collect();
    let entered = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(entered, 1);
    assert_eq!(entries(&log).iter().filter(|e| *e == "stop:x").count(), 1);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn drain_warnings_start_after_warn_after_and_carry_the_reason() {
    use tracing_subscriber::layer::SubscriberExt;

    let log = journal();
    let container = container_of(
        vec![Recorder::new("x", &log).busy_for(3)],
        DrainPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 5,
            warn_after: 2,
        },
    );

    let out = Captured::default();
    let writer = out.clone();
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .with_filter(LevelFilter::WARN),
    );
    let report = tracing::subscriber::with_default(subscriber, || {
        container.shutdown_components().unwrap()
    });
    assert!(report.drained);
    assert_eq!(report.attempts, 4);

    let text = String::from_utf8(out.0.lock().clone()).unwrap();
    let warnings: Vec<&str> = text
        .lines()
        .filter(|l| l.contains("Component not ready to stop"))
        .collect();
    assert_eq!(warnings.len(), 1, "{text}");
    assert!(warnings[0].contains("attempt=3"), "{text}");
    assert!(warnings[0].contains("requests in flight"), "{text}");
    assert!(warnings[0].contains("component=x"), "{text}");
}

// ---------- Decorators ----------

trait Labelled: Send + Sync {
    fn label(&self) -> &Dep<String>;
}

#[derive(Component, Default)]
#[component(capabilities = [Labelled])]
struct Widget {
    label: Dep<String>,
}

impl Labelled for Widget {
    fn label(&self) -> &Dep<String> {
        &self.label
    }
}

#[derive(Component, Default)]
struct Plain;

fn labelling(text: &'static str, hits: &Arc<AtomicU32>) -> impl Decorator + 'static {
    let hits = Arc::clone(hits);
    decorator_fn(
        |c: &ComponentRecord| {
            c.capability::<dyn Labelled>()
                .is_some_and(|l| !l.label().is_set())
        },
        move |c: &ComponentRecord, _index: &Arc<ComponentIndex>| {
            if let Some(l) = c.capability::<dyn Labelled>() {
                if l.label().set_if_unset(Arc::new(text.to_owned())) {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            }
        },
    )
}

/// A decorator that is itself a component; remembers who it looked at.
#[derive(Component, Default)]
#[component(capabilities = [Decorator])]
struct Inspector {
    seen: Mutex<Vec<String>>,
}

impl Decorator for Inspector {
    fn of_interest(&self, component: &ComponentRecord) -> bool {
        self.seen.lock().push(component.name().to_owned());
        false
    }

    fn decorate_component(&self, _component: &ComponentRecord, _index: &Arc<ComponentIndex>) {}
}

#[test]
fn first_applicable_decorator_wins() {
    let hits = Arc::new(AtomicU32::new(0));
    let widget = Arc::new(Widget::default());
    let preset = Arc::new(Widget::default());
    preset.label.set(Arc::new("preset".to_owned()));

    let mut protos = ProtoComponents::new();
    protos.wrap_and_add_proto("widget", widget.clone());
    protos.wrap_and_add_proto("preset", preset.clone());
    protos.wrap_and_add_proto("plain", Arc::new(Plain));
    protos.add_decorator("first", labelling("first", &hits));
    protos.add_decorator("second", labelling("second", &hits));

    let container = ComponentContainer::populate(protos, &ConfigAccessor::empty()).unwrap();

    assert_eq!(widget.label.get().as_deref().map(String::as_str), Some("first"));
    assert_eq!(preset.label.get().as_deref().map(String::as_str), Some("preset"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        container.decorators(),
        &["wirekitIndexDecorator", "first", "second"].map(str::to_owned)
    );
}

#[test]
fn component_decorators_run_after_builder_ones_and_skip_themselves() {
    let inspector = Arc::new(Inspector::default());
    let mut protos = ProtoComponents::new();
    protos.wrap_and_add_proto("a", Arc::new(Plain));
    protos.wrap_and_add_proto("inspector", inspector.clone());
    protos.wrap_and_add_proto("b", Arc::new(Plain));
    protos.add_decorator("builder", decorator_fn(|_: &ComponentRecord| false, |_: &ComponentRecord, _: &Arc<ComponentIndex>| {}));

    let container = ComponentContainer::populate(protos, &ConfigAccessor::empty()).unwrap();

    assert_eq!(*inspector.seen.lock(), vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(
        container.decorators(),
        &["wirekitIndexDecorator", "builder", "inspector"].map(str::to_owned)
    );
}

#[test]
fn builder_decorator_sharing_a_component_name_still_decorates_it() {
    let hits = Arc::new(AtomicU32::new(0));
    let widget = Arc::new(Widget::default());
    let mut protos = ProtoComponents::new();
    protos.wrap_and_add_proto("labeller", widget.clone());
    protos.add_decorator("labeller", labelling("named", &hits));

    ComponentContainer::populate(protos, &ConfigAccessor::empty()).unwrap();

    assert_eq!(widget.label.get().as_deref().map(String::as_str), Some("named"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ---------- Discovery ----------

trait StatusSource: Send + Sync {
    fn status(&self) -> &'static str;
}

#[derive(Component)]
#[component(capabilities = [StatusSource])]
struct Source {
    status: &'static str,
}

impl StatusSource for Source {
    fn status(&self) -> &'static str {
        self.status
    }
}

#[derive(Component, Default)]
#[component(capabilities = [IndexAware, Startable])]
struct Board {
    index: Dep<ComponentIndex>,
    collected: Mutex<Vec<&'static str>>,
}

impl IndexAware for Board {
    fn index_slot(&self) -> &Dep<ComponentIndex> {
        &self.index
    }
}

impl Startable for Board {
    fn start_component(&self) -> anyhow::Result<()> {
        let index = self
            .index
            .get()
            .ok_or_else(|| anyhow::anyhow!("index not handed over"))?;
        let found = index.find_by_capability::<dyn StatusSource>();
        *self.collected.lock() = found.iter().map(|s| s.status()).collect();
        Ok(())
    }
}

#[test]
fn capability_discovery_is_ordered_and_exact() {
    let board = Arc::new(Board::default());
    let mut protos = ProtoComponents::new();
    protos.wrap_and_add_proto("db", Arc::new(Source { status: "db ok" }));
    protos.wrap_and_add_proto("plain", Arc::new(Plain));
    protos.wrap_and_add_proto("board", board.clone());
    protos.wrap_and_add_proto("cache", Arc::new(Source { status: "cache ok" }));

    let container = ComponentContainer::populate(protos, &ConfigAccessor::empty()).unwrap();
    container.start_components().unwrap();

    assert_eq!(*board.collected.lock(), vec!["db ok", "cache ok"]);
    let names: Vec<&str> = container
        .index()
        .named_by_capability::<dyn StatusSource>()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["db", "cache"]);
}

// ---------- Application logging ----------

#[derive(Component, Default)]
#[component(capabilities = [LoggerAware])]
struct Chatty {
    logger: Dep<ComponentLogger>,
}

impl LoggerAware for Chatty {
    fn logger_slot(&self) -> &Dep<ComponentLogger> {
        &self.logger
    }
}

#[test]
fn logging_facility_hands_out_named_loggers() {
    let config = ConfigAccessor::new(json!({
        "facilities": { "ApplicationLogging": true },
        "applicationLogger": {
            "defaultLogLevel": "WARN",
            "componentLogLevels": { "verbose": "TRACE" }
        }
    }));
    let quiet = Arc::new(Chatty::default());
    let verbose = Arc::new(Chatty::default());

    let mut protos = ProtoComponents::new();
    FacilitiesInitialiser::discover()
        .initialise(&config, &mut protos)
        .unwrap();
    protos.wrap_and_add_proto("quiet", quiet.clone());
    protos.wrap_and_add_proto("verbose", verbose.clone());

    ComponentContainer::populate(protos, &config).unwrap();

    let quiet_logger = quiet.logger.get().unwrap();
    assert_eq!(quiet_logger.name(), "quiet");
    assert_eq!(quiet_logger.threshold(), LevelFilter::WARN);
    assert_eq!(verbose.logger.get().unwrap().threshold(), LevelFilter::TRACE);
}

#[test]
fn a_logger_set_by_hand_is_left_alone() {
    let manager = Arc::new(ComponentLoggerManager::new(LevelFilter::INFO, HashMap::new()));
    let own = Arc::new(ComponentLogger::new("custom", LevelFilter::ERROR));
    let chatty = Arc::new(Chatty::default());
    chatty.logger.set(own.clone());

    let mut protos = ProtoComponents::new();
    protos.wrap_and_add_proto("chatty", chatty.clone());
    protos.add_decorator("logging", ComponentLoggerDecorator::new(manager));

    ComponentContainer::populate(protos, &ConfigAccessor::empty()).unwrap();
    assert!(Arc::ptr_eq(&chatty.logger.get().unwrap(), &own));
}
