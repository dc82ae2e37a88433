use crate::config::{LogSection, LoggingConfig};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, util::SubscriberInitExt, Layer};

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

// Keep the non-blocking console worker alive for the whole process.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// `None` for an empty or unrecognised label.
fn section_level(label: &str) -> Option<LevelFilter> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    wirekit::parse_level(label)
}

/// True if `target` is `prefix` itself or a module below it.
fn matches_target_prefix(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ================= rotating writer for files =================

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// A file handle that may be absent; writes to it are dropped.
struct RoutedWriter(Option<RotWriter>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes records to per-target files, longest matching prefix first, and
/// everything else to the default file if there is one.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<RotWriter>,
    by_prefix: Vec<(String, RotWriter)>,
}

impl FileRouter {
    fn build(cfg: &LoggingConfig, base_dir: &Path) -> Self {
        let mut router = FileRouter::default();
        for (name, section) in cfg {
            let Some(writer) = open_section_file(name, section, base_dir) else {
                continue;
            };
            if name == DEFAULT_SECTION {
                router.default = Some(writer);
            } else {
                router.by_prefix.push((name.clone(), writer));
            }
        }
        router
            .by_prefix
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        router
    }

    fn resolve_for(&self, target: &str) -> Option<RotWriter> {
        self.by_prefix
            .iter()
            .find(|(prefix, _)| matches_target_prefix(target, prefix))
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.resolve_for(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn open_section_file(name: &str, section: &LogSection, base_dir: &Path) -> Option<RotWriter> {
    if section.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!(
                "Failed to init log file for section '{name}': {} ({e})",
                log_path.display()
            );
            return None;
        }
    }

    // Prefer a file count when given, else an age limit.
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(i64::from(
            section.max_age_days.unwrap_or(1),
        ))),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Some(RotWriter(Arc::new(Mutex::new(rot))))
}

// ================= targets =================

#[derive(Clone, Copy)]
enum Sink {
    Console,
    File { has_default_file: bool },
}

fn build_targets(cfg: &LoggingConfig, sink: Sink) -> Targets {
    let default_section = cfg.get(DEFAULT_SECTION);
    let default_level = match sink {
        Sink::Console => default_section
            .and_then(|s| section_level(&s.console_level))
            .unwrap_or(LevelFilter::INFO),
        Sink::File { has_default_file } => default_section
            .and_then(|s| section_level(&s.file_level))
            .unwrap_or(if has_default_file {
                LevelFilter::INFO
            } else {
                LevelFilter::OFF
            }),
    };

    let targets = cfg
        .iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_SECTION)
        .filter_map(|(name, section)| {
            let level = match sink {
                Sink::Console => section_level(&section.console_level),
                // a section only feeds the file sink when it names a file
                Sink::File { .. } if section.file.trim().is_empty() => None,
                Sink::File { .. } => section_level(&section.file_level),
            }?;
            Some((name.clone(), level))
        })
        .fold(Targets::new().with_default(default_level), |targets, (name, level)| {
            targets.with_target(name, level)
        });

    // Component loggers filter by their own thresholds
    // (`applicationLogger.componentLogLevels`); an explicit section still wins.
    let sink_active = !matches!(sink, Sink::File { .. }) || default_level != LevelFilter::OFF;
    if sink_active && !cfg.contains_key(wirekit::COMPONENT_LOG_TARGET) {
        targets.with_target(wirekit::COMPONENT_LOG_TARGET, LevelFilter::TRACE)
    } else {
        targets
    }
}

// ================= public init =================

/// Install the global subscriber: a human-readable console layer on stderr and,
/// when any section names a file, a JSON layer writing to rotating files.
/// Relative file paths resolve against `base_dir`. `RUST_LOG`, when set, caps
/// both layers.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    // Bridge `log` → `tracing` before installing the subscriber.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let router = FileRouter::build(cfg, base_dir);
    let console_targets = build_targets(cfg, Sink::Console);
    let file_targets = build_targets(
        cfg,
        Sink::File {
            has_default_file: router.default.is_some(),
        },
    );

    let env = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_targets)
    });

    let subscriber = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer);

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn section(console: &str, file: &str, file_level: &str) -> LogSection {
        LogSection {
            file: file.to_owned(),
            file_level: file_level.to_owned(),
            ..LogSection::console(console)
        }
    }

    #[test]
    fn prefix_matching_respects_module_boundaries() {
        assert!(matches_target_prefix("wirekit", "wirekit"));
        assert!(matches_target_prefix("wirekit::lifecycle", "wirekit"));
        assert!(!matches_target_prefix("wirekit_bootstrap", "wirekit"));
        assert!(!matches_target_prefix("other", "wirekit"));
    }

    #[test]
    fn console_targets_follow_sections() {
        let cfg: LoggingConfig = HashMap::from([
            ("default".to_owned(), LogSection::console("warn")),
            ("wirekit".to_owned(), LogSection::console("trace")),
            ("noisy".to_owned(), LogSection::console("off")),
        ]);
        let targets = build_targets(&cfg, Sink::Console);

        assert!(targets.would_enable("wirekit::container", &tracing::Level::TRACE));
        assert!(targets.would_enable("app", &tracing::Level::WARN));
        assert!(!targets.would_enable("app", &tracing::Level::INFO));
        assert!(!targets.would_enable("noisy", &tracing::Level::ERROR));
    }

    #[test]
    fn file_targets_are_off_without_files() {
        let cfg: LoggingConfig = HashMap::from([
            ("default".to_owned(), LogSection::console("info")),
            ("wirekit".to_owned(), section("info", "", "debug")),
        ]);
        let targets = build_targets(
            &cfg,
            Sink::File {
                has_default_file: false,
            },
        );
        assert!(!targets.would_enable("wirekit", &tracing::Level::ERROR));
        assert!(!targets.would_enable("app", &tracing::Level::ERROR));
    }

    #[test]
    fn router_picks_the_longest_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg: LoggingConfig = HashMap::from([
            ("default".to_owned(), section("info", "logs/app.log", "info")),
            ("wirekit".to_owned(), section("info", "logs/wirekit.log", "debug")),
            (
                "wirekit::lifecycle".to_owned(),
                section("info", "logs/lifecycle.log", "debug"),
            ),
        ]);
        let router = FileRouter::build(&cfg, tmp.path());

        assert!(tmp.path().join("logs").is_dir());
        assert_eq!(router.by_prefix[0].0, "wirekit::lifecycle");
        assert_eq!(router.by_prefix[1].0, "wirekit");

        let lifecycle = router.resolve_for("wirekit::lifecycle").unwrap();
        assert!(Arc::ptr_eq(&lifecycle.0, &router.by_prefix[0].1 .0));
        let other = router.resolve_for("app::main").unwrap();
        assert!(Arc::ptr_eq(&other.0, &router.default.as_ref().unwrap().0));
    }

    #[test]
    fn empty_router_drops_writes() {
        let router = FileRouter::default();
        assert!(router.is_empty());
        let mut writer = RoutedWriter(router.resolve_for("anything"));
        assert_eq!(writer.write(b"dropped").unwrap(), 7);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn component_overrides_reach_the_console() {
        use tracing_subscriber::layer::SubscriberExt;
        use wirekit::ComponentLoggerManager;

        let cfg: LoggingConfig = HashMap::from([
            ("default".to_owned(), LogSection::console("info")),
            ("wirekit".to_owned(), LogSection::console("info")),
        ]);
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .with_filter(build_targets(&cfg, Sink::Console)),
        );

        let manager = ComponentLoggerManager::new(
            LevelFilter::INFO,
            HashMap::from([("ticker".to_owned(), LevelFilter::DEBUG)]),
        );
        let ticker = manager.create_logger("ticker");
        let greeter = manager.create_logger("greeter");

        tracing::subscriber::with_default(subscriber, || {
            ticker.debug("tick 1");
            greeter.debug("hello at debug");
            greeter.info("hello at info");
            tracing::debug!(target: "wirekit::container", "framework debug");
        });

        let out = captured.text();
        assert!(out.contains("tick 1"), "{out}");
        assert!(out.contains("hello at info"), "{out}");
        assert!(!out.contains("hello at debug"), "{out}");
        assert!(!out.contains("framework debug"), "{out}");
    }

    #[test]
    fn explicit_component_section_wins() {
        let cfg: LoggingConfig = HashMap::from([
            ("default".to_owned(), LogSection::console("info")),
            (wirekit::COMPONENT_LOG_TARGET.to_owned(), LogSection::console("warn")),
        ]);
        let targets = build_targets(&cfg, Sink::Console);
        assert!(!targets.would_enable(wirekit::COMPONENT_LOG_TARGET, &tracing::Level::INFO));
        assert!(targets.would_enable(wirekit::COMPONENT_LOG_TARGET, &tracing::Level::WARN));
    }
}
