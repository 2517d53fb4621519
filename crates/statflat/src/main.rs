//! statflat - run host metric collectors once and print flat metrics.
//!
//! Each selected collector polls its source (ceph admin sockets, `ceph osd
//! pool stats`, `/proc/uptime`), flattens the payload into dotted names and
//! publishes the values. Metrics go to stdout, logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use statflat_core::collector::{
    CephCollector, CephPoolStatsCollector, Collector, CommandRunner, FileSystem, RealFs,
    RealRunner, UptimeCollector,
};
use statflat_core::config::{CounterMode, PublishConfig, Settings};
use statflat_core::counters::CounterTracker;
use statflat_core::metric::{LineSink, MemorySink, MetricSink};

/// Collectors selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CollectorName {
    Ceph,
    Cephpoolstats,
    Uptime,
}

/// Output format for published metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Graphite plaintext: `name value timestamp`.
    Line,
    /// JSON array of metric objects.
    Json,
}

/// Publishing of monotonic ceph counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CounterModeArg {
    /// Running totals.
    Raw,
    /// Change since the previous run (see --state-file).
    Delta,
}

impl From<CounterModeArg> for CounterMode {
    fn from(arg: CounterModeArg) -> Self {
        match arg {
            CounterModeArg::Raw => CounterMode::Raw,
            CounterModeArg::Delta => CounterMode::Delta,
        }
    }
}

/// Run host metric collectors once and print flat metrics.
#[derive(Parser)]
#[command(
    name = "statflat",
    about = "Run host metric collectors once and print flat metrics",
    version
)]
struct Args {
    /// Collectors to run (comma separated).
    #[arg(
        short,
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "ceph,cephpoolstats,uptime"
    )]
    collectors: Vec<CollectorName>,

    /// JSON settings file. Command-line options override its values.
    #[arg(long, env = "STATFLAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the `ceph` executable.
    #[arg(long, env = "STATFLAT_CEPH_BINARY")]
    ceph_binary: Option<String>,

    /// Directory holding ceph admin sockets.
    #[arg(long, env = "STATFLAT_SOCKET_PATH")]
    socket_path: Option<String>,

    /// Extension of admin socket file names.
    #[arg(long, env = "STATFLAT_SOCKET_EXT")]
    socket_ext: Option<String>,

    /// Ceph cluster name for pool statistics.
    #[arg(long, env = "STATFLAT_CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// Path to /proc filesystem.
    #[arg(long, env = "STATFLAT_PROC_PATH")]
    proc_path: Option<String>,

    /// Decimal places used when printing values.
    #[arg(long)]
    precision: Option<u32>,

    /// How monotonic ceph counters are published.
    #[arg(long, value_enum)]
    counters: Option<CounterModeArg>,

    /// File keeping counter samples between runs in delta mode.
    #[arg(long, env = "STATFLAT_STATE_FILE", value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Line)]
    format: OutputFormat,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber on stderr with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("statflat={}", level).parse().unwrap())
        .add_directive(format!("statflat_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Loads settings from the optional file and applies command-line overrides.
fn load_settings(args: &Args) -> Result<Settings, statflat_core::config::ConfigError> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    apply_overrides(&mut settings, args);
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(ref binary) = args.ceph_binary {
        settings.ceph.ceph_binary = binary.clone();
        settings.cephpoolstats.ceph_binary = binary.clone();
    }
    if let Some(ref path) = args.socket_path {
        settings.ceph.socket_path = path.clone();
    }
    if let Some(ref ext) = args.socket_ext {
        settings.ceph.socket_ext = ext.clone();
    }
    if let Some(ref name) = args.cluster_name {
        settings.cephpoolstats.cluster_name = name.clone();
    }
    if let Some(ref path) = args.proc_path {
        settings.uptime.proc_path = path.clone();
    }
    if let Some(precision) = args.precision {
        settings.publish.precision = precision;
    }
    if let Some(mode) = args.counters {
        settings.publish.counters = mode.into();
    }
    if let Some(ref path) = args.state_file {
        settings.publish.state_file = Some(path.clone());
    }
}

/// Loads counter samples saved by the previous run. Only delta mode keeps
/// state; a missing or unreadable file starts from scratch.
fn load_counter_state(publish: &PublishConfig) -> CounterTracker {
    match (&publish.state_file, publish.counters) {
        (Some(path), CounterMode::Delta) => CounterTracker::load(path).unwrap_or_else(|e| {
            warn!("Ignoring counter state {}: {}", path.display(), e);
            CounterTracker::new()
        }),
        _ => CounterTracker::new(),
    }
}

/// Saves the counter samples of the finished cycle for the next run.
fn save_counter_state(collectors: &[Box<dyn Collector>], publish: &PublishConfig) {
    let Some(path) = &publish.state_file else {
        return;
    };
    let Some(counters) = collectors.iter().find_map(|c| c.counters()) else {
        return;
    };
    match counters.save(path) {
        Ok(()) => debug!("Saved {} counter samples to {}", counters.len(), path.display()),
        Err(e) => error!("Failed to save counter state {}: {}", path.display(), e),
    }
}

fn ceph_collector<F: FileSystem, R: CommandRunner>(
    fs: F,
    runner: R,
    settings: &Settings,
    counters: CounterTracker,
) -> CephCollector<F, R> {
    CephCollector::new(fs, runner, settings.ceph.clone())
        .with_precision(settings.publish.precision)
        .with_counter_mode(settings.publish.counters)
        .with_counters(counters)
}

/// Builds the selected collectors against the real system.
fn build_collectors(
    names: &[CollectorName],
    settings: &Settings,
    mut counters: CounterTracker,
) -> Vec<Box<dyn Collector>> {
    let precision = settings.publish.precision;
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    for name in names {
        if collectors.iter().any(|c| c.name() == collector_name(*name)) {
            continue;
        }
        let collector: Box<dyn Collector> = match name {
            CollectorName::Ceph => Box::new(ceph_collector(
                RealFs::new(),
                RealRunner::new(),
                settings,
                std::mem::take(&mut counters),
            )),
            CollectorName::Cephpoolstats => Box::new(
                CephPoolStatsCollector::new(RealRunner::new(), settings.cephpoolstats.clone())
                    .with_precision(precision),
            ),
            CollectorName::Uptime => Box::new(
                UptimeCollector::new(RealFs::new(), settings.uptime.clone())
                    .with_precision(precision),
            ),
        };
        collectors.push(collector);
    }
    collectors
}

fn collector_name(name: CollectorName) -> &'static str {
    match name {
        CollectorName::Ceph => "ceph",
        CollectorName::Cephpoolstats => "cephpoolstats",
        CollectorName::Uptime => "uptime",
    }
}

/// Runs one collection cycle. A failing collector is logged and the
/// remaining collectors still run. Returns the total number of metrics.
fn run_cycle(collectors: &mut [Box<dyn Collector>], sink: &mut dyn MetricSink) -> usize {
    let mut total = 0;
    for collector in collectors.iter_mut() {
        match collector.collect(sink) {
            Ok(count) => {
                debug!("{}: {} metrics", collector.name(), count);
                total += count;
            }
            Err(e) => error!("{}: collection failed: {}", collector.name(), e),
        }
    }
    total
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!(
        "statflat {} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("STATFLAT_GIT_SHA")
    );

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("Settings: {:?}", settings);

    if settings.publish.counters == CounterMode::Delta && settings.publish.state_file.is_none() {
        info!("Delta counters without a state file: this run only records samples");
    }
    let counters = load_counter_state(&settings.publish);
    let mut collectors = build_collectors(&args.collectors, &settings, counters);
    let stdout = io::stdout();

    let total = match args.format {
        OutputFormat::Line => {
            let mut sink = LineSink::new(stdout.lock());
            let total = run_cycle(&mut collectors, &mut sink);
            if sink.write_errors() > 0 {
                error!("{} metrics could not be written", sink.write_errors());
            }
            total
        }
        OutputFormat::Json => {
            let mut sink = MemorySink::new();
            let total = run_cycle(&mut collectors, &mut sink);
            let mut out = stdout.lock();
            if let Err(e) = serde_json::to_writer_pretty(&mut out, &sink.metrics)
                .map_err(io::Error::from)
                .and_then(|()| writeln!(out))
            {
                error!("Failed to write metrics: {}", e);
            }
            total
        }
    };

    if settings.publish.counters == CounterMode::Delta {
        save_counter_state(&collectors, &settings.publish);
    }

    info!("Published {} metrics from {} collectors", total, collectors.len());
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statflat_core::collector::{CollectError, MockFs, MockRunner};
    use statflat_core::config::UptimeConfig;
    use statflat_core::metric::MetricKind;

    const OSD_SOCKET: &str = "/var/run/ceph/ceph-osd.0.asok";

    fn osd_mocks(dump: serde_json::Value) -> (MockFs, MockRunner) {
        let mut fs = MockFs::new();
        fs.add_socket("/var/run/ceph", "ceph-osd.0.asok");

        let schema = json!({
            "osd": {
                "op_r": {"type": 10},
                "op_w": {"type": 10},
                "op_latency": {"type": 5}
            }
        });
        let mut runner = MockRunner::new();
        runner.respond(
            &["/usr/bin/ceph", "--admin-daemon", OSD_SOCKET, "perf", "dump"],
            dump.to_string(),
        );
        runner.respond(
            &["/usr/bin/ceph", "--admin-daemon", OSD_SOCKET, "perf", "schema"],
            schema.to_string(),
        );
        (fs, runner)
    }

    struct Broken;

    impl Collector for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn collect(&mut self, _sink: &mut dyn MetricSink) -> Result<usize, CollectError> {
            Err(CollectError::Io(io::Error::other("boom")))
        }
    }

    #[test]
    fn test_run_cycle_continues_after_failure() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/uptime", "600.0 300.0\n");

        let mut collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(Broken),
            Box::new(UptimeCollector::new(fs, UptimeConfig::default())),
        ];
        let mut sink = MemorySink::new();

        assert_eq!(run_cycle(&mut collectors, &mut sink), 2);
        assert_eq!(sink.names(), vec!["uptime.up", "uptime.idle"]);
    }

    #[test]
    fn test_args_collectors_list() {
        let args = Args::parse_from(["statflat", "-c", "uptime,ceph"]);
        assert_eq!(args.collectors, vec![CollectorName::Uptime, CollectorName::Ceph]);

        let args = Args::parse_from(["statflat"]);
        assert_eq!(
            args.collectors,
            vec![
                CollectorName::Ceph,
                CollectorName::Cephpoolstats,
                CollectorName::Uptime
            ]
        );
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let args = Args::parse_from([
            "statflat",
            "--ceph-binary",
            "/opt/ceph",
            "--cluster-name",
            "backup",
            "--socket-ext",
            "sock",
            "--precision",
            "3",
        ]);
        let settings = load_settings(&args).unwrap();

        assert_eq!(settings.ceph.ceph_binary, "/opt/ceph");
        assert_eq!(settings.cephpoolstats.ceph_binary, "/opt/ceph");
        assert_eq!(settings.cephpoolstats.cluster_name, "backup");
        assert_eq!(settings.ceph.socket_ext, "sock");
        assert_eq!(settings.ceph.socket_path, "/var/run/ceph");
        assert_eq!(settings.publish.precision, 3);
    }

    #[test]
    fn test_single_cycle_emits_ceph_counters() {
        let (fs, runner) = osd_mocks(json!({
            "osd": {"op_r": 100, "op_w": 50, "op_latency": {"avgcount": 10, "sum": 0.5}}
        }));
        let settings = Settings::default();
        let counters = load_counter_state(&settings.publish);
        let collector = ceph_collector(fs, runner, &settings, counters);
        let mut collectors: Vec<Box<dyn Collector>> = vec![Box::new(collector)];
        let mut sink = MemorySink::new();

        assert_eq!(run_cycle(&mut collectors, &mut sink), 4);
        assert_eq!(
            sink.names(),
            vec![
                "ceph.ceph.osd.0.osd.op_latency.avgcount",
                "ceph.ceph.osd.0.osd.op_latency.sum",
                "ceph.ceph.osd.0.osd.op_r",
                "ceph.ceph.osd.0.osd.op_w",
            ]
        );
        assert_eq!(sink.value("ceph.ceph.osd.0.osd.op_r"), Some(100.0));
        assert!(sink.metrics.iter().all(|m| m.kind == MetricKind::Counter));
    }

    #[test]
    fn test_delta_counters_carry_over_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("counters.json");
        let args = Args::parse_from([
            "statflat",
            "--counters",
            "delta",
            "--state-file",
            state.to_str().unwrap(),
        ]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.publish.counters, CounterMode::Delta);

        let run = |op_r: u64| {
            let (fs, runner) = osd_mocks(json!({"osd": {"op_r": op_r}}));
            let counters = load_counter_state(&settings.publish);
            let mut collectors: Vec<Box<dyn Collector>> =
                vec![Box::new(ceph_collector(fs, runner, &settings, counters))];
            let mut sink = MemorySink::new();
            run_cycle(&mut collectors, &mut sink);
            save_counter_state(&collectors, &settings.publish);
            sink
        };

        assert!(run(100).is_empty());
        assert!(state.exists());

        let sink = run(175);
        assert_eq!(sink.names(), vec!["ceph.ceph.osd.0.osd.op_r"]);
        assert_eq!(sink.value("ceph.ceph.osd.0.osd.op_r"), Some(75.0));
        assert_eq!(sink.metrics[0].kind, MetricKind::Counter);
    }

    #[test]
    fn test_corrupt_counter_state_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("counters.json");
        std::fs::write(&state, "not json").unwrap();

        let publish = PublishConfig {
            counters: CounterMode::Delta,
            state_file: Some(state),
            ..PublishConfig::default()
        };
        assert!(load_counter_state(&publish).is_empty());
    }

    #[test]
    fn test_build_collectors_deduplicates() {
        let collectors = build_collectors(
            &[CollectorName::Uptime, CollectorName::Uptime, CollectorName::Ceph],
            &Settings::default(),
            CounterTracker::new(),
        );
        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["uptime", "ceph"]);
    }
}
