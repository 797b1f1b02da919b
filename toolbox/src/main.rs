use anyhow::{Context, Result};
use clap::Parser;
use doq_probe::{scan, QuicHandshaker};
use doqscan_core::{AdmissionController, ResultSink, TargetFeed};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::{Overrides, Settings};

#[derive(Debug, Parser)]
#[command(name = "doqscan", version, about = "Find IPv4 hosts that answer DNS-over-QUIC")]
struct Cli {
    /// File with one IPv4 address per line
    input: Option<PathBuf>,
    /// File reachable addresses are appended to (created if missing)
    output: Option<PathBuf>,
    /// Max probes in flight [default: 30]
    #[arg(long, value_name = "N")]
    parallel: Option<usize>,
    /// Probe port 853 only, instead of 784 then 8853
    #[arg(long, default_value_t = false)]
    port853: bool,
    /// Handshake timeout per port in milliseconds [default: 2000]
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
    /// Extra ALPN identifier advertised after the DoQ drafts; repeatable
    #[arg(long = "alpn", value_name = "ID")]
    alpn: Vec<String>,
    /// Optional config file (YAML). If omitted, loads ./doqscan.yaml if present.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Debug logging for the probe crates (RUST_LOG takes precedence)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,doqscan=debug,doq_probe=debug,doqscan_core=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (Some(input), Some(output)) = (cli.input.clone(), cli.output.clone()) else {
        eprintln!("need 2 arguments: [in file] [out file]");
        std::process::exit(1);
    };
    init_logging(cli.verbose);
    debug!("doqscan {} (core {})", env!("CARGO_PKG_VERSION"), doqscan_core::version());

    let loaded_cfg = config::load_config(cli.config.as_deref())?;
    let overrides = Overrides { parallel: cli.parallel, port853: cli.port853, timeout_ms: cli.timeout_ms, alpn: cli.alpn };
    let settings = Settings::resolve(input, output, overrides, loaded_cfg.as_ref())?;
    run(settings)
}

fn run(settings: Settings) -> Result<()> {
    let input = File::open(&settings.input).with_context(|| format!("failed to open input {}", settings.input.display()))?;
    let sink = ResultSink::open_append(&settings.output)
        .with_context(|| format!("failed to open output {}", settings.output.display()))?;
    debug!(
        parallel = settings.parallel,
        ports = ?settings.probe.ports,
        alpn = ?settings.probe.alpn,
        timeout_ms = settings.probe.handshake_timeout.as_millis() as u64,
        "starting scan"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let started = Instant::now();
    let probe_cfg = Arc::new(settings.probe.clone());
    let recorder = sink.recorder();
    let (summary, lines, targets) = rt.block_on(async move {
        let handshaker = Arc::new(QuicHandshaker::new(&probe_cfg).context("failed to set up QUIC endpoint")?);
        let mut feed = TargetFeed::new(tokio::io::BufReader::new(tokio::fs::File::from_std(input)));
        let admission = AdmissionController::new(settings.parallel);
        debug!(limit = admission.limit(), "admission ready");
        let summary = scan(&mut feed, handshaker.clone(), probe_cfg, admission, recorder).await;
        handshaker.shutdown().await;
        anyhow::Ok((summary, feed.lines_read(), feed.targets_yielded()))
    })?;
    let stats = sink.finish();

    info!(
        lines,
        targets,
        dispatched = summary.dispatched,
        completed = summary.completed,
        reachable = summary.reachable,
        written = stats.written,
        write_failures = stats.failed,
        duration_ms = started.elapsed().as_millis() as u64,
        "scan finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positionals_and_defaults() {
        let cli = Cli::parse_from(["doqscan", "in.txt", "out.txt"]);
        assert_eq!(cli.input, Some(PathBuf::from("in.txt")));
        assert_eq!(cli.output, Some(PathBuf::from("out.txt")));
        assert_eq!(cli.parallel, None);
        assert!(!cli.port853);
        assert!(cli.alpn.is_empty());
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "doqscan", "--parallel", "5", "--port853", "--alpn", "doq", "--alpn", "doq-i02", "in.txt", "out.txt",
        ]);
        assert_eq!(cli.parallel, Some(5));
        assert!(cli.port853);
        assert_eq!(cli.alpn, vec!["doq".to_string(), "doq-i02".to_string()]);
    }

    #[test]
    fn missing_positionals_still_parse() {
        // main() turns this into exit code 1 with a diagnostic
        let cli = Cli::parse_from(["doqscan", "in.txt"]);
        assert!(cli.output.is_none());
    }

    #[test]
    fn run_reports_unopenable_input() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(
            dir.path().join("missing.txt"),
            dir.path().join("out.txt"),
            Overrides::default(),
            None,
        )
        .unwrap();
        let err = run(settings).unwrap_err();
        assert!(err.to_string().contains("failed to open input"));
    }

    #[test]
    fn empty_input_creates_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "not-an-ip\n::1\n").unwrap();
        let settings = Settings::resolve(input, output.clone(), Overrides::default(), None).unwrap();
        run(settings).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
    }
}
