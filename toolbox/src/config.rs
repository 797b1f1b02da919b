use anyhow::{bail, Context, Result};
use doq_probe::{PortSet, ProbeConfig, config::DEFAULT_PARALLEL};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "doqscan.yaml";

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProbeSection {
    pub parallel: Option<usize>,
    pub port853: Option<bool>,
    pub timeout_ms: Option<u64>,
    /// Extra identifiers advertised after the DoQ drafts.
    pub alpn: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub probe: Option<ProbeSection>,
}

/// Load an explicit config file, or `./doqscan.yaml` if it exists.
/// A missing default file is not an error; a bad explicit one is.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Values given on the command line. `None`/empty means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub parallel: Option<usize>,
    pub port853: bool,
    pub timeout_ms: Option<u64>,
    pub alpn: Vec<String>,
}

/// Everything a run needs, fixed before the first probe starts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub parallel: usize,
    pub probe: ProbeConfig,
}

impl Settings {
    /// Command line beats config file beats built-in defaults.
    pub fn resolve(input: PathBuf, output: PathBuf, cli: Overrides, file: Option<&Config>) -> Result<Settings> {
        let file = file.and_then(|c| c.probe.clone()).unwrap_or_default();

        let parallel = cli.parallel.or(file.parallel).unwrap_or(DEFAULT_PARALLEL);
        if parallel == 0 {
            bail!("--parallel must be at least 1");
        }

        let port853 = cli.port853 || file.port853.unwrap_or(false);
        let mut probe = ProbeConfig::new(PortSet::from_port853_flag(port853));
        if let Some(ms) = cli.timeout_ms.or(file.timeout_ms) {
            probe = probe.with_handshake_timeout(Duration::from_millis(ms));
        }
        if !cli.alpn.is_empty() {
            probe = probe.with_extra_alpn(cli.alpn);
        } else if let Some(alpn) = file.alpn {
            probe = probe.with_extra_alpn(alpn);
        }
        probe.validate().context("invalid probe settings")?;

        Ok(Settings { input, output, parallel, probe })
    }
}
