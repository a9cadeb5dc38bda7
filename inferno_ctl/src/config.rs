use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use platform_dirs::AppDirs;
use serde::{Deserialize, Serialize};

use crate::common::*;
use crate::error::DispatchError;
use crate::protocol::{arc, cmc};
use crate::request_tracker::DEFAULT_CAPACITY;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Every pending request needs its own 16-bit sequence number.
pub const MAX_REQUEST_CAPACITY: usize = u16::MAX as usize;

/// Values given on the command line; each one beats the file and the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
  pub device_ip: Option<Ipv4Addr>,
  pub arc_port: Option<u16>,
  pub cmc_port: Option<u16>,
  pub bind_ip: Option<Ipv4Addr>,
  pub request_capacity: Option<usize>,
  pub poll_ceiling_ms: Option<u64>,
  pub auto_query: Option<bool>,
  /// Only turns payload printing on; a file can't be overruled into silence.
  pub print_payloads: bool,
}

/// Settings of the console and its dispatch loop. Every field has a default, so a
/// config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
  /// Upper bound of a single wait, in milliseconds.
  pub poll_ceiling_ms: u64,
  pub request_capacity: usize,
  pub connect_timeout_ms: u64,
  pub retry_interval_ms: u64,
  pub max_attempts: u32,
  pub device_ip: Ipv4Addr,
  pub arc_port: u16,
  pub cmc_port: u16,
  pub bind_ip: Ipv4Addr,
  /// Query channel counts right after connecting.
  pub auto_query: bool,
  /// Print raw payload hex of every completion.
  pub print_payloads: bool,
}

impl Default for LoopConfig {
  fn default() -> Self {
    Self {
      poll_ceiling_ms: 500,
      request_capacity: DEFAULT_CAPACITY,
      connect_timeout_ms: 3000,
      retry_interval_ms: 1000,
      max_attempts: 3,
      device_ip: Ipv4Addr::LOCALHOST,
      arc_port: arc::PORT,
      cmc_port: cmc::PORT,
      bind_ip: Ipv4Addr::UNSPECIFIED,
      auto_query: true,
      print_payloads: false,
    }
  }
}

impl LoopConfig {
  pub fn load(path: &Path) -> Result<Self, DispatchError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| DispatchError::Config(format!("{}: {e}", path.display())))
  }

  pub fn default_path() -> Option<PathBuf> {
    AppDirs::new(Some("inferno_console"), false).map(|dirs| dirs.config_dir.join(CONFIG_FILE_NAME))
  }

  /// Loads `path` if given (it must exist), otherwise the default file if there is one.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self, DispatchError> {
    if let Some(path) = path {
      return Self::load(path);
    }
    match Self::default_path() {
      Some(default) if default.exists() => {
        info!("using config file {}", default.display());
        Self::load(&default)
      }
      _ => Ok(Self::default()),
    }
  }

  /// Applies `INFERNO_*` overrides from the process environment.
  pub fn apply_env(&mut self) -> Result<(), DispatchError> {
    self.apply_env_from(|key| std::env::var(key).ok())
  }

  pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), DispatchError> {
    fn parse<T: FromStr>(key: &str, value: Option<String>, target: &mut T) -> Result<(), DispatchError> {
      if let Some(value) = value {
        *target = value.trim().parse().map_err(|_| DispatchError::Config(format!("invalid value '{value}' in env var {key}")))?;
      }
      Ok(())
    }
    parse("INFERNO_BIND_IP", lookup("INFERNO_BIND_IP"), &mut self.bind_ip)?;
    parse("INFERNO_DEVICE_IP", lookup("INFERNO_DEVICE_IP"), &mut self.device_ip)?;
    parse("INFERNO_POLL_CEILING_MS", lookup("INFERNO_POLL_CEILING_MS"), &mut self.poll_ceiling_ms)?;
    parse("INFERNO_REQUEST_CAPACITY", lookup("INFERNO_REQUEST_CAPACITY"), &mut self.request_capacity)?;
    Ok(())
  }

  /// File (or defaults), then `lookup` for `INFERNO_*` variables, then `overrides`; validated.
  pub fn layered(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
    overrides: &ConfigOverrides,
  ) -> Result<Self, DispatchError> {
    let mut config = Self::load_or_default(path)?;
    config.apply_env_from(lookup)?;
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
  }

  pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
    fn set<T: Copy>(value: Option<T>, target: &mut T) {
      if let Some(value) = value {
        *target = value;
      }
    }
    set(overrides.device_ip, &mut self.device_ip);
    set(overrides.arc_port, &mut self.arc_port);
    set(overrides.cmc_port, &mut self.cmc_port);
    set(overrides.bind_ip, &mut self.bind_ip);
    set(overrides.request_capacity, &mut self.request_capacity);
    set(overrides.poll_ceiling_ms, &mut self.poll_ceiling_ms);
    set(overrides.auto_query, &mut self.auto_query);
    self.print_payloads |= overrides.print_payloads;
  }

  pub fn validate(&self) -> Result<(), DispatchError> {
    if self.request_capacity == 0 || self.request_capacity > MAX_REQUEST_CAPACITY {
      return Err(DispatchError::Config(format!("request capacity must be between 1 and {MAX_REQUEST_CAPACITY}")));
    }
    if self.poll_ceiling_ms == 0 {
      return Err(DispatchError::Config("poll ceiling must be at least 1 ms".to_owned()));
    }
    if self.max_attempts == 0 {
      return Err(DispatchError::Config("max attempts must be at least 1".to_owned()));
    }
    Ok(())
  }

  pub fn poll_ceiling(&self) -> Duration {
    Duration::from_millis(self.poll_ceiling_ms)
  }
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }
  pub fn retry_interval(&self) -> Duration {
    Duration::from_millis(self.retry_interval_ms)
  }
}

/// Rewrites single-dash options (`-key`, `-key=value`, `-k=value`) to the `--key`
/// form clap parses. The program name, bare `-`, `--` options and single-letter
/// switches like `-h` pass through.
pub fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
  let mut args = args.into_iter();
  let program = args.next();
  program.into_iter().chain(args.map(|arg| if is_single_dash_option(&arg) { format!("-{arg}") } else { arg })).collect()
}

fn is_single_dash_option(arg: &str) -> bool {
  let Some(body) = arg.strip_prefix('-') else {
    return false;
  };
  if body.is_empty() || body.starts_with('-') {
    return false;
  }
  body.contains('=') || body.chars().count() > 1
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;
  use std::collections::HashMap;
  use std::io::Write;

  #[test]
  fn partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "poll_ceiling_ms = 250\nbind_ip = \"10.0.0.5\"").unwrap();
    let config = LoopConfig::load(file.path()).unwrap();
    assert_eq!(config.poll_ceiling(), Duration::from_millis(250));
    assert_eq!(config.bind_ip, Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(config.request_capacity, DEFAULT_CAPACITY);
    assert_eq!(config.arc_port, 4440);
  }

  #[test]
  fn unknown_keys_are_config_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "poll_celing_ms = 250").unwrap();
    let err = LoopConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, DispatchError::Config(_)));
    assert_eq!(err.exit_code(), 2);
  }

  #[test]
  fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(LoopConfig::load_or_default(Some(&dir.path().join("nope.toml"))).is_err());
  }

  #[test]
  fn env_overrides() {
    let env = HashMap::from([("INFERNO_BIND_IP", "192.168.0.2"), ("INFERNO_REQUEST_CAPACITY", " 16 ")]);
    let mut config = LoopConfig::default();
    config.apply_env_from(|k| env.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(config.bind_ip, Ipv4Addr::new(192, 168, 0, 2));
    assert_eq!(config.request_capacity, 16);
    assert_eq!(config.poll_ceiling_ms, 500);
  }

  #[test]
  fn bad_env_value_is_rejected() {
    let mut config = LoopConfig::default();
    let err = config.apply_env_from(|k| (k == "INFERNO_BIND_IP").then(|| "nonsense".to_owned())).unwrap_err();
    assert!(err.to_string().contains("INFERNO_BIND_IP"));
  }

  #[test]
  fn zero_capacity_is_invalid() {
    let config = LoopConfig { request_capacity: 0, ..Default::default() };
    assert!(config.validate().is_err());
    assert!(LoopConfig::default().validate().is_ok());
  }

  #[test]
  fn command_line_beats_env_beats_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "device_ip = \"10.0.0.1\"\nbind_ip = \"10.0.0.9\"\npoll_ceiling_ms = 100\nprint_payloads = true").unwrap();
    let env = HashMap::from([("INFERNO_DEVICE_IP", "10.0.0.2"), ("INFERNO_BIND_IP", "10.0.0.8")]);
    let overrides = ConfigOverrides { device_ip: Some(Ipv4Addr::new(10, 0, 0, 3)), ..Default::default() };
    let config = LoopConfig::layered(Some(file.path()), |k| env.get(k).map(|v| v.to_string()), &overrides).unwrap();
    assert_eq!(config.device_ip, Ipv4Addr::new(10, 0, 0, 3));
    assert_eq!(config.bind_ip, Ipv4Addr::new(10, 0, 0, 8));
    assert_eq!(config.poll_ceiling_ms, 100);
    assert!(config.print_payloads);
  }

  #[test]
  fn print_payloads_flag_only_switches_on() {
    let mut config = LoopConfig::default();
    config.apply_overrides(&ConfigOverrides::default());
    assert!(!config.print_payloads);
    config.apply_overrides(&ConfigOverrides { print_payloads: true, ..Default::default() });
    assert!(config.print_payloads);
  }

  #[test]
  fn zero_capacity_override_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();
    let overrides = ConfigOverrides { request_capacity: Some(0), ..Default::default() };
    let err = LoopConfig::layered(Some(&path), |_| None, &overrides).unwrap_err();
    assert_eq!(err.exit_code(), 2);
  }

  #[test]
  fn capacity_fits_the_seqnum_space() {
    let config = LoopConfig { request_capacity: MAX_REQUEST_CAPACITY + 1, ..Default::default() };
    assert_eq!(config.validate().unwrap_err().exit_code(), 2);
    let config = LoopConfig { request_capacity: MAX_REQUEST_CAPACITY, ..Default::default() };
    assert!(config.validate().is_ok());
  }

  #[rstest]
  #[case(&["prog", "-a=10.0.0.1", "-pp"], &["prog", "--a=10.0.0.1", "--pp"])]
  #[case(&["prog", "--t=100", "-", "-i=cmds.txt"], &["prog", "--t=100", "-", "--i=cmds.txt"])]
  #[case(&["prog", "-h", "-u=false", "-cmc=8801"], &["prog", "-h", "--u=false", "--cmc=8801"])]
  #[case(&["-prog"], &["-prog"])]
  #[case(&[], &[])]
  fn args_are_normalized(#[case] input: &[&str], #[case] expected: &[&str]) {
    let normalized = normalize_args(input.iter().map(|s| s.to_string()));
    assert_eq!(normalized, expected.iter().map(|s| s.to_string()).collect::<Vec<_>>());
  }
}
