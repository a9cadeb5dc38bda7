use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::{fs, io, process};

use clap::Parser;
use log::{error, info};

use inferno_ctl::{
  arc_commands, install_ctrl_c_bridge, normalize_args, ArcClient, ArcClientConfig, CancellationToken, ConfigOverrides,
  DispatchError, DispatchLoop, ErrorCode, FdLines, LoopConfig, MioWaiter, Operation,
};

/// Interactive control console for Dante-compatible devices.
///
/// Options are written `-key=value`; `--key=value` works too.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Device IPv4 address
  #[arg(long = "a", value_name = "ADDRESS")]
  address: Option<Ipv4Addr>,
  /// Device ARC port
  #[arg(long = "p", value_name = "PORT")]
  arc_port: Option<u16>,
  /// Device CMC port
  #[arg(long = "cmc", value_name = "PORT")]
  cmc_port: Option<u16>,
  /// Local address to bind to
  #[arg(long = "b", value_name = "ADDRESS")]
  bind: Option<Ipv4Addr>,
  /// Maximum number of pending requests
  #[arg(long = "r", value_name = "N")]
  requests: Option<usize>,
  /// Longest single wait of the main loop, in milliseconds
  #[arg(long = "t", value_name = "MS")]
  poll_ceiling: Option<u64>,
  /// Run the commands in FILE before reading standard input
  #[arg(long = "i", value_name = "FILE")]
  script: Option<PathBuf>,
  /// Query channel counts after connecting
  #[arg(long = "u", value_name = "BOOL")]
  auto_query: Option<bool>,
  /// Config file (TOML)
  #[arg(long = "config", value_name = "FILE")]
  config: Option<PathBuf>,
  /// Print the raw payload of every response
  #[arg(long = "pp")]
  print_payloads: bool,
}

impl Args {
  fn overrides(&self) -> ConfigOverrides {
    ConfigOverrides {
      device_ip: self.address,
      arc_port: self.arc_port,
      cmc_port: self.cmc_port,
      bind_ip: self.bind,
      request_capacity: self.requests,
      poll_ceiling_ms: self.poll_ceiling,
      auto_query: self.auto_query,
      print_payloads: self.print_payloads,
    }
  }
}

fn build_config(args: &Args) -> Result<LoopConfig, DispatchError> {
  LoopConfig::layered(args.config.as_deref(), |key| std::env::var(key).ok(), &args.overrides())
}

type Console = DispatchLoop<ArcClient, MioWaiter, io::Stdout>;

/// Asks for the device name and waits for it, so an unreachable device is
/// reported before the prompt.
fn connect(console: &mut Console, config: &LoopConfig) -> Result<(), DispatchError> {
  let handle = console.issue("Connect", Operation::DeviceName)?;
  if let Err(e) = console.wait_for_request(handle, config.connect_timeout()) {
    if !console.token().is_cancelled() {
      error!("unable to connect to {}:{}: {e}", config.device_ip, config.arc_port);
    }
    return Err(e);
  }
  if config.auto_query {
    let handle = console.issue("Channel counts", Operation::ChannelCounts)?;
    console.wait_for_request(handle, config.connect_timeout())?;
  }
  Ok(())
}

/// Ctrl-C while waiting for the device ends the console cleanly.
fn cancelled_is_clean(result: Result<(), DispatchError>, token: &CancellationToken) -> Result<(), DispatchError> {
  match result {
    Err(DispatchError::Code(ErrorCode::Interrupted)) if token.is_cancelled() => Ok(()),
    other => other,
  }
}

fn run(args: Args) -> Result<(), DispatchError> {
  let config = build_config(&args)?;
  let client = ArcClient::open(ArcClientConfig::from(&config))?;
  let token = CancellationToken::new();
  install_ctrl_c_bridge(token.clone())?;
  let mut console = DispatchLoop::new(client, MioWaiter::new()?, io::stdout(), arc_commands::processor(), &config, token);

  cancelled_is_clean(connect(&mut console, &config), console.token())?;
  if let Some(path) = &args.script {
    info!("running commands from {}", path.display());
    let script = fs::read_to_string(path)?;
    console.run_script(script.lines(), config.connect_timeout())?;
  }
  console.run(&mut FdLines::stdin())
}

fn main() {
  let logenv = env_logger::Env::default().default_filter_or("info");
  env_logger::init_from_env(logenv);

  let args = Args::parse_from(normalize_args(std::env::args()));
  let code = match run(args) {
    Ok(()) => 0,
    Err(e) => {
      error!("{e}");
      e.exit_code()
    }
  };
  process::exit(code);
}
