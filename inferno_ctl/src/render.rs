use std::fmt::{self, Display, Formatter};
use std::net::SocketAddrV4;

use itertools::Itertools;

pub const SUBSCRIPTION_STATUS_SUBSCRIBED: u32 = 0x0101_0009;
pub const SUBSCRIPTION_STATUS_UNRESOLVED: u32 = 0x0000_0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxChannel {
  pub id: u16,
  pub name: String,
  pub tx_channel: Option<String>,
  pub tx_device: Option<String>,
  pub status: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxChannel {
  pub id: u16,
  pub name: String,
}

/// Everything the console knows how to print, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
  ChannelCounts { tx: u16, rx: u16 },
  DeviceName(String),
  DeviceNames { friendly: String, factory: String, board: String },
  RxChannels { channels: Vec<RxChannel>, more: bool },
  TxChannels { channels: Vec<TxChannel>, friendly: bool, more: bool },
  Identity { device_id: [u8; 8], info_addr: SocketAddrV4 },
  Acknowledged,
  Payload(Vec<u8>),
  Text(String),
}

impl Display for Message {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Message::ChannelCounts { tx, rx } => write!(f, "  channels: {tx} tx, {rx} rx"),
      Message::DeviceName(name) => write!(f, "  device name: \"{name}\""),
      Message::DeviceNames { friendly, factory, board } => {
        writeln!(f, "  friendly name: \"{friendly}\"")?;
        writeln!(f, "  factory name: \"{factory}\"")?;
        write!(f, "  board: \"{board}\"")
      }
      Message::RxChannels { channels, more } => render_rx_channels(f, channels, *more),
      Message::TxChannels { channels, friendly, more } => render_tx_channels(f, channels, *friendly, *more),
      Message::Identity { device_id, info_addr } => {
        write!(f, "  device id: {} ({}), info address: {info_addr}", hex::encode(device_id), id64_to_ascii(device_id))
      }
      Message::Acknowledged => write!(f, "  ok"),
      Message::Payload(bytes) => render_payload(f, bytes),
      Message::Text(text) => write!(f, "  {text}"),
    }
  }
}

fn render_rx_channels(f: &mut Formatter<'_>, channels: &[RxChannel], more: bool) -> fmt::Result {
  if channels.is_empty() {
    return write!(f, "  no rx channels");
  }
  let lines = channels.iter().map(|ch| {
    let source = match (&ch.tx_channel, &ch.tx_device) {
      (Some(c), Some(d)) => format!("{c}@{d}"),
      _ => "-".to_owned(),
    };
    format!("  {:>4} {:<24} <- {:<40} {}", ch.id, ch.name, source, subscription_status_to_string(ch.status))
  });
  write!(f, "{}", lines.format("\n"))?;
  if more {
    write!(f, "\n  (more channels follow)")?;
  }
  Ok(())
}

fn render_tx_channels(f: &mut Formatter<'_>, channels: &[TxChannel], friendly: bool, more: bool) -> fmt::Result {
  if channels.is_empty() {
    return write!(f, "  no tx channels");
  }
  let kind = if friendly { "friendly" } else { "default" };
  let lines = channels.iter().map(|ch| format!("  {:>4} {kind} \"{}\"", ch.id, ch.name));
  write!(f, "{}", lines.format("\n"))?;
  if more {
    write!(f, "\n  (more channels follow)")?;
  }
  Ok(())
}

/// Printable payloads as text, anything else as hex.
fn render_payload(f: &mut Formatter<'_>, bytes: &[u8]) -> fmt::Result {
  if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
    write!(f, "  body=\"{}\"", String::from_utf8_lossy(bytes))
  } else {
    write!(f, "  body=0x{}", hex::encode(bytes))
  }
}

pub fn subscription_status_to_string(status: u32) -> String {
  match status {
    0 => "none".to_owned(),
    SUBSCRIPTION_STATUS_UNRESOLVED => "unresolved".to_owned(),
    SUBSCRIPTION_STATUS_SUBSCRIBED => "subscribed".to_owned(),
    other => format!("status {other:#010x}"),
  }
}

/// Non-printable bytes become '.'.
pub fn id64_to_ascii(id: &[u8; 8]) -> String {
  id.iter().map(|b| if b.is_ascii_graphic() { *b as char } else { '.' }).collect()
}
