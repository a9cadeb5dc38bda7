use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::common::*;
use crate::config::{LoopConfig, MAX_REQUEST_CAPACITY};
use crate::error::{DispatchError, ErrorCode};
use crate::library::{Library, LibraryEvent};
use crate::protocol::req_resp::{self, Header, HEADER_LENGTH, MTU, STATUS_MORE, STATUS_OK};
use crate::protocol::{arc, cmc};
use crate::render::Message;
use crate::request_tracker::RequestHandle;
use crate::socket_set::SocketSet;

pub fn create_mio_udp_socket(self_ip: Ipv4Addr) -> io::Result<(mio::net::UdpSocket, u16)> {
  let socket = mio::net::UdpSocket::bind(SocketAddr::new(IpAddr::V4(self_ip), 0))?;
  let port = socket.local_addr()?.port();
  Ok((socket, port))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcClientConfig {
  pub device_ip: Ipv4Addr,
  pub arc_port: u16,
  pub cmc_port: u16,
  pub bind_ip: Ipv4Addr,
  pub retry_interval: Duration,
  pub max_attempts: u32,
  pub max_in_flight: usize,
  /// Queue a `Message::Payload` notice with the body of every matched response.
  pub print_payloads: bool,
}

impl From<&LoopConfig> for ArcClientConfig {
  fn from(config: &LoopConfig) -> Self {
    Self {
      device_ip: config.device_ip,
      arc_port: config.arc_port,
      cmc_port: config.cmc_port,
      bind_ip: config.bind_ip,
      retry_interval: config.retry_interval(),
      max_attempts: config.max_attempts,
      max_in_flight: config.request_capacity,
      print_payloads: config.print_payloads,
    }
  }
}

impl Default for ArcClientConfig {
  fn default() -> Self {
    Self::from(&LoopConfig::default())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Service {
  Arc,
  Cmc,
}

/// Everything the client can ask a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  ChannelCounts,
  DeviceName,
  DeviceNames,
  /// One page of rx channels starting at the 1-based channel `start`.
  RxChannels { start: u16 },
  TxChannels { start: u16, friendly: bool },
  Subscribe { rx_channel: u16, tx_channel: String, tx_device: String },
  Unsubscribe { rx_channel: u16 },
  Identity,
}

impl Operation {
  fn service(&self) -> Service {
    match self {
      Operation::Identity => Service::Cmc,
      _ => Service::Arc,
    }
  }

  fn opcode(&self) -> u16 {
    match self {
      Operation::ChannelCounts => arc::OP_CHANNEL_COUNTS,
      Operation::DeviceName => arc::OP_DEVICE_NAME,
      Operation::DeviceNames => arc::OP_DEVICE_NAMES,
      Operation::RxChannels { .. } => arc::OP_RX_CHANNELS,
      Operation::TxChannels { friendly: false, .. } => arc::OP_TX_CHANNELS,
      Operation::TxChannels { friendly: true, .. } => arc::OP_TX_FRIENDLY_NAMES,
      Operation::Subscribe { .. } | Operation::Unsubscribe { .. } => arc::OP_SUBSCRIBE,
      Operation::Identity => cmc::OP_IDENTITY,
    }
  }

  fn validate(&self) -> Result<(), ErrorCode> {
    let name_ok = |name: &str| !name.is_empty() && name.len() <= arc::NAME_MAX_LEN && !name.contains('\0');
    match self {
      Operation::RxChannels { start } | Operation::TxChannels { start, .. } if *start == 0 => Err(ErrorCode::InvalidParameter),
      Operation::Unsubscribe { rx_channel } if *rx_channel == 0 => Err(ErrorCode::InvalidParameter),
      Operation::Subscribe { rx_channel, tx_channel, tx_device } => {
        if *rx_channel == 0 || !name_ok(tx_channel) || !name_ok(tx_device) {
          Err(ErrorCode::InvalidParameter)
        } else {
          Ok(())
        }
      }
      _ => Ok(()),
    }
  }

  fn body(&self) -> Vec<u8> {
    match self {
      Operation::RxChannels { start } | Operation::TxChannels { start, .. } => arc::page_request(*start),
      Operation::Subscribe { rx_channel, tx_channel, tx_device } => arc::subscribe_request(*rx_channel, Some((tx_channel, tx_device))),
      Operation::Unsubscribe { rx_channel } => arc::subscribe_request(*rx_channel, None),
      _ => vec![],
    }
  }

  fn decode(&self, packet: &[u8], header: &Header) -> Result<Message, ErrorCode> {
    let more = header.opcode2 == STATUS_MORE;
    let content = req_resp::content(packet, header);
    match self {
      Operation::ChannelCounts => arc::decode_channel_counts(content),
      Operation::DeviceName => arc::decode_device_name(content),
      Operation::DeviceNames => arc::decode_device_names(packet),
      Operation::RxChannels { .. } => arc::decode_rx_channels(packet, more),
      Operation::TxChannels { friendly: false, .. } => arc::decode_tx_channels(packet, more),
      Operation::TxChannels { friendly: true, .. } => arc::decode_tx_friendly_names(packet, more),
      Operation::Subscribe { .. } | Operation::Unsubscribe { .. } => Ok(Message::Acknowledged),
      Operation::Identity => cmc::decode_identity(content),
    }
  }
}

struct InFlight {
  handle: RequestHandle,
  seqnum: u16,
  operation: Operation,
  packet: Vec<u8>,
  dest: SocketAddr,
  attempts: u32,
  next_retry: Instant,
}

/// Request/response client for the ARC and CMC services of one device.
///
/// All sending and receiving happens inside `process`; every issued operation
/// ends in exactly one `LibraryEvent::Completed`, either with the decoded
/// response, a device error, or `Timeout` after `max_attempts` sends.
pub struct ArcClient {
  config: ArcClientConfig,
  socket: mio::net::UdpSocket,
  seqnum: u16,
  last_handle: u32,
  in_flight: Vec<InFlight>,
  events: VecDeque<LibraryEvent>,
  device_name: Option<String>,
  recv_buf: Box<[u8; MTU]>,
}

impl ArcClient {
  pub fn open(config: ArcClientConfig) -> io::Result<Self> {
    let (socket, port) = create_mio_udp_socket(config.bind_ip)?;
    info!("control socket bound to {}:{port}, device at {}", config.bind_ip, config.device_ip);
    Ok(Self {
      config,
      socket,
      seqnum: rand::random(),
      last_handle: 0,
      in_flight: vec![],
      events: VecDeque::from([LibraryEvent::SocketsChanged]),
      device_name: None,
      recv_buf: Box::new([0u8; MTU]),
    })
  }

  pub fn device_name(&self) -> Option<&str> {
    self.device_name.as_deref()
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.len()
  }

  pub fn local_addr(&self) -> io::Result<SocketAddr> {
    self.socket.local_addr()
  }

  fn next_seqnum(&mut self) -> u16 {
    loop {
      self.seqnum = self.seqnum.wrapping_add(1);
      if !self.in_flight.iter().any(|f| f.seqnum == self.seqnum) {
        return self.seqnum;
      }
    }
  }

  fn next_handle(&mut self) -> RequestHandle {
    self.last_handle = self.last_handle.wrapping_add(1);
    if self.last_handle == 0 {
      self.last_handle = 1;
    }
    RequestHandle::new(self.last_handle)
  }

  fn destination(&self, service: Service) -> SocketAddr {
    let port = match service {
      Service::Arc => self.config.arc_port,
      Service::Cmc => self.config.cmc_port,
    };
    SocketAddr::new(IpAddr::V4(self.config.device_ip), port)
  }

  fn complete(&mut self, handle: RequestHandle, result: Result<Option<Message>, ErrorCode>) {
    self.events.push_back(LibraryEvent::Completed { handle, result });
  }

  fn rebind(&mut self) -> io::Result<()> {
    let (socket, port) = create_mio_udp_socket(self.config.bind_ip)?;
    info!("control socket rebound to port {port}");
    self.socket = socket;
    self.events.push_back(LibraryEvent::SocketsChanged);
    Ok(())
  }

  fn receive_all(&mut self) -> Result<(), DispatchError> {
    loop {
      match self.socket.recv_from(&mut self.recv_buf[..]) {
        Ok((len, from)) => {
          let packet = self.recv_buf[..len].to_vec();
          self.handle_packet(&packet, from);
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
          debug!("device refused a request: {e:?}");
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
        Err(e) => {
          error!("receive error {e:?}, reopening control socket");
          return self.rebind().map_err(DispatchError::from);
        }
      }
    }
  }

  fn handle_packet(&mut self, packet: &[u8], from: SocketAddr) {
    let header = match req_resp::parse_header(packet) {
      Ok(header) => header,
      Err(e) => {
        warn!("malformed packet from {from}: {e}: {}", hex::encode(packet));
        return;
      }
    };
    let packet = &packet[..header.total_length as usize];
    let Some(index) =
      self.in_flight.iter().position(|f| f.seqnum == header.seqnum && f.operation.opcode() == header.opcode1 && f.dest == from)
    else {
      debug!("received spurious packet from {from}: {}", hex::encode(packet));
      return;
    };
    let request = self.in_flight.swap_remove(index);
    trace!("response to {:?} after {} attempt(s): {}", request.operation, request.attempts, hex::encode(packet));
    if self.config.print_payloads {
      self.events.push_back(LibraryEvent::Notice(Message::Payload(packet[HEADER_LENGTH..].to_vec())));
    }
    let result = match header.opcode2 {
      STATUS_OK | STATUS_MORE => request.operation.decode(packet, &header),
      status => {
        error!("device returned error {status:#06x} for {:?}", request.operation);
        Err(ErrorCode::Remote(status))
      }
    };
    match &result {
      Ok(Message::DeviceName(name)) | Ok(Message::DeviceNames { friendly: name, .. }) if !name.is_empty() => {
        self.device_name = Some(name.clone());
      }
      Err(e) => debug!("{:?} failed: {e}", request.operation),
      _ => {}
    }
    self.complete(request.handle, result.map(Some));
  }

  fn send_due(&mut self, now: Instant) {
    let mut index = 0;
    while index < self.in_flight.len() {
      let request = &mut self.in_flight[index];
      if request.next_retry > now {
        index += 1;
        continue;
      }
      if request.attempts >= self.config.max_attempts {
        let request = self.in_flight.swap_remove(index);
        warn!("{:?} timed out after {} attempts", request.operation, request.attempts);
        self.complete(request.handle, Err(ErrorCode::Timeout));
        continue;
      }
      match self.socket.send_to(&request.packet, request.dest) {
        Ok(_) => {
          request.attempts += 1;
          request.next_retry = now + self.config.retry_interval;
          index += 1;
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
          request.next_retry = now + self.config.retry_interval;
          index += 1;
        }
        Err(e) => {
          let request = self.in_flight.swap_remove(index);
          error!("unable to send {:?}: {e:?}", request.operation);
          self.complete(request.handle, Err(ErrorCode::from(&e)));
        }
      }
    }
  }
}

impl Library for ArcClient {
  type Operation = Operation;

  fn fill_sockets(&self, set: &mut SocketSet) {
    set.add_read(self.socket.as_raw_fd());
  }

  fn next_action_time(&self) -> Option<Instant> {
    self.in_flight.iter().map(|f| f.next_retry).min()
  }

  fn process(&mut self, _ready: &SocketSet) -> Result<(), DispatchError> {
    self.receive_all()?;
    self.send_due(Instant::now());
    Ok(())
  }

  fn issue(&mut self, operation: Operation) -> Result<RequestHandle, ErrorCode> {
    operation.validate()?;
    if self.in_flight.len() >= self.config.max_in_flight.min(MAX_REQUEST_CAPACITY) {
      return Err(ErrorCode::NoBufs);
    }
    let start_code = match operation.service() {
      Service::Arc => arc::START_CODE,
      Service::Cmc => cmc::START_CODE,
    };
    let seqnum = self.next_seqnum();
    let mut buf = [0u8; MTU];
    let packet = req_resp::make_packet(&mut buf, start_code, seqnum, operation.opcode(), 0, &operation.body())?.to_vec();
    let dest = self.destination(operation.service());
    let now = Instant::now();
    let mut attempts = 0;
    match self.socket.send_to(&packet, dest) {
      Ok(_) => attempts = 1,
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
      Err(e) => {
        error!("unable to send {operation:?} to {dest}: {e:?}");
        return Err(ErrorCode::from(&e));
      }
    }
    let handle = self.next_handle();
    debug!("issued {operation:?} as {handle}, seqnum {seqnum:#06x}");
    let next_retry = if attempts == 0 { now } else { now + self.config.retry_interval };
    self.in_flight.push(InFlight { handle, seqnum, operation, packet, dest, attempts, next_retry });
    Ok(handle)
  }

  fn take_event(&mut self) -> Option<LibraryEvent> {
    self.events.pop_front()
  }

  fn prompt(&self) -> String {
    match &self.device_name {
      Some(name) => format!("'{name}'> "),
      None => ">>> ".to_owned(),
    }
  }
}
