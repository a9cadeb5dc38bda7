use std::net::{Ipv4Addr, SocketAddrV4};

use crate::byte_utils::*;
use crate::error::ErrorCode;
use crate::render::Message;

pub const PORT: u16 = 8800;
pub const START_CODE: u16 = 0x1200;

pub const OP_IDENTITY: u16 = 0x1001;

/// Bytes read by `decode_identity`; devices send two more (zero) at the end.
const IDENTITY_LEN: usize = 20;

/// Device id, then the address where the device answers info requests.
pub fn decode_identity(content: &[u8]) -> Result<Message, ErrorCode> {
  if content.len() < IDENTITY_LEN {
    return Err(ErrorCode::Truncated);
  }
  let mut device_id = [0u8; 8];
  device_id.copy_from_slice(&content[2..10]);
  let ip = Ipv4Addr::new(content[14], content[15], content[16], content[17]);
  let port = read_u16_at(content, 18)?;
  Ok(Message::Identity { device_id, info_addr: SocketAddrV4::new(ip, port) })
}
