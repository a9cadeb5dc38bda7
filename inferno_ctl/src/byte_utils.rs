use std::str;

use crate::error::ErrorCode;

#[allow(non_snake_case)]
pub fn H(u: u16) -> u8 {
  return (u >> 8) as u8;
}
#[allow(non_snake_case)]
pub fn L(u: u16) -> u8 {
  return u as u8;
}

pub fn make_u16(h: u8, l: u8) -> u16 {
  return ((h as u16) << 8) | (l as u16);
}

/// Big-endian u16 at `offset`, or `Truncated` when the buffer is too short.
pub fn read_u16_at(buffer: &[u8], offset: usize) -> Result<u16, ErrorCode> {
  match buffer.get(offset..offset + 2) {
    Some(b) => Ok(make_u16(b[0], b[1])),
    None => Err(ErrorCode::Truncated),
  }
}

pub fn read_u32_at(buffer: &[u8], offset: usize) -> Result<u32, ErrorCode> {
  match buffer.get(offset..offset + 4) {
    Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
    None => Err(ErrorCode::Truncated),
  }
}

pub fn read_0term_str_from_buffer(buffer: &[u8], offset: usize) -> Result<&str, ErrorCode> {
  if offset >= buffer.len() {
    return Err(ErrorCode::Truncated);
  }
  let ntpos = match buffer[offset..].iter().position(|c| *c == 0) {
    Some(x) => x,
    None => buffer.len() - offset,
  };
  return str::from_utf8(&buffer[offset..][..ntpos]).map_err(|_| ErrorCode::InvalidData);
}
