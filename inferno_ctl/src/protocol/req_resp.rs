use binary_layout::prelude::*;

use crate::error::ErrorCode;

pub const HEADER_LENGTH: usize = 10;
pub const MTU: usize = 1500;

/// `opcode2` of a successful response.
pub const STATUS_OK: u16 = 0x0001;
/// `opcode2` of a successful response with more pages to fetch.
pub const STATUS_MORE: u16 = 0x8112;

define_layout!(req_resp_packet, BigEndian, {
  start_code: u16,
  total_length: u16,
  seqnum: u16,
  opcode1: u16,
  opcode2: u16,
  content: [u8]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
  pub start_code: u16,
  pub total_length: u16,
  pub seqnum: u16,
  pub opcode1: u16,
  pub opcode2: u16,
}

pub fn make_packet<'a>(
  buf: &'a mut [u8],
  start_code: u16,
  seqnum: u16,
  opcode1: u16,
  opcode2: u16,
  content: &[u8],
) -> Result<&'a [u8], ErrorCode> {
  let total_len = content.len() + HEADER_LENGTH;
  if total_len > u16::MAX as usize || total_len > buf.len() {
    return Err(ErrorCode::InvalidParameter);
  }
  let buffer = &mut buf[..total_len];
  let mut view = req_resp_packet::View::new(buffer);
  view.start_code_mut().write(start_code);
  view.total_length_mut().write(total_len as u16);
  view.seqnum_mut().write(seqnum);
  view.opcode1_mut().write(opcode1);
  view.opcode2_mut().write(opcode2);
  view.content_mut().copy_from_slice(content);
  return Ok(view.into_storage());
}

/// Header of a received packet, checked against the datagram length.
pub fn parse_header(packet: &[u8]) -> Result<Header, ErrorCode> {
  if packet.len() < HEADER_LENGTH {
    return Err(ErrorCode::Truncated);
  }
  let view = req_resp_packet::View::new(packet);
  let header = Header {
    start_code: view.start_code().read(),
    total_length: view.total_length().read(),
    seqnum: view.seqnum().read(),
    opcode1: view.opcode1().read(),
    opcode2: view.opcode2().read(),
  };
  if (header.total_length as usize) > packet.len() || (header.total_length as usize) < HEADER_LENGTH {
    return Err(ErrorCode::Truncated);
  }
  Ok(header)
}

/// Body of a packet whose header was accepted by `parse_header`.
pub fn content<'a>(packet: &'a [u8], header: &Header) -> &'a [u8] {
  &packet[HEADER_LENGTH..header.total_length as usize]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_fields_are_big_endian() {
    let mut buf = [0u8; MTU];
    let pkt = make_packet(&mut buf, 0x27ff, 0x0102, 0x1000, 0, &[0xaa, 0xbb]).unwrap();
    assert_eq!(pkt, &[0x27, 0xff, 0x00, 0x0c, 0x01, 0x02, 0x10, 0x00, 0x00, 0x00, 0xaa, 0xbb]);
    let header = parse_header(pkt).unwrap();
    assert_eq!(header.seqnum, 0x0102);
    assert_eq!(content(pkt, &header), &[0xaa, 0xbb]);
  }

  #[test]
  fn trailing_garbage_is_not_content() {
    let mut buf = [0u8; MTU];
    let len = make_packet(&mut buf, 0x27ff, 1, 0x1002, 1, b"dev\0").unwrap().len();
    let header = parse_header(&buf[..len + 3]).unwrap();
    assert_eq!(content(&buf[..len + 3], &header), b"dev\0");
  }

  #[test]
  fn rejects_short_and_lying_packets() {
    assert_eq!(parse_header(&[0x27, 0xff, 0x00]), Err(ErrorCode::Truncated));
    let lying = [0x27, 0xff, 0x00, 0x40, 0, 1, 0x10, 0, 0, 1];
    assert_eq!(parse_header(&lying), Err(ErrorCode::Truncated));
  }

  #[test]
  fn oversized_content_is_refused() {
    let mut buf = [0u8; 16];
    assert_eq!(make_packet(&mut buf, 0, 0, 0, 0, &[0u8; 8]), Err(ErrorCode::InvalidParameter));
  }
}
