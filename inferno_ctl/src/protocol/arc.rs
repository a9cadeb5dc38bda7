use bytebuffer::ByteBuffer;

use crate::byte_utils::*;
use crate::error::ErrorCode;
use crate::render::{Message, RxChannel, TxChannel};

use super::req_resp::HEADER_LENGTH;

pub const PORT: u16 = 4440;
pub const START_CODE: u16 = 0x27ff;

pub const OP_CHANNEL_COUNTS: u16 = 0x1000;
pub const OP_DEVICE_NAME: u16 = 0x1002;
pub const OP_DEVICE_NAMES: u16 = 0x1003;
pub const OP_TX_CHANNELS: u16 = 0x2000;
pub const OP_TX_FRIENDLY_NAMES: u16 = 0x2010;
pub const OP_RX_CHANNELS: u16 = 0x3000;
pub const OP_SUBSCRIBE: u16 = 0x3010;

/// Device and channel names are limited to 31 bytes on the wire.
pub const NAME_MAX_LEN: usize = 0x20 - 1;

const RX_RECORD_LEN: usize = 20;
const TX_RECORD_LEN: usize = 8;
const TX_FRIENDLY_RECORD_LEN: usize = 6;

/// Body of the paged channel list requests; `start` is the 1-based first channel.
pub fn page_request(start: u16) -> Vec<u8> {
  vec![0x00, 0x01, H(start), L(start)]
}

/// Body of a subscribe request for one rx channel; `None` unsubscribes it.
///
/// String offsets are counted from the start of the packet, header included.
pub fn subscribe_request(rx_channel: u16, source: Option<(&str, &str)>) -> Vec<u8> {
  let mut body = ByteBuffer::new();
  body.write_u8(0x10);
  body.write_u8(1);
  body.write_u16(rx_channel);
  match source {
    Some((tx_channel, tx_device)) => {
      let strings_offset = HEADER_LENGTH + 2 + 6;
      let tx_channel_offset = strings_offset;
      let tx_device_offset = tx_channel_offset + tx_channel.len() + 1;
      body.write_u16(tx_channel_offset as u16);
      body.write_u16(tx_device_offset as u16);
      body.write_bytes(tx_channel.as_bytes());
      body.write_u8(0);
      body.write_bytes(tx_device.as_bytes());
      body.write_u8(0);
    }
    None => {
      body.write_u16(0);
      body.write_u16(0);
    }
  }
  body.into_vec()
}

fn str_at(packet: &[u8], offset: u16) -> Result<Option<String>, ErrorCode> {
  if (offset as usize) < HEADER_LENGTH {
    return Ok(None);
  }
  read_0term_str_from_buffer(packet, offset as usize).map(|s| Some(s.to_owned()))
}

fn record_count(content: &[u8], record_len: usize) -> Result<usize, ErrorCode> {
  let count = *content.first().ok_or(ErrorCode::Truncated)? as usize;
  if content.len() < 2 + count * record_len {
    return Err(ErrorCode::Truncated);
  }
  Ok(count)
}

pub fn decode_channel_counts(content: &[u8]) -> Result<Message, ErrorCode> {
  Ok(Message::ChannelCounts { tx: read_u16_at(content, 2)?, rx: read_u16_at(content, 4)? })
}

pub fn decode_device_name(content: &[u8]) -> Result<Message, ErrorCode> {
  Ok(Message::DeviceName(read_0term_str_from_buffer(content, 0)?.to_owned()))
}

/// `packet` is the whole datagram; the name offsets inside are absolute.
pub fn decode_device_names(packet: &[u8]) -> Result<Message, ErrorCode> {
  let content = &packet[HEADER_LENGTH.min(packet.len())..];
  let board_offset = read_u16_at(content, 6)?;
  let friendly_offset = read_u16_at(content, 12)?;
  let factory_offset = read_u16_at(content, 14)?;
  Ok(Message::DeviceNames {
    friendly: str_at(packet, friendly_offset)?.unwrap_or_default(),
    factory: str_at(packet, factory_offset)?.unwrap_or_default(),
    board: str_at(packet, board_offset)?.unwrap_or_default(),
  })
}

pub fn decode_rx_channels(packet: &[u8], more: bool) -> Result<Message, ErrorCode> {
  let content = &packet[HEADER_LENGTH.min(packet.len())..];
  let count = record_count(content, RX_RECORD_LEN)?;
  let mut channels = Vec::with_capacity(count);
  for i in 0..count {
    let record = 2 + i * RX_RECORD_LEN;
    channels.push(RxChannel {
      id: read_u16_at(content, record)?,
      tx_channel: str_at(packet, read_u16_at(content, record + 6)?)?,
      tx_device: str_at(packet, read_u16_at(content, record + 8)?)?,
      name: str_at(packet, read_u16_at(content, record + 10)?)?.unwrap_or_default(),
      status: read_u32_at(content, record + 12)?,
    });
  }
  Ok(Message::RxChannels { channels, more })
}

pub fn decode_tx_channels(packet: &[u8], more: bool) -> Result<Message, ErrorCode> {
  let content = &packet[HEADER_LENGTH.min(packet.len())..];
  let count = record_count(content, TX_RECORD_LEN)?;
  let channels = (0..count)
    .map(|i| {
      let record = 2 + i * TX_RECORD_LEN;
      Ok(TxChannel {
        id: read_u16_at(content, record)?,
        name: str_at(packet, read_u16_at(content, record + 6)?)?.unwrap_or_default(),
      })
    })
    .collect::<Result<Vec<_>, ErrorCode>>()?;
  Ok(Message::TxChannels { channels, friendly: false, more })
}

pub fn decode_tx_friendly_names(packet: &[u8], more: bool) -> Result<Message, ErrorCode> {
  let content = &packet[HEADER_LENGTH.min(packet.len())..];
  let count = record_count(content, TX_FRIENDLY_RECORD_LEN)?;
  let channels = (0..count)
    .map(|i| {
      let record = 2 + i * TX_FRIENDLY_RECORD_LEN;
      Ok(TxChannel {
        id: read_u16_at(content, record)?,
        name: str_at(packet, read_u16_at(content, record + 4)?)?.unwrap_or_default(),
      })
    })
    .collect::<Result<Vec<_>, ErrorCode>>()?;
  Ok(Message::TxChannels { channels, friendly: true, more })
}
