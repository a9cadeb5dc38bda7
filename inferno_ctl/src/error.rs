use std::io;

use thiserror::Error;

/// Result codes shared by the dispatch loop and the libraries it drives.
///
/// `Display` is the error-to-string facility used for every printed result.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
  #[error("no buffers available")]
  NoBufs,
  #[error("interrupted")]
  Interrupted,
  #[error("timed out")]
  Timeout,
  #[error("invalid parameter")]
  InvalidParameter,
  #[error("invalid data")]
  InvalidData,
  #[error("truncated")]
  Truncated,
  #[error("not found")]
  NotFound,
  #[error("device returned error {0:#06x}")]
  Remote(u16),
  #[error("system error: {0}")]
  System(io::ErrorKind),
}

impl From<&io::Error> for ErrorCode {
  fn from(e: &io::Error) -> Self {
    match e.kind() {
      io::ErrorKind::Interrupted => ErrorCode::Interrupted,
      io::ErrorKind::TimedOut => ErrorCode::Timeout,
      io::ErrorKind::NotFound => ErrorCode::NotFound,
      io::ErrorKind::InvalidInput => ErrorCode::InvalidParameter,
      io::ErrorKind::InvalidData => ErrorCode::InvalidData,
      io::ErrorKind::UnexpectedEof => ErrorCode::Truncated,
      other => ErrorCode::System(other),
    }
  }
}

/// Errors that end the dispatch loop (or stop the program before it starts).
#[derive(Error, Debug)]
pub enum DispatchError {
  #[error("{0}")]
  Code(#[from] ErrorCode),
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
  #[error("configuration error: {0}")]
  Config(String),
}

impl DispatchError {
  pub fn code(&self) -> ErrorCode {
    match self {
      DispatchError::Code(c) => *c,
      DispatchError::Io(e) => ErrorCode::from(e),
      DispatchError::Config(_) => ErrorCode::InvalidParameter,
    }
  }
  pub fn exit_code(&self) -> i32 {
    match self {
      DispatchError::Config(_) => 2,
      _ => 1,
    }
  }
}
