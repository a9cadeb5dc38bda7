use std::time::Instant;

use crate::error::{DispatchError, ErrorCode};
use crate::render::Message;
use crate::request_tracker::RequestHandle;
use crate::socket_set::SocketSet;

/// Something the library wants the dispatch loop to know about.
///
/// Events are queued by the library while it works and drained by the loop right
/// after each `process` call, so they are always observed on the loop's thread.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
  /// The descriptor set the library needs watched is different now.
  SocketsChanged,
  /// A previously issued request finished.
  Completed { handle: RequestHandle, result: Result<Option<Message>, ErrorCode> },
  /// Unsolicited information worth printing.
  Notice(Message),
}

/// The collaborator driven by the dispatch loop: it owns the sockets and all
/// protocol work, the loop only waits and hands control back.
pub trait Library {
  type Operation;

  /// Adds every descriptor the library wants watched for readability.
  fn fill_sockets(&self, set: &mut SocketSet);

  /// When the library next needs `process` called even without network input.
  fn next_action_time(&self) -> Option<Instant>;

  /// Does all pending work for the ready descriptors. Errors are fatal to the loop.
  fn process(&mut self, ready: &SocketSet) -> Result<(), DispatchError>;

  /// Starts an asynchronous operation; its completion is reported later as a
  /// `LibraryEvent::Completed` carrying the returned handle.
  fn issue(&mut self, operation: Self::Operation) -> Result<RequestHandle, ErrorCode>;

  fn take_event(&mut self) -> Option<LibraryEvent>;

  fn prompt(&self) -> String {
    ">>> ".to_owned()
  }
}
