use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::common::*;
use crate::socket_set::SocketSet;

const MAX_EVENTS: usize = 64;

/// The blocking wait primitive of the dispatch loop.
pub trait Waiter {
  /// Blocks until a descriptor of `set` is readable or `timeout` passes, and
  /// returns the readable subset. An `Interrupted` error means "try again".
  fn wait(&mut self, set: &SocketSet, timeout: Duration) -> io::Result<SocketSet>;
}

/// `mio::Poll` based waiter over raw descriptors owned by someone else.
///
/// mio readiness is edge-triggered, so every registered descriptor is re-armed
/// before each wait: a descriptor that still has unread data is reported again,
/// the same as `select()` would.
pub struct MioWaiter {
  poll: Poll,
  events: Events,
  registered: SocketSet,
  /// Descriptors epoll refuses (regular files redirected to stdin); always readable.
  always_ready: SocketSet,
}

impl MioWaiter {
  pub fn new() -> io::Result<Self> {
    Ok(Self {
      poll: Poll::new()?,
      events: Events::with_capacity(MAX_EVENTS),
      registered: SocketSet::new(),
      always_ready: SocketSet::new(),
    })
  }

  fn sync_registrations(&mut self, set: &SocketSet) -> io::Result<()> {
    let stale = self.registered.iter().filter(|fd| !set.contains(*fd)).collect::<Vec<_>>();
    for fd in stale {
      // fails if the owner already closed it, which removes it from epoll anyway
      self.poll.registry().deregister(&mut SourceFd(&fd)).log_and_forget(&format!("deregistering fd {fd}"));
      self.registered.remove(fd);
    }
    let gone = self.always_ready.iter().filter(|fd| !set.contains(*fd)).collect::<Vec<_>>();
    for fd in gone {
      self.always_ready.remove(fd);
    }

    for fd in set.iter() {
      if self.always_ready.contains(fd) {
        continue;
      }
      if self.registered.contains(fd) {
        self.rearm(fd)?;
        continue;
      }
      match self.poll.registry().register(&mut SourceFd(&fd), token(fd), Interest::READABLE) {
        Ok(()) => self.registered.add_read(fd),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
          debug!("fd {fd} cannot be polled, treating it as always readable");
          self.always_ready.add_read(fd);
        }
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }

  fn rearm(&mut self, fd: RawFd) -> io::Result<()> {
    match self.poll.registry().reregister(&mut SourceFd(&fd), token(fd), Interest::READABLE) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        // closed and reopened under the same number behind our back
        self.poll.registry().register(&mut SourceFd(&fd), token(fd), Interest::READABLE)
      }
      Err(e) => Err(e),
    }
  }
}

fn token(fd: RawFd) -> Token {
  Token(fd as usize)
}

impl Waiter for MioWaiter {
  fn wait(&mut self, set: &SocketSet, timeout: Duration) -> io::Result<SocketSet> {
    self.sync_registrations(set)?;
    let timeout = if self.always_ready.is_empty() { timeout } else { Duration::ZERO };
    self.poll.poll(&mut self.events, Some(timeout))?;
    let mut ready = self.always_ready.clone();
    for event in self.events.iter() {
      let fd = event.token().0 as RawFd;
      if event.is_readable() || event.is_read_closed() || event.is_error() {
        ready.add_read(fd);
      }
    }
    trace!("waited up to {timeout:?} on {set}, ready {ready}");
    Ok(ready)
  }
}
