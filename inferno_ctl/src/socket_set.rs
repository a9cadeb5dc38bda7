use std::collections::BTreeSet;
use std::os::fd::RawFd;

use crate::common::*;
use crate::library::Library;

/// Readable descriptors to hand to the wait primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketSet {
  read_fds: BTreeSet<RawFd>,
}

impl SocketSet {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn clear(&mut self) {
    self.read_fds.clear();
  }
  pub fn add_read(&mut self, fd: RawFd) {
    if fd < 0 {
      warn!("ignoring invalid descriptor {fd}");
      return;
    }
    self.read_fds.insert(fd);
  }
  pub fn remove(&mut self, fd: RawFd) -> bool {
    self.read_fds.remove(&fd)
  }
  pub fn contains(&self, fd: RawFd) -> bool {
    self.read_fds.contains(&fd)
  }
  pub fn len(&self) -> usize {
    self.read_fds.len()
  }
  pub fn is_empty(&self) -> bool {
    self.read_fds.is_empty()
  }
  pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
    self.read_fds.iter().copied()
  }
}

impl FromIterator<RawFd> for SocketSet {
  fn from_iter<I: IntoIterator<Item = RawFd>>(iter: I) -> Self {
    let mut set = SocketSet::new();
    for fd in iter {
      set.add_read(fd);
    }
    set
  }
}

impl std::fmt::Display for SocketSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[n={}", self.len())?;
    for fd in self.iter() {
      write!(f, " {fd}")?;
    }
    write!(f, "]")
  }
}

/// The socket set presented to the waiter, rebuilt wholesale when the library
/// reports that its sockets changed.
pub struct SocketSetCache {
  current: SocketSet,
  input_fd: Option<RawFd>,
  dirty: bool,
  rebuilds: u64,
}

impl SocketSetCache {
  pub fn new(input_fd: Option<RawFd>) -> Self {
    Self { current: SocketSet::new(), input_fd, dirty: true, rebuilds: 0 }
  }

  pub fn invalidate(&mut self) {
    self.dirty = true;
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn set_input_fd(&mut self, input_fd: Option<RawFd>) {
    if self.input_fd != input_fd {
      self.input_fd = input_fd;
      self.dirty = true;
    }
  }

  pub fn rebuild<L: Library + ?Sized>(&mut self, library: &L) -> &SocketSet {
    self.current.clear();
    library.fill_sockets(&mut self.current);
    if let Some(fd) = self.input_fd {
      self.current.add_read(fd);
    }
    self.dirty = false;
    self.rebuilds += 1;
    debug!("updated sockets, sockets are now {}", self.current);
    &self.current
  }

  /// Rebuilds only if dirty, returning the set that is safe to wait on.
  pub fn refresh<L: Library + ?Sized>(&mut self, library: &L) -> &SocketSet {
    if self.dirty {
      self.rebuild(library);
    }
    &self.current
  }

  pub fn current(&self) -> &SocketSet {
    &self.current
  }

  pub fn input_fd(&self) -> Option<RawFd> {
    self.input_fd
  }

  pub fn rebuild_count(&self) -> u64 {
    self.rebuilds
  }
}
