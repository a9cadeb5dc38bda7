use std::fmt;
use std::time::{Duration, Instant};

use crate::common::*;
use crate::error::ErrorCode;

pub const DEFAULT_CAPACITY: usize = 128;
pub const DESCRIPTION_MAX_LEN: usize = 63;

/// Opaque identity of one in-flight library operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u32);

impl RequestHandle {
  /// Reserved value meaning "no request".
  pub const NULL: RequestHandle = RequestHandle(0);

  pub fn new(value: u32) -> Self {
    Self(value)
  }
  pub fn value(&self) -> u32 {
    self.0
  }
  pub fn is_null(&self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for RequestHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:#010x}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(usize);

impl SlotId {
  pub fn index(&self) -> usize {
    self.0
  }
}

#[derive(Debug, Clone)]
pub struct Slot {
  handle: RequestHandle,
  in_use: bool,
  description: String,
  created: Option<Instant>,
}

impl Slot {
  fn empty() -> Self {
    Self { handle: RequestHandle::NULL, in_use: false, description: String::new(), created: None }
  }
  pub fn handle(&self) -> RequestHandle {
    self.handle
  }
  pub fn description(&self) -> &str {
    &self.description
  }
  pub fn age(&self) -> Duration {
    self.created.map(|c| c.elapsed()).unwrap_or_default()
  }
}

/// Outcome of matching a completion against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
  pub handle: RequestHandle,
  pub description: String,
  pub elapsed: Duration,
}

/// Fixed-capacity table correlating library request handles with descriptions.
///
/// A slot is reserved (`allocate`) before the operation is issued, then gets its
/// handle (`assign`) once the library accepted the operation. It is freed either
/// by the completion (`complete`) or by the issuer when issuing fails (`release`).
pub struct RequestTracker {
  slots: Vec<Slot>,
}

impl RequestTracker {
  pub fn new(capacity: usize) -> Self {
    Self { slots: (0..capacity).map(|_| Slot::empty()).collect() }
  }

  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  pub fn allocate(&mut self, description: &str) -> Result<SlotId, ErrorCode> {
    match self.slots.iter().position(|s| !s.in_use) {
      Some(index) => {
        let slot = &mut self.slots[index];
        slot.in_use = true;
        slot.handle = RequestHandle::NULL;
        slot.description = truncate(description, DESCRIPTION_MAX_LEN).to_owned();
        slot.created = Some(Instant::now());
        Ok(SlotId(index))
      }
      None => {
        error!("error allocating request '{description}': no more requests");
        Err(ErrorCode::NoBufs)
      }
    }
  }

  pub fn assign(&mut self, slot: SlotId, handle: RequestHandle) {
    debug_assert!(self.find_by_handle(handle).is_none(), "handle {handle} tracked twice");
    if let Some(s) = self.slots.get_mut(slot.0).filter(|s| s.in_use) {
      s.handle = handle;
    } else {
      warn!("assigning handle {handle} to a free slot {}", slot.0);
    }
  }

  /// Frees the slot. Returns `false` when the slot was not in use.
  pub fn release(&mut self, slot: SlotId) -> bool {
    match self.slots.get_mut(slot.0) {
      Some(s) if s.in_use => {
        *s = Slot::empty();
        true
      }
      _ => false,
    }
  }

  pub fn find_by_handle(&self, handle: RequestHandle) -> Option<SlotId> {
    if handle.is_null() {
      return None;
    }
    self.slots.iter().position(|s| s.in_use && s.handle == handle).map(SlotId)
  }

  pub fn get(&self, slot: SlotId) -> Option<&Slot> {
    self.slots.get(slot.0).filter(|s| s.in_use)
  }

  /// Looks the handle up and releases its slot.
  pub fn complete(&mut self, handle: RequestHandle) -> Option<Completed> {
    let slot = self.find_by_handle(handle)?;
    let s = &self.slots[slot.0];
    let completed = Completed { handle, description: s.description.clone(), elapsed: s.age() };
    self.release(slot);
    Some(completed)
  }

  pub fn outstanding(&self) -> usize {
    self.slots.iter().filter(|s| s.in_use).count()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Slot> {
    self.slots.iter().filter(|s| s.in_use)
  }
}

impl Default for RequestTracker {
  fn default() -> Self {
    Self::new(DEFAULT_CAPACITY)
  }
}

fn truncate(s: &str, max_len: usize) -> &str {
  if s.len() <= max_len {
    return s;
  }
  let mut end = max_len;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  &s[..end]
}

#[cfg(test)]
mod tests {
  use super::*;

  fn issue(tracker: &mut RequestTracker, description: &str, handle: u32) -> SlotId {
    let slot = tracker.allocate(description).unwrap();
    tracker.assign(slot, RequestHandle::new(handle));
    slot
  }

  #[test]
  fn completions_find_their_own_slot() {
    let mut tracker = RequestTracker::new(8);
    for h in 1..=8 {
      issue(&mut tracker, &format!("req {h}"), h * 10);
    }
    for h in [30, 10, 80, 50, 20, 70, 40, 60] {
      let completed = tracker.complete(RequestHandle::new(h)).unwrap();
      assert_eq!(completed.description, format!("req {}", h / 10));
      assert!(tracker.find_by_handle(RequestHandle::new(h)).is_none());
    }
    assert_eq!(tracker.outstanding(), 0);
  }

  #[test]
  fn released_slot_is_reused() {
    let mut tracker = RequestTracker::new(2);
    let a = issue(&mut tracker, "a", 1);
    issue(&mut tracker, "b", 2);
    tracker.complete(RequestHandle::new(1));
    let c = tracker.allocate("c").unwrap();
    assert_eq!(a, c);
  }

  #[test]
  fn exhaustion_leaves_existing_entries_alone() {
    let mut tracker = RequestTracker::new(4);
    for h in 1..=4 {
      issue(&mut tracker, &format!("req {h}"), h);
    }
    assert_eq!(tracker.allocate("one too many"), Err(ErrorCode::NoBufs));
    assert_eq!(tracker.outstanding(), 4);
    for h in 1..=4 {
      let slot = tracker.find_by_handle(RequestHandle::new(h)).unwrap();
      assert_eq!(tracker.get(slot).unwrap().description(), format!("req {h}"));
    }
  }

  #[test]
  fn null_handle_never_matches() {
    let mut tracker = RequestTracker::new(2);
    tracker.allocate("not yet issued").unwrap();
    assert!(tracker.find_by_handle(RequestHandle::NULL).is_none());
    assert!(tracker.complete(RequestHandle::NULL).is_none());
    assert_eq!(tracker.outstanding(), 1);
  }

  #[test]
  fn double_release_is_harmless() {
    let mut tracker = RequestTracker::new(1);
    let slot = tracker.allocate("x").unwrap();
    assert!(tracker.release(slot));
    assert!(!tracker.release(slot));
    assert_eq!(tracker.outstanding(), 0);
  }

  #[test]
  fn long_descriptions_are_cut_on_char_boundary() {
    let mut tracker = RequestTracker::new(1);
    let long = "ż".repeat(40);
    let slot = tracker.allocate(&long).unwrap();
    let d = tracker.get(slot).unwrap().description();
    assert!(d.len() <= DESCRIPTION_MAX_LEN);
    assert!(long.starts_with(d));
  }

  #[test]
  fn handles_display_like_pointers() {
    assert_eq!(RequestHandle::new(0x2a).to_string(), "0x0000002a");
  }
}
