//! The poll-and-dispatch loop.
//!
//! One thread does everything: wait on the library's descriptors plus the input,
//! let the library process, drain its events, then read and act on at most one
//! line. The library is never re-entered; its completions are only observed
//! through the event queue drained right after `process`.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::command::{Action, CommandProcessor};
use crate::common::*;
use crate::config::LoopConfig;
use crate::error::{DispatchError, ErrorCode};
use crate::library::{Library, LibraryEvent};
use crate::line_input::LineSource;
use crate::render::Message;
use crate::request_tracker::{RequestHandle, RequestTracker};
use crate::socket_set::{SocketSet, SocketSetCache};
use crate::waiter::Waiter;

/// Wait granularity of the synchronous helpers.
pub const HELPER_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
  Running,
  /// Stopped cleanly: end of input, quit command or cancellation.
  Finished,
}

/// The wait timeout: the time until the library's next action, capped by `ceiling`.
pub fn compute_timeout(ceiling: Duration, next_action: Option<Instant>, now: Instant) -> Duration {
  match next_action {
    Some(at) => at.saturating_duration_since(now).min(ceiling),
    None => ceiling,
  }
}

pub struct DispatchLoop<L: Library, W: Waiter, O: Write> {
  library: L,
  waiter: W,
  out: O,
  tracker: RequestTracker,
  sockets: SocketSetCache,
  commands: CommandProcessor<L::Operation>,
  token: CancellationToken,
  ceiling: Duration,
  prompt_owed: bool,
  line: String,
}

impl<L: Library, W: Waiter, O: Write> DispatchLoop<L, W, O> {
  pub fn new(library: L, waiter: W, out: O, commands: CommandProcessor<L::Operation>, config: &LoopConfig, token: CancellationToken) -> Self {
    Self {
      library,
      waiter,
      out,
      tracker: RequestTracker::new(config.request_capacity),
      sockets: SocketSetCache::new(None),
      commands,
      token,
      ceiling: config.poll_ceiling(),
      prompt_owed: true,
      line: String::new(),
    }
  }

  pub fn tracker(&self) -> &RequestTracker {
    &self.tracker
  }
  pub fn library(&self) -> &L {
    &self.library
  }
  pub fn library_mut(&mut self) -> &mut L {
    &mut self.library
  }
  pub fn sockets(&self) -> &SocketSetCache {
    &self.sockets
  }
  pub fn token(&self) -> &CancellationToken {
    &self.token
  }
  pub fn output(&self) -> &O {
    &self.out
  }
  pub fn waiter(&self) -> &W {
    &self.waiter
  }

  /// Runs until end of input, quit or cancellation. Fatal errors have already
  /// been printed when they are returned.
  pub fn run<I: LineSource + ?Sized>(&mut self, input: &mut I) -> Result<(), DispatchError> {
    loop {
      if self.run_once(input)? == LoopState::Finished {
        return Ok(());
      }
    }
  }

  pub fn run_once<I: LineSource + ?Sized>(&mut self, input: &mut I) -> Result<LoopState, DispatchError> {
    if self.token.is_cancelled() {
      return Ok(LoopState::Finished);
    }
    if self.prompt_owed {
      write!(self.out, "{}", self.library.prompt())?;
      self.out.flush()?;
      self.prompt_owed = false;
    }
    self.drain_events()?;

    let input_fd = input.fd();
    if self.sockets.input_fd() != input_fd {
      self.sockets.set_input_fd(input_fd);
    }
    self.sockets.refresh(&self.library);

    let timeout = if input.has_buffered_line() {
      Duration::ZERO
    } else {
      compute_timeout(self.ceiling, self.library.next_action_time(), Instant::now())
    };
    let ready = match self.waiter.wait(self.sockets.current(), timeout) {
      Ok(ready) => ready,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(LoopState::Running),
      Err(e) => {
        writeln!(self.out, "Error waiting: {e}")?;
        return Err(e.into());
      }
    };

    let network_ready = ready.iter().any(|fd| Some(fd) != input_fd);
    if network_ready || self.action_due() {
      self.process(&ready)?;
    }

    let input_ready = input.has_buffered_line() || input_fd.map_or(false, |fd| ready.contains(fd));
    if input_ready {
      self.line.clear();
      match input.read_line(&mut self.line) {
        Ok(0) => {
          writeln!(self.out, "Exiting...")?;
          return Ok(LoopState::Finished);
        }
        Ok(_) => {
          let line = std::mem::take(&mut self.line);
          self.handle_line(&line)?;
          self.line = line;
          self.prompt_owed = true;
        }
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
        Err(e) => {
          writeln!(self.out, "Exiting with {e}")?;
          return Err(e.into());
        }
      }
    }

    Ok(if self.token.is_cancelled() { LoopState::Finished } else { LoopState::Running })
  }

  fn action_due(&self) -> bool {
    self.library.next_action_time().map_or(false, |at| at <= Instant::now())
  }

  fn process(&mut self, ready: &SocketSet) -> Result<(), DispatchError> {
    if let Err(e) = self.library.process(ready) {
      writeln!(self.out, "Error processing: {e}")?;
      return Err(e);
    }
    self.drain_events()
  }

  /// Applies every queued library event.
  pub fn drain_events(&mut self) -> Result<(), DispatchError> {
    while let Some(event) = self.library.take_event() {
      match event {
        LibraryEvent::SocketsChanged => self.sockets.invalidate(),
        LibraryEvent::Completed { handle, result } => {
          self.report_completion(handle, result)?;
          self.prompt_owed = true;
        }
        LibraryEvent::Notice(message) => {
          writeln!(self.out, "{message}")?;
          self.prompt_owed = true;
        }
      }
    }
    Ok(())
  }

  fn report_completion(&mut self, handle: RequestHandle, result: Result<Option<Message>, ErrorCode>) -> io::Result<()> {
    let result_text = match &result {
      Ok(_) => "success".to_owned(),
      Err(e) => e.to_string(),
    };
    match self.tracker.complete(handle) {
      Some(done) => {
        debug!("request {handle} ({}) took {:?}", done.description, done.elapsed);
        writeln!(self.out, "EVENT: completed request {handle} ({}) with result {result_text}", done.description)?;
      }
      None => writeln!(self.out, "EVENT: completed unknown request {handle} with result {result_text}")?,
    }
    if let Ok(Some(message)) = result {
      writeln!(self.out, "{message}")?;
    }
    Ok(())
  }

  /// Allocates a slot, then starts `operation`. Local failures (no free slot,
  /// library refusal) are printed and returned as `DispatchError::Code`, the
  /// slot is not kept.
  pub fn issue(&mut self, description: &str, operation: L::Operation) -> Result<RequestHandle, DispatchError> {
    let slot = match self.tracker.allocate(description) {
      Ok(slot) => slot,
      Err(e) => {
        writeln!(self.out, "Error issuing {description}: {e}")?;
        return Err(e.into());
      }
    };
    match self.library.issue(operation) {
      Ok(handle) if handle.is_null() => {
        self.tracker.release(slot);
        Ok(handle)
      }
      Ok(handle) => {
        self.tracker.assign(slot, handle);
        writeln!(self.out, "Action has request id {handle}")?;
        Ok(handle)
      }
      Err(e) => {
        self.tracker.release(slot);
        writeln!(self.out, "Error issuing {description}: {e}")?;
        Err(e.into())
      }
    }
  }

  /// Runs the loop without reading input until `handle` completes. Gives up with
  /// `Timeout` after `timeout`, or `Interrupted` if cancelled.
  pub fn wait_for_request(&mut self, handle: RequestHandle, timeout: Duration) -> Result<(), DispatchError> {
    let deadline = Instant::now() + timeout;
    loop {
      self.drain_events()?;
      if self.tracker.find_by_handle(handle).is_none() {
        return Ok(());
      }
      if self.token.is_cancelled() {
        return Err(ErrorCode::Interrupted.into());
      }
      let now = Instant::now();
      if now >= deadline {
        return Err(ErrorCode::Timeout.into());
      }
      self.sockets.refresh(&self.library);
      let mut set = self.sockets.current().clone();
      if let Some(fd) = self.sockets.input_fd() {
        set.remove(fd);
      }
      let interval = compute_timeout(HELPER_POLL_INTERVAL, self.library.next_action_time(), now).min(deadline - now);
      let ready = match self.waiter.wait(&set, interval) {
        Ok(ready) => ready,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => {
          writeln!(self.out, "Error waiting: {e}")?;
          return Err(e.into());
        }
      };
      if !ready.is_empty() || self.action_due() {
        self.process(&ready)?;
      }
    }
  }

  /// Runs commands one by one, waiting for each issued request before the next line.
  pub fn run_script<S: AsRef<str>>(&mut self, lines: impl IntoIterator<Item = S>, per_request_timeout: Duration) -> Result<(), DispatchError> {
    for line in lines {
      let line = line.as_ref().trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      if self.token.is_cancelled() {
        break;
      }
      writeln!(self.out, "CMD: {line}")?;
      if let Some(handle) = self.handle_line(line)? {
        match self.wait_for_request(handle, per_request_timeout) {
          Err(DispatchError::Code(e)) => writeln!(self.out, "Error waiting for request {handle}: {e}")?,
          other => other?,
        }
      }
    }
    Ok(())
  }

  /// Acts on one line; returns the handle of the request it started, if any.
  fn handle_line(&mut self, line: &str) -> Result<Option<RequestHandle>, DispatchError> {
    match self.commands.parse(line) {
      Action::Nothing => {}
      Action::Issue { description, operation } => match self.issue(&description, operation) {
        Ok(handle) if !handle.is_null() => return Ok(Some(handle)),
        Ok(_) | Err(DispatchError::Code(_)) => {}
        Err(e) => return Err(e),
      },
      Action::Help(family) => write!(self.out, "{}", self.commands.usage(family))?,
      Action::Reject { family, reason } => {
        writeln!(self.out, "{reason}")?;
        write!(self.out, "{}", self.commands.usage(Some(family)))?;
      }
      Action::Unrecognized(text) => {
        writeln!(self.out, "Unknown command '{text}', usage:")?;
        write!(self.out, "{}", self.commands.usage(None))?;
      }
      Action::Quit => self.token.cancel(),
      Action::ListRequests => self.list_requests()?,
    }
    Ok(None)
  }

  fn list_requests(&mut self) -> io::Result<()> {
    if self.tracker.outstanding() == 0 {
      return writeln!(self.out, "  no pending requests");
    }
    for slot in self.tracker.iter() {
      writeln!(self.out, "  {} {} ({} ms)", slot.handle(), slot.description(), slot.age().as_millis())?;
    }
    writeln!(self.out, "  {} of {} slots in use", self.tracker.outstanding(), self.tracker.capacity())
  }
}
