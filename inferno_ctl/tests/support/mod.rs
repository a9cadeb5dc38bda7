#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use inferno_ctl::{
  Action, Args, CancellationToken, CommandProcessor, DispatchError, DispatchLoop, ErrorCode, Grammar, Library, LibraryEvent,
  LoopConfig, RequestHandle, SocketSet, Tok, Waiter,
};

/// Stands in for a protocol library: hands out sequential handles and delivers
/// scripted event batches, one batch per `process` call.
pub struct MockLibrary {
  pub fds: Vec<RawFd>,
  pub next_action: Option<Instant>,
  /// Delivered one batch per `process` call.
  pub batches: VecDeque<Vec<LibraryEvent>>,
  pub process_calls: usize,
  pub fail_process: Option<ErrorCode>,
  pub refuse_issue: Option<ErrorCode>,
  pub issued: Vec<String>,
  pub last_handle: u32,
  pub events: VecDeque<LibraryEvent>,
}

impl MockLibrary {
  pub fn new() -> Self {
    Self {
      fds: vec![10],
      next_action: None,
      batches: VecDeque::new(),
      process_calls: 0,
      fail_process: None,
      refuse_issue: None,
      issued: vec![],
      last_handle: 0,
      events: VecDeque::new(),
    }
  }

  pub fn on_next_process(&mut self, batch: Vec<LibraryEvent>) {
    self.batches.push_back(batch);
  }
}

pub fn success(handle: u32) -> LibraryEvent {
  LibraryEvent::Completed { handle: RequestHandle::new(handle), result: Ok(None) }
}

impl Library for MockLibrary {
  type Operation = String;

  fn fill_sockets(&self, set: &mut SocketSet) {
    for fd in &self.fds {
      set.add_read(*fd);
    }
  }

  fn next_action_time(&self) -> Option<Instant> {
    self.next_action
  }

  fn process(&mut self, _ready: &SocketSet) -> Result<(), DispatchError> {
    self.process_calls += 1;
    if let Some(code) = self.fail_process {
      return Err(code.into());
    }
    if let Some(batch) = self.batches.pop_front() {
      self.events.extend(batch);
    }
    Ok(())
  }

  fn issue(&mut self, operation: String) -> Result<RequestHandle, ErrorCode> {
    if let Some(code) = self.refuse_issue {
      return Err(code);
    }
    self.issued.push(operation);
    self.last_handle += 1;
    Ok(RequestHandle::new(self.last_handle))
  }

  fn take_event(&mut self) -> Option<LibraryEvent> {
    self.events.pop_front()
  }
}

/// Records every wait; answers from a script, then with the default readiness.
pub struct FakeWaiter {
  pub calls: Vec<(SocketSet, Duration)>,
  pub script: VecDeque<io::Result<SocketSet>>,
  /// Without a script entry: report the whole set ready, or sleep the timeout and report nothing.
  pub all_ready: bool,
}

impl FakeWaiter {
  pub fn all_ready() -> Self {
    Self { calls: vec![], script: VecDeque::new(), all_ready: true }
  }
  pub fn idle() -> Self {
    Self { all_ready: false, ..Self::all_ready() }
  }
  pub fn timeouts(&self) -> Vec<Duration> {
    self.calls.iter().map(|(_, timeout)| *timeout).collect()
  }
}

impl Waiter for FakeWaiter {
  fn wait(&mut self, set: &SocketSet, timeout: Duration) -> io::Result<SocketSet> {
    self.calls.push((set.clone(), timeout));
    if let Some(result) = self.script.pop_front() {
      return result;
    }
    if self.all_ready {
      Ok(set.clone())
    } else {
      std::thread::sleep(timeout);
      Ok(SocketSet::new())
    }
  }
}

fn echo(args: &Args) -> Result<Action<String>, String> {
  Ok(Action::Issue { description: "Echo".to_owned(), operation: args.word(0)?.to_owned() })
}

fn shout(args: &Args) -> Result<Action<String>, String> {
  Ok(Action::Issue { description: "Shout".to_owned(), operation: args.word(0)?.to_uppercase() })
}

fn limited(args: &Args) -> Result<Action<String>, String> {
  let n: u8 = args.number(0)?;
  if n > 10 {
    return Err(format!("{n} is more than 10"));
  }
  Ok(Action::Issue { description: format!("Count {n}"), operation: n.to_string() })
}

/// `e WORD` and `e a|b` overlap; `e WORD` is declared first.
pub fn commands() -> CommandProcessor<String> {
  CommandProcessor::with_builtins(vec![
    Grammar::new('e', &[Tok::Lit("e"), Tok::Word], "e WORD    echo", echo),
    Grammar::new('e', &[Tok::Lit("e"), Tok::OneOf(&["a", "b"])], "e a|b     shout", shout),
    Grammar::new('n', &[Tok::Lit("n"), Tok::Uint], "n N       count up to 10", limited),
  ])
}

pub type TestLoop = DispatchLoop<MockLibrary, FakeWaiter, Vec<u8>>;

pub fn dispatch(library: MockLibrary, waiter: FakeWaiter, capacity: usize) -> TestLoop {
  let config = LoopConfig { request_capacity: capacity, poll_ceiling_ms: 500, ..Default::default() };
  DispatchLoop::new(library, waiter, Vec::new(), commands(), &config, CancellationToken::new())
}

pub fn output(dispatch: &TestLoop) -> String {
  String::from_utf8_lossy(dispatch.output()).into_owned()
}
