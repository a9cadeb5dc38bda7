use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::os::fd::{AsRawFd, RawFd};

/// Where command lines come from.
pub trait LineSource {
  /// Descriptor to include in the socket set, if the source has one.
  fn fd(&self) -> Option<RawFd>;

  /// A complete line is already buffered, so reading won't block.
  fn has_buffered_line(&self) -> bool;

  /// Appends one line to `buf`; returns 0 at end of input.
  fn read_line(&mut self, buf: &mut String) -> io::Result<usize>;
}

/// Lines from a readable descriptor, normally stdin.
pub struct FdLines<R: Read + AsRawFd> {
  reader: BufReader<R>,
}

impl<R: Read + AsRawFd> FdLines<R> {
  pub fn new(inner: R) -> Self {
    Self { reader: BufReader::new(inner) }
  }
}

impl FdLines<io::Stdin> {
  pub fn stdin() -> Self {
    Self::new(io::stdin())
  }
}

impl<R: Read + AsRawFd> LineSource for FdLines<R> {
  fn fd(&self) -> Option<RawFd> {
    Some(self.reader.get_ref().as_raw_fd())
  }
  fn has_buffered_line(&self) -> bool {
    self.reader.buffer().contains(&b'\n')
  }
  /// Bytes that are not UTF-8 are replaced rather than failing the read.
  fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
    let mut raw = Vec::new();
    let len = self.reader.read_until(b'\n', &mut raw)?;
    buf.push_str(&String::from_utf8_lossy(&raw));
    Ok(len)
  }
}

/// Pre-recorded input, one result per read. Has no descriptor; ready while it
/// has something queued.
pub struct ScriptedLines {
  script: VecDeque<io::Result<String>>,
  eof_at_end: bool,
}

impl ScriptedLines {
  /// Input that reports end of file once the lines run out.
  pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
    Self { script: lines.into_iter().map(|l| Ok(l.into())).collect(), eof_at_end: true }
  }
  /// Input that goes quiet (never ready) once the lines run out.
  pub fn open_ended<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
    Self { eof_at_end: false, ..Self::new(lines) }
  }
  pub fn push_line(&mut self, line: impl Into<String>) {
    self.script.push_back(Ok(line.into()));
  }
  pub fn push_error(&mut self, kind: io::ErrorKind) {
    self.script.push_back(Err(io::Error::from(kind)));
  }
}

impl LineSource for ScriptedLines {
  fn fd(&self) -> Option<RawFd> {
    None
  }
  fn has_buffered_line(&self) -> bool {
    !self.script.is_empty() || self.eof_at_end
  }
  fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
    match self.script.pop_front() {
      None => Ok(0),
      Some(Ok(line)) => {
        let line = if line.ends_with('\n') { line } else { line + "\n" };
        buf.push_str(&line);
        Ok(line.len())
      }
      Some(Err(e)) => Err(e),
    }
  }
}
