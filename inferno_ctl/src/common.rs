pub use log::{debug, error, info, trace, warn};

/// For results nobody can act on: logs the error with some context and drops it.
pub trait LogAndForget {
  fn log_and_forget(&self, context: &str);
}

impl<T, E: std::fmt::Debug> LogAndForget for Result<T, E> {
  fn log_and_forget(&self, context: &str) {
    if let Err(e) = self {
      debug!("{context}: ignoring {e:?}");
    }
  }
}
