use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use futures::FutureExt;

use crate::common::*;
use crate::thread_utils::run_future_in_new_thread;

/// Shared "keep running" flag, checked by the dispatch loop at the top of each iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }
  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
  pub fn is_running(&self) -> bool {
    !self.is_cancelled()
  }
}

/// Cancels `token` on the first Ctrl-C. The helper thread touches nothing else.
pub fn install_ctrl_c_bridge(token: CancellationToken) -> io::Result<JoinHandle<()>> {
  run_future_in_new_thread("ctrl_c", move || {
    async move {
      match tokio::signal::ctrl_c().await {
        Ok(()) => {
          info!("received ctrl+c, stopping");
          token.cancel();
        }
        Err(e) => error!("unable to listen for ctrl+c: {e:?}"),
      }
    }
    .boxed_local()
  })
}
