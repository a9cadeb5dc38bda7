use std::io;
use std::{pin::Pin, thread::JoinHandle};

use futures::Future;

use crate::common::*;

/// Runs a future to completion on a fresh single-threaded tokio runtime in its own thread.
pub fn run_future_in_new_thread(
  name: impl ToString,
  future_cb: impl FnOnce() -> Pin<Box<dyn Future<Output = ()> + 'static>> + Send + 'static,
) -> io::Result<JoinHandle<()>> {
  let name = name.to_string();
  std::thread::Builder::new().name(name.clone()).spawn(move || {
    let runtime = tokio::runtime::Builder::new_current_thread().thread_name(name.clone()).enable_all().build();
    match runtime {
      Ok(rt) => rt.block_on(future_cb()),
      Err(e) => error!("thread {name}: unable to start runtime: {e:?}"),
    }
  })
}
