// Inferno-AoIP
// Copyright (C) 2023 Teodor Woźniak
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.


//! Inferno control - request/event dispatch for controlling Dante-compatible devices
//!
//! A single-threaded loop waits on the sockets owned by a [`Library`] plus a line
//! input, lets the library do its protocol work, reports completions of tracked
//! requests and turns input lines into new requests.
//!
//! [`ArcClient`] is the bundled library: it queries channel lists and names and
//! changes subscriptions over the device's ARC and CMC services.
//!
//! ```no_run
//! use inferno_ctl::{arc_commands, ArcClient, ArcClientConfig, CancellationToken, DispatchLoop, FdLines, LoopConfig, MioWaiter};
//!
//! fn main() -> Result<(), inferno_ctl::DispatchError> {
//!   let config = LoopConfig::default();
//!   let client = ArcClient::open(ArcClientConfig::from(&config))?;
//!   let mut dispatch = DispatchLoop::new(
//!     client, MioWaiter::new()?, std::io::stdout(), arc_commands::processor(), &config, CancellationToken::new(),
//!   );
//!   dispatch.run(&mut FdLines::stdin())
//! }
//! ```
//!


pub mod arc_client;
pub mod arc_commands;
mod byte_utils;
pub mod cancel;
pub mod command;
mod common;
pub mod config;
pub mod dispatch_loop;
pub mod error;
pub mod library;
pub mod line_input;
pub mod protocol;
pub mod render;
pub mod request_tracker;
pub mod socket_set;
mod thread_utils;
pub mod waiter;

pub use arc_client::{ArcClient, ArcClientConfig, Operation};
pub use cancel::{install_ctrl_c_bridge, CancellationToken};
pub use command::{Action, Args, CommandProcessor, Grammar, Tok};
pub use config::{normalize_args, ConfigOverrides, LoopConfig};
pub use dispatch_loop::{compute_timeout, DispatchLoop, LoopState};
pub use error::{DispatchError, ErrorCode};
pub use library::{Library, LibraryEvent};
pub use line_input::{FdLines, LineSource, ScriptedLines};
pub use render::Message;
pub use request_tracker::{RequestHandle, RequestTracker};
pub use socket_set::{SocketSet, SocketSetCache};
pub use waiter::{MioWaiter, Waiter};
