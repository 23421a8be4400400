//! Consumer-side protocol engine for the spool broker.
//!
//! A [`Connection`] terminates one client stream. Its connection loop reads
//! line commands and hands them to a [`Dispatcher`]; once the client
//! subscribes, a second task (the delivery loop) pushes channel messages to
//! the client as long as the client has granted credit with `RDY`.
//!
//! ```text
//!  client ── lines ──> connection loop ──> dispatcher ──> SUB/RDY/FIN/REQ
//!     ^                     │                               │
//!     │                     │ exit signal                   │ credit (watch)
//!     │                     v                               v
//!     └──── frames ─── FrameSink <──── delivery loop <── channel messages
//! ```
//!
//! The two loops share no mutable state. Credit travels over a watch channel,
//! the exit signal over a oneshot fired when the connection loop ends, and
//! every frame goes through one [`FrameSink`] so writes never interleave.
//!
//! The queue engine behind topics and channels is a collaborator reached
//! through [`QueueEngine`]; [`MemoryQueue`] is an in-process implementation.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod codec;
mod commands;
pub mod connection;
mod delivery;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod queue;
pub mod state;

pub use client::Client;
pub use codec::{FrameSink, read_frame};
pub use connection::{Connection, ConnectionConfig};
pub use dispatch::{CommandResult, Dispatcher, Handler};
pub use error::{ClientError, ConnectionError};
pub use memory::MemoryQueue;
pub use queue::{Channel, Message, MessageId, QueueEngine, QueueError, Topic};
pub use state::{ClientState, Phase};
