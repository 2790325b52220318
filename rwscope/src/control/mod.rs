//! # Control Plane
//!
//! ```text
//! front end ──enqueue──▶ CommandQueue ──▶ StateMediator ──write──▶ kernel maps
//!     │                                                               ▲
//!     └──────────────────── ControlHandle::watched_pids ──read────────┘
//! ```
//!
//! - `command` - Tagged [`Command`] enum and its JSON form
//! - `queue` - Bounded, drop-on-full [`CommandQueue`]
//! - `mediator` - Single-writer [`StateMediator`] thread
//! - `handle` - [`ControlHandle`], the only thing a front end holds

pub mod command;
pub mod handle;
pub mod mediator;
pub mod queue;

pub use command::Command;
pub use handle::ControlHandle;
pub use mediator::StateMediator;
pub use queue::{command_queue, CommandQueue, DEFAULT_QUEUE_CAPACITY};
