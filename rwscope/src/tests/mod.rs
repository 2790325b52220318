//! Crate-level tests against an in-memory kernel.
//!
//! | Module | Covers |
//! |--------|--------|
//! | `lifecycle` | Construction order, rollback at every step, stop ordering, map CRUD |
//! | `event_loop` | Record decoding, lost and transient accounting, close |
//! | `mediator` | Command semantics, best-effort application, queue overflow, fold property |

pub mod event_loop;
pub mod mediator;
