//! epx-runtime
//!
//! Owns live attempts. Each attempt is a tokio task holding its
//! `AttemptState`; producers talk to it only through an ordered command queue,
//! so the engine always has exactly one writer.
//!
//! - Commands in: `mpsc`, each with a `oneshot` reply.
//! - Snapshots out: `watch`, readable without touching the actor.
//! - Terminal transitions flip a [`CancelToken`] that producers observe.

mod cancel;
mod dashboard;
mod error;
mod registry;
mod session;
mod timer;

pub use cancel::CancelToken;
pub use dashboard::{dashboard, DashboardRow, DashboardSummary, StatusBand};
pub use error::RuntimeError;
pub use registry::SessionRegistry;
pub use session::{spawn_session, CameraReport, SessionHandle, SessionSnapshot};
pub use timer::spawn_session_timer;
