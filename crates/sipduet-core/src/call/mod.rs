//! Call control
//!
//! One [`CallController`] per user. Drive it by hand with
//! [`CallController::handle`] or move it onto a task with
//! [`CallController::spawn`].

mod controller;
mod runtime;

pub use controller::{BUSY_REASON, BusyPolicy, CallController, ControllerEvent, ControllerState};
pub use runtime::ControllerHandle;
