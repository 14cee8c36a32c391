//! Controller subsystem for gamepad input handling
//!
//! 1. [`event_collector`] - gilrs events to [`GamepadEvent`](event_collector::GamepadEvent)
//! 2. [`event_processor`] - gamepad bindings to command intents
//! 3. [`controller_handle`] - blocking loop feeding the command router
//!
//! ```text
//! Gamepad ──► Collector ──► dispatch ──► CommandRouter
//!             (deadzone,    (Intent)
//!              repeats)
//! ```

pub mod controller_handle;
pub mod event_collector;
pub mod event_processor;

pub use controller_handle::{ControllerError, ControllerHandle, ControllerSettings};
