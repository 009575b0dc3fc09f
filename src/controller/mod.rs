//! Input acquisition for the joystick bonnet
//!
//! Two detectors feed one store:
//!
//! 1. [`edge_monitor`] - debounced GPIO edges of the digital buttons
//! 2. [`axis_discretizer`] - polled ADC samples turned into four direction latches
//! 3. [`controller_handle`] - wiring and lifecycle of both plus the publisher
//!
//! # Architecture
//!
//! ```text
//! GPIO edges ──► DigitalEdgeMonitor ──┐
//!                                     ├─► InputRouter ──► InputStateStore ──► PublishScheduler
//! ADS1015    ──► AnalogPoller ────────┘        │                                  │
//!                (synthetic pins 1000..1003)   ├─► KeySink                 ControllerFacade
//!                                              └─► DriveToggles ◄─────────────────┘
//! ```
//!
//! Both detectors go through [`transition::InputRouter::apply`], the only writer of
//! button state.

pub mod axis_discretizer;
pub mod controller_handle;
pub mod edge_monitor;
pub mod facade;
pub mod input_state;
pub mod pin_map;
pub mod transition;

pub use controller_handle::{BonnetError, BonnetHandle};
pub use facade::{ControllerFacade, DriveCommand, DriveMode, DriveToggles};
pub use input_state::{InputSnapshot, InputStateStore, LogicalButton};
