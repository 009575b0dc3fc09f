//! Drive-mode and recording toggles on top of the raw snapshot
//!
//! The facade turns the d-pad directions into throttle and steering values and keeps
//! two toggles: the drive mode cycles on every `select` press, the recording flag
//! flips on every `start` press. The toggles live in [`DriveToggles`], which the input
//! router updates on every debounced press, so a tap between two snapshots still
//! counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::info;

use super::input_state::{InputSnapshot, LogicalButton};

/// Who drives: the user, the autopilot for steering only, or the autopilot fully
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    #[default]
    User,
    LocalAngle,
    Local,
}

impl DriveMode {
    pub fn next(self) -> Self {
        match self {
            DriveMode::User => DriveMode::LocalAngle,
            DriveMode::LocalAngle => DriveMode::Local,
            DriveMode::Local => DriveMode::User,
        }
    }

    fn to_index(self) -> u8 {
        match self {
            DriveMode::User => 0,
            DriveMode::LocalAngle => 1,
            DriveMode::Local => 2,
        }
    }

    fn from_index(index: u8) -> Self {
        match index {
            1 => DriveMode::LocalAngle,
            2 => DriveMode::Local,
            _ => DriveMode::User,
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriveMode::User => "user",
            DriveMode::LocalAngle => "local_angle",
            DriveMode::Local => "local",
        })
    }
}

/// How left/right become a steering angle
///
/// `Literal` keeps the branch structure of the robot's controller part, where the
/// left/right branch writes `throttle` instead of `angle` in three of four cases. The
/// angle is then only defined for a pure left press and throttle gets overwritten.
/// `Symmetric` derives the angle from left/right exactly like throttle is derived
/// from up/down and leaves throttle alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringDerivation {
    Literal,
    #[default]
    Symmetric,
}

/// Scaling applied to the derived values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// -1.0 flips the throttle direction
    pub throttle_dir: f32,
    pub throttle_scale: f32,
    pub steering_scale: f32,
    pub steering: SteeringDerivation,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            throttle_dir: 1.0,
            throttle_scale: 1.0,
            steering_scale: 1.0,
            steering: SteeringDerivation::default(),
        }
    }
}

/// Facade output for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    /// `None` when the literal derivation leaves the angle undefined
    pub angle: Option<f32>,
    pub throttle: f32,
    pub mode: DriveMode,
    pub recording: bool,
}

// up&!down → 1.0, any down → 0.0, neither → -1.0
fn axis_value(positive: bool, negative: bool) -> f32 {
    match (positive, negative) {
        (true, false) => 1.0,
        (true, true) | (false, true) => 0.0,
        (false, false) => -1.0,
    }
}

/// Drive mode and recording flag, shared between the router and the facade
#[derive(Debug, Default)]
pub struct DriveToggles {
    mode: AtomicU8,
    recording: AtomicBool,
}

impl DriveToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> DriveMode {
        DriveMode::from_index(self.mode.load(Ordering::SeqCst))
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn toggle_drive_mode(&self) -> DriveMode {
        let previous = self
            .mode
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |index| {
                Some(DriveMode::from_index(index).next().to_index())
            })
            .unwrap_or_else(|index| index);
        let mode = DriveMode::from_index(previous).next();
        info!("Drive mode -> {}", mode);
        mode
    }

    pub fn toggle_recording(&self) -> bool {
        let recording = !self.recording.fetch_xor(true, Ordering::SeqCst);
        info!("Recording -> {}", recording);
        recording
    }

    /// React to a released → pressed transition of `button`
    pub fn on_press(&self, button: LogicalButton) {
        match button {
            LogicalButton::Select => {
                self.toggle_drive_mode();
            }
            LogicalButton::Start => {
                self.toggle_recording();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct ControllerFacade {
    settings: DriveSettings,
    toggles: Arc<DriveToggles>,
}

impl ControllerFacade {
    pub fn new(settings: DriveSettings) -> Self {
        info!(
            "Controller facade using {:?} steering derivation",
            settings.steering
        );
        Self {
            settings,
            toggles: Arc::new(DriveToggles::new()),
        }
    }

    /// Toggle state to hand to the input router
    pub fn toggles(&self) -> Arc<DriveToggles> {
        self.toggles.clone()
    }

    pub fn mode(&self) -> DriveMode {
        self.toggles.mode()
    }

    pub fn recording(&self) -> bool {
        self.toggles.recording()
    }

    pub fn toggle_drive_mode(&self) -> DriveMode {
        self.toggles.toggle_drive_mode()
    }

    pub fn toggle_recording(&self) -> bool {
        self.toggles.toggle_recording()
    }

    /// Derive throttle and angle from `snapshot` and attach the current toggles
    pub fn update(&self, snapshot: &InputSnapshot) -> DriveCommand {
        let mut throttle = axis_value(snapshot.up, snapshot.down);
        let angle = match self.settings.steering {
            SteeringDerivation::Symmetric => Some(axis_value(snapshot.left, snapshot.right)),
            SteeringDerivation::Literal => {
                if snapshot.left && !snapshot.right {
                    Some(1.0)
                } else {
                    throttle = if snapshot.left || snapshot.right {
                        0.0
                    } else {
                        -1.0
                    };
                    None
                }
            }
        };

        DriveCommand {
            angle: angle.map(|a| a * self.settings.steering_scale),
            throttle: throttle * self.settings.throttle_scale * self.settings.throttle_dir,
            mode: self.mode(),
            recording: self.recording(),
        }
    }
}
