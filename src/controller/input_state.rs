//! Shared logical input state
//!
//! [`InputStateStore`] is the single source of truth for every logical button and
//! analog direction. Writers are the edge monitor and the analog poll loop, readers
//! are the publish scheduler and the controller facade. Each button is an independent
//! atomic, so a snapshot never sees a half-written field. Snapshots make no promise
//! about consistency across buttons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Closed set of logical inputs on the bonnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalButton {
    A,
    B,
    X,
    Y,
    Select,
    Start,
    Player1,
    Player2,
    Up,
    Down,
    Left,
    Right,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; 12] = [
        LogicalButton::A,
        LogicalButton::B,
        LogicalButton::X,
        LogicalButton::Y,
        LogicalButton::Select,
        LogicalButton::Start,
        LogicalButton::Player1,
        LogicalButton::Player2,
        LogicalButton::Up,
        LogicalButton::Down,
        LogicalButton::Left,
        LogicalButton::Right,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Analog stick directions, driven by the axis discretizer
    pub fn is_direction(self) -> bool {
        matches!(
            self,
            LogicalButton::Up | LogicalButton::Down | LogicalButton::Left | LogicalButton::Right
        )
    }
}

impl fmt::Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalButton::A => "a",
            LogicalButton::B => "b",
            LogicalButton::X => "x",
            LogicalButton::Y => "y",
            LogicalButton::Select => "select",
            LogicalButton::Start => "start",
            LogicalButton::Player1 => "player1",
            LogicalButton::Player2 => "player2",
            LogicalButton::Up => "up",
            LogicalButton::Down => "down",
            LogicalButton::Left => "left",
            LogicalButton::Right => "right",
        };
        f.write_str(name)
    }
}

/// Immutable copy of all button states at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub select: bool,
    pub start: bool,
    pub player1: bool,
    pub player2: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputSnapshot {
    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        match button {
            LogicalButton::A => self.a,
            LogicalButton::B => self.b,
            LogicalButton::X => self.x,
            LogicalButton::Y => self.y,
            LogicalButton::Select => self.select,
            LogicalButton::Start => self.start,
            LogicalButton::Player1 => self.player1,
            LogicalButton::Player2 => self.player2,
            LogicalButton::Up => self.up,
            LogicalButton::Down => self.down,
            LogicalButton::Left => self.left,
            LogicalButton::Right => self.right,
        }
    }

    pub fn pressed_count(&self) -> usize {
        LogicalButton::ALL
            .iter()
            .filter(|button| self.is_pressed(**button))
            .count()
    }
}

/// Per-button atomic state, shared by handle across all execution contexts
#[derive(Debug, Default)]
pub struct InputStateStore {
    states: [AtomicBool; 12],
}

impl InputStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the state of one button, returning the previous value
    pub fn set_button(&self, button: LogicalButton, pressed: bool) -> bool {
        self.states[button.slot()].swap(pressed, Ordering::AcqRel)
    }

    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        self.states[button.slot()].load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            a: self.is_pressed(LogicalButton::A),
            b: self.is_pressed(LogicalButton::B),
            x: self.is_pressed(LogicalButton::X),
            y: self.is_pressed(LogicalButton::Y),
            select: self.is_pressed(LogicalButton::Select),
            start: self.is_pressed(LogicalButton::Start),
            player1: self.is_pressed(LogicalButton::Player1),
            player2: self.is_pressed(LogicalButton::Player2),
            up: self.is_pressed(LogicalButton::Up),
            down: self.is_pressed(LogicalButton::Down),
            left: self.is_pressed(LogicalButton::Left),
            right: self.is_pressed(LogicalButton::Right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_with_everything_released() {
        let store = InputStateStore::new();
        assert_eq!(store.snapshot(), InputSnapshot::default());
        assert_eq!(store.snapshot().pressed_count(), 0);
    }

    #[test]
    fn set_button_only_touches_its_field() {
        let store = InputStateStore::new();

        assert!(!store.set_button(LogicalButton::Start, true));
        let snapshot = store.snapshot();
        for button in LogicalButton::ALL {
            assert_eq!(snapshot.is_pressed(button), button == LogicalButton::Start);
        }

        assert!(store.set_button(LogicalButton::Start, false));
        assert!(!store.is_pressed(LogicalButton::Start));
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let store = InputStateStore::new();
        store.set_button(LogicalButton::Up, true);
        let before = store.snapshot();

        store.set_button(LogicalButton::Up, false);

        assert!(before.up);
        assert!(!store.snapshot().up);
    }

    #[test]
    fn concurrent_writers_on_distinct_buttons_do_not_interfere() {
        let store = Arc::new(InputStateStore::new());

        let writers: Vec<_> = [LogicalButton::A, LogicalButton::Right]
            .into_iter()
            .map(|button| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        store.set_button(button, i % 2 == 0);
                    }
                    store.set_button(button, true);
                })
            })
            .collect();

        for _ in 0..1000 {
            let snapshot = store.snapshot();
            assert!(!snapshot.b && !snapshot.left);
        }
        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert!(snapshot.a && snapshot.right);
        assert_eq!(snapshot.pressed_count(), 2);
    }

    #[test]
    fn snapshot_serializes_one_field_per_button() {
        let store = InputStateStore::new();
        store.set_button(LogicalButton::Player2, true);

        let json = serde_json::to_value(store.snapshot()).unwrap();
        let fields = json.as_object().unwrap();

        assert_eq!(fields.len(), 12);
        assert_eq!(fields["player2"], serde_json::Value::Bool(true));
        assert_eq!(fields["a"], serde_json::Value::Bool(false));
    }

    #[test]
    fn display_matches_snapshot_field_names() {
        let json = serde_json::to_value(InputSnapshot::default()).unwrap();
        for button in LogicalButton::ALL {
            assert!(json.get(button.to_string()).is_some(), "{}", button);
        }
    }
}
