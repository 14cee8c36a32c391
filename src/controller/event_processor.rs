//! Gamepad bindings: one event in, at most one intent out.
//!
//! | Input                   | Intent                        |
//! |-------------------------|-------------------------------|
//! | South (Cross) released  | mode Manual                   |
//! | North (Triangle) released | mode Follow                 |
//! | D-pad pressed           | one step along X or Y         |
//! | Left / right stick Y    | left / right motor axis value |
//!
//! Everything else is ignored.

use super::event_collector::{ButtonState, ButtonType, GamepadEvent, JoystickType};
use crate::command::{DriveMode, Intent, MotorSide, MoveAxis};

pub fn dispatch(event: &GamepadEvent) -> Option<Intent> {
    match *event {
        GamepadEvent::Button {
            button,
            state: ButtonState::Released,
        } => match button {
            ButtonType::South => Some(Intent::ModeSet {
                mode: DriveMode::Manual,
            }),
            ButtonType::North => Some(Intent::ModeSet {
                mode: DriveMode::Follow,
            }),
            _ => None,
        },
        GamepadEvent::Button {
            button,
            state: ButtonState::Pressed,
        } => {
            let (axis, magnitude) = match button {
                ButtonType::DPadUp => (MoveAxis::Y, 1),
                ButtonType::DPadDown => (MoveAxis::Y, -1),
                ButtonType::DPadLeft => (MoveAxis::X, -1),
                ButtonType::DPadRight => (MoveAxis::X, 1),
                _ => return None,
            };
            Some(Intent::DirectionalMove { axis, magnitude })
        }
        GamepadEvent::StickY { stick, raw } => {
            let side = match stick {
                JoystickType::Left => MotorSide::Left,
                JoystickType::Right => MotorSide::Right,
            };
            Some(Intent::AxisValue { side, value: raw })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Translator;

    fn press(button: ButtonType) -> GamepadEvent {
        GamepadEvent::Button {
            button,
            state: ButtonState::Pressed,
        }
    }

    fn release(button: ButtonType) -> GamepadEvent {
        GamepadEvent::Button {
            button,
            state: ButtonState::Released,
        }
    }

    fn wire(event: GamepadEvent) -> Option<String> {
        dispatch(&event).map(|intent| Translator::default().translate(&intent).body().to_string())
    }

    #[test]
    fn mode_buttons_fire_on_release() {
        assert_eq!(wire(release(ButtonType::South)).as_deref(), Some("m: 0"));
        assert_eq!(wire(release(ButtonType::North)).as_deref(), Some("m: 1"));
        assert_eq!(wire(press(ButtonType::South)), None);
        assert_eq!(wire(press(ButtonType::North)), None);
    }

    #[test]
    fn dpad_fires_on_press() {
        assert_eq!(wire(press(ButtonType::DPadUp)).as_deref(), Some("x:0 y:6"));
        assert_eq!(wire(press(ButtonType::DPadDown)).as_deref(), Some("x:0 y:-6"));
        assert_eq!(wire(press(ButtonType::DPadLeft)).as_deref(), Some("x:-6 y:0"));
        assert_eq!(wire(press(ButtonType::DPadRight)).as_deref(), Some("x:6 y:0"));
        assert_eq!(wire(release(ButtonType::DPadUp)), None);
    }

    #[test]
    fn sticks_drive_motors() {
        let stick = |stick, raw| GamepadEvent::StickY { stick, raw };
        assert_eq!(wire(stick(JoystickType::Left, -32767)).as_deref(), Some("l: 250"));
        assert_eq!(wire(stick(JoystickType::Right, 32767)).as_deref(), Some("r: -250"));
        assert_eq!(wire(stick(JoystickType::Left, 0)).as_deref(), Some("l: 0"));
    }

    #[test]
    fn unbound_buttons_are_ignored() {
        for button in [ButtonType::East, ButtonType::West, ButtonType::Start, ButtonType::Guide] {
            assert_eq!(dispatch(&press(button)), None);
            assert_eq!(dispatch(&release(button)), None);
        }
    }
}
