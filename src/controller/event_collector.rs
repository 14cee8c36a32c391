use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::controller_handle::ControllerSettings;

/// Full deflection of a raw stick reading, joystick-device convention
pub const RAW_AXIS_MAX: i32 = 32767;

// Gamepad event the dispatcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadEvent {
    Button {
        button: ButtonType,
        state: ButtonState,
    },
    /// Vertical stick reading in raw units, "up" negative, 0 at rest
    StickY { stick: JoystickType, raw: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoystickType {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

// Face buttons by position; on a DualShock South is Cross and North is Triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonType {
    South,
    East,
    West,
    North,
    Start,
    Select,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Guide,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,

    // Only events from this pad are collected once set
    active_gamepad: Option<GamepadId>,

    settings: ControllerSettings,

    sticks: StickMemory,
}

impl EventCollector<Initializing> {
    pub fn create(settings: ControllerSettings) -> Result<Self, CollectorError> {
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings, StickMemory::default()))
    }

    // Pick the first connected pad and transition to Collecting state
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, accepting the first one that appears");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }
            let (id, gamepad) = &gamepads[0];
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
        }

        self.transition()
    }
}

impl EventCollector<Collecting> {
    /// Blocks up to `timeout` for the next relevant event.
    pub fn next_event(&mut self, timeout: Duration) -> Option<GamepadEvent> {
        let Event { id, event, .. } = self.gilrs.next_event_blocking(Some(timeout))?;

        match self.active_gamepad {
            Some(active_id) if id != active_id => {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                return None;
            }
            None => {
                info!("Adopting gamepad {} as active", id);
                self.active_gamepad = Some(id);
            }
            _ => {}
        }

        self.convert_gilrs_event(event)
    }

    /// Stick readings held off rest since their last emission, due for a resend.
    pub fn held_sticks(&mut self, interval: Duration) -> Vec<GamepadEvent> {
        self.sticks.held(Instant::now(), interval)
    }

    fn convert_gilrs_event(&mut self, event: EventType) -> Option<GamepadEvent> {
        let now = Local::now();

        match event {
            EventType::AxisChanged(axis, value, _) => {
                let stick = match axis {
                    Axis::LeftStickY => JoystickType::Left,
                    Axis::RightStickY => JoystickType::Right,
                    _ => return None,
                };
                let raw = axis_to_raw(value, self.settings.deadzone);
                self.sticks.update(stick, raw, Instant::now())
            }
            EventType::ButtonPressed(button, _) => {
                info!("Button pressed: {:?} at {}", button, now.format("%H:%M:%S.%3f"));
                map_button(button).map(|button| GamepadEvent::Button {
                    button,
                    state: ButtonState::Pressed,
                })
            }
            EventType::ButtonReleased(button, _) => {
                info!("Button released: {:?} at {}", button, now.format("%H:%M:%S.%3f"));
                map_button(button).map(|button| GamepadEvent::Button {
                    button,
                    state: ButtonState::Released,
                })
            }
            EventType::Connected => {
                info!("Controller connected event detected");
                None
            }
            EventType::Disconnected => {
                warn!("Controller disconnected event detected");
                None
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StickSlot {
    raw: Option<i32>,
    emitted_at: Option<Instant>,
}

/// Last raw reading per stick
///
/// gilrs only reports changes, so a stick held off rest goes quiet. Repeated readings
/// are suppressed on update and re-emitted by [`StickMemory::held`] instead.
#[derive(Debug, Default)]
pub struct StickMemory {
    left: StickSlot,
    right: StickSlot,
}

impl StickMemory {
    pub fn update(
        &mut self,
        stick: JoystickType,
        raw: i32,
        now: Instant,
    ) -> Option<GamepadEvent> {
        let slot = self.slot(stick);
        if slot.raw == Some(raw) {
            return None;
        }
        slot.raw = Some(raw);
        slot.emitted_at = Some(now);
        Some(GamepadEvent::StickY { stick, raw })
    }

    /// Readings off rest that have not been emitted for at least `interval`.
    pub fn held(&mut self, now: Instant, interval: Duration) -> Vec<GamepadEvent> {
        let mut due = Vec::new();
        for stick in [JoystickType::Left, JoystickType::Right] {
            let slot = self.slot(stick);
            let raw = match slot.raw {
                Some(raw) if raw != 0 => raw,
                _ => continue,
            };
            let quiet = slot
                .emitted_at
                .map_or(true, |at| now.saturating_duration_since(at) >= interval);
            if quiet {
                slot.emitted_at = Some(now);
                due.push(GamepadEvent::StickY { stick, raw });
            }
        }
        due
    }

    fn slot(&mut self, stick: JoystickType) -> &mut StickSlot {
        match stick {
            JoystickType::Left => &mut self.left,
            JoystickType::Right => &mut self.right,
        }
    }
}

// gilrs reports [-1, 1] with up positive; the command path expects raw device units
// with up negative. Readings inside the deadzone are at rest.
pub fn axis_to_raw(value: f32, deadzone: i32) -> i32 {
    let raw = (-value.clamp(-1.0, 1.0) * RAW_AXIS_MAX as f32).round() as i32;
    if raw.abs() < deadzone {
        0
    } else {
        raw
    }
}

fn map_button(button: Button) -> Option<ButtonType> {
    match button {
        Button::South => Some(ButtonType::South),
        Button::East => Some(ButtonType::East),
        Button::West => Some(ButtonType::West),
        Button::North => Some(ButtonType::North),
        Button::Start => Some(ButtonType::Start),
        Button::Select => Some(ButtonType::Select),
        Button::LeftTrigger => Some(ButtonType::LeftBumper),
        Button::RightTrigger => Some(ButtonType::RightBumper),
        Button::LeftThumb => Some(ButtonType::LeftStick),
        Button::RightThumb => Some(ButtonType::RightStick),
        Button::DPadUp => Some(ButtonType::DPadUp),
        Button::DPadDown => Some(ButtonType::DPadDown),
        Button::DPadLeft => Some(ButtonType::DPadLeft),
        Button::DPadRight => Some(ButtonType::DPadRight),
        Button::Mode => Some(ButtonType::Guide),
        _ => None,
    }
}
