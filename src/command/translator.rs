//! Rendering of operator intents into the microcontroller command grammar.
//!
//! Grammar keys: `m` drive mode, `l`/`r` motor speed, `x`/`y` discrete move.
//! Spacing after the colon differs per key and is matched verbatim by
//! [`IMPORTANT_COMMANDS`](super::IMPORTANT_COMMANDS); change both together.

use super::{CommandError, DriveMode, Intent, MotorSide, MoveAxis, WireCommand};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scaling and step configuration for the translator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    /// Distance of one directional move step
    pub move_step: i32,
    /// Motor output at full forward stick
    pub max_output: i32,
    /// Motor output at full reverse stick
    pub min_output: i32,
    /// Magnitude of a fully deflected raw joystick reading
    pub axis_max: i32,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            move_step: 6,
            max_output: 250,
            min_output: -250,
            axis_max: 32767,
        }
    }
}

/// JSON body published on the command topic
#[derive(Debug, Deserialize)]
struct BrokerCommand {
    cmd: String,
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    settings: TranslatorSettings,
}

impl Translator {
    pub fn new(settings: TranslatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    pub fn translate(&self, intent: &Intent) -> WireCommand {
        let body = match *intent {
            Intent::DirectionalMove {
                axis: MoveAxis::X,
                magnitude,
            } => format!("x:{} y:0", self.step(magnitude)),
            Intent::DirectionalMove {
                axis: MoveAxis::Y,
                magnitude,
            } => format!("x:0 y:{}", self.step(magnitude)),
            Intent::ModeSet {
                mode: DriveMode::Follow,
            } => "m: 1".to_string(),
            Intent::ModeSet {
                mode: DriveMode::Manual,
            } => "m: 0".to_string(),
            Intent::AxisValue {
                side: MotorSide::Left,
                value,
            } => format!("l: {}", self.scale_axis(value)),
            Intent::AxisValue {
                side: MotorSide::Right,
                value,
            } => format!("r: {}", self.scale_axis(value)),
        };

        WireCommand::from_rendered(body)
    }

    fn step(&self, magnitude: i32) -> i32 {
        magnitude.saturating_mul(self.settings.move_step)
    }

    /// Maps a raw stick reading onto the motor output range.
    ///
    /// Readings toward "up" (negative) scale against `max_output`, readings toward
    /// "down" against `min_output`; the result is floored and clamped.
    pub fn scale_axis(&self, value: i32) -> i32 {
        let s = &self.settings;
        if value == 0 {
            return 0;
        }

        let (extreme, output) = if value < 0 {
            (-s.axis_max, s.max_output)
        } else {
            (s.axis_max, s.min_output)
        };
        let scaled = (f64::from(value) / f64::from(extreme) * f64::from(output)).floor();

        // Not `clamp`: settings are not validated here and min may exceed max
        (scaled as i32).max(s.min_output).min(s.max_output)
    }

    /// Maps a command-topic payload onto a one-step directional move.
    pub fn intent_from_broker(&self, payload: &[u8]) -> Result<Intent, CommandError> {
        let command: BrokerCommand = serde_json::from_slice(payload)?;
        debug!("Broker command: {:?}", command.cmd);

        let (axis, magnitude) = match command.cmd.as_str() {
            "left" => (MoveAxis::X, -1),
            "right" => (MoveAxis::X, 1),
            "up" => (MoveAxis::Y, 1),
            "down" => (MoveAxis::Y, -1),
            _ => return Err(CommandError::UnrecognizedCommand(command.cmd)),
        };
        Ok(Intent::DirectionalMove { axis, magnitude })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(intent: Intent) -> String {
        Translator::default().translate(&intent).body().to_string()
    }

    #[test]
    fn directional_moves() {
        let x = |magnitude| Intent::DirectionalMove {
            axis: MoveAxis::X,
            magnitude,
        };
        let y = |magnitude| Intent::DirectionalMove {
            axis: MoveAxis::Y,
            magnitude,
        };
        assert_eq!(render(x(1)), "x:6 y:0");
        assert_eq!(render(x(-1)), "x:-6 y:0");
        assert_eq!(render(y(1)), "x:0 y:6");
        assert_eq!(render(y(-1)), "x:0 y:-6");

        let wide = Translator::new(TranslatorSettings {
            move_step: 10,
            ..Default::default()
        });
        assert_eq!(wide.translate(&x(2)).body(), "x:20 y:0");
    }

    #[test]
    fn oversized_moves_saturate() {
        let x = |magnitude| Intent::DirectionalMove {
            axis: MoveAxis::X,
            magnitude,
        };
        let y = |magnitude| Intent::DirectionalMove {
            axis: MoveAxis::Y,
            magnitude,
        };
        assert_eq!(render(x(i32::MAX)), format!("x:{} y:0", i32::MAX));
        assert_eq!(render(x(i32::MAX / 2)), format!("x:{} y:0", i32::MAX));
        assert_eq!(render(y(i32::MIN)), format!("x:0 y:{}", i32::MIN));
    }

    #[test]
    fn inverted_output_range_does_not_panic() {
        let inverted = Translator::new(TranslatorSettings {
            min_output: 250,
            max_output: -250,
            ..Default::default()
        });
        assert_eq!(inverted.scale_axis(-32767), -250);
        assert_eq!(inverted.scale_axis(32767), -250);
        assert_eq!(inverted.scale_axis(0), 0);
    }

    #[test]
    fn mode_sets_are_important() {
        let translator = Translator::default();
        let follow = translator.translate(&Intent::ModeSet {
            mode: DriveMode::Follow,
        });
        let manual = translator.translate(&Intent::ModeSet {
            mode: DriveMode::Manual,
        });
        assert_eq!(follow.body(), "m: 1");
        assert_eq!(manual.body(), "m: 0");
        assert!(follow.is_important());
        assert!(manual.is_important());
    }

    #[test]
    fn axis_extremes_and_rest() {
        let left = |value| Intent::AxisValue {
            side: MotorSide::Left,
            value,
        };
        let right = |value| Intent::AxisValue {
            side: MotorSide::Right,
            value,
        };

        assert_eq!(render(left(-32767)), "l: 250");
        assert_eq!(render(left(32767)), "l: -250");
        assert_eq!(render(right(-32767)), "r: 250");
        assert_eq!(render(right(32767)), "r: -250");

        let rest_left = Translator::default().translate(&left(0));
        let rest_right = Translator::default().translate(&right(0));
        assert_eq!(rest_left.body(), "l: 0");
        assert_eq!(rest_right.body(), "r: 0");
        assert!(rest_left.is_important());
        assert!(rest_right.is_important());
    }

    #[test]
    fn axis_scaling_floors_and_clamps() {
        let translator = Translator::default();
        assert_eq!(translator.scale_axis(-16384), 125);
        assert_eq!(translator.scale_axis(16384), -126);
        assert_eq!(translator.scale_axis(-32768), 250);
        assert_eq!(translator.scale_axis(i32::MIN / 2), 250);
        assert_eq!(translator.scale_axis(i32::MAX / 2), -250);
    }

    #[test]
    fn every_output_is_one_line() {
        let translator = Translator::default();
        let intents = [
            Intent::DirectionalMove {
                axis: MoveAxis::X,
                magnitude: -3,
            },
            Intent::ModeSet {
                mode: DriveMode::Manual,
            },
            Intent::AxisValue {
                side: MotorSide::Right,
                value: -20000,
            },
            Intent::AxisValue {
                side: MotorSide::Left,
                value: 0,
            },
        ];
        for intent in intents {
            let bytes = translator.translate(&intent).as_bytes().to_vec();
            assert_eq!(bytes.last(), Some(&b'\n'));
            assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
        }
    }

    #[test]
    fn broker_commands_map_to_single_steps() {
        let translator = Translator::default();
        let cases = [
            (r#"{"cmd": "left"}"#, "x:-6 y:0"),
            (r#"{"cmd": "right"}"#, "x:6 y:0"),
            (r#"{"cmd": "up"}"#, "x:0 y:6"),
            (r#"{"cmd": "down", "speed": 3}"#, "x:0 y:-6"),
        ];
        for (payload, expected) in cases {
            let intent = translator.intent_from_broker(payload.as_bytes()).unwrap();
            assert_eq!(translator.translate(&intent).body(), expected);
        }
    }

    #[test]
    fn broker_rejects_unknown_and_malformed() {
        let translator = Translator::default();
        assert!(matches!(
            translator.intent_from_broker(br#"{"cmd": "spin"}"#),
            Err(CommandError::UnrecognizedCommand(cmd)) if cmd == "spin"
        ));
        assert!(matches!(
            translator.intent_from_broker(b"left"),
            Err(CommandError::MalformedPayload(_))
        ));
        assert!(matches!(
            translator.intent_from_broker(br#"{"command": "left"}"#),
            Err(CommandError::MalformedPayload(_))
        ));
    }
}
