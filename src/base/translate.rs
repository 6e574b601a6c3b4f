// Motion request -> protocol command translation
//
// The server takes unitless magnitudes, so each call scales its input by a
// fixed factor and picks a command from the sign. Magnitudes on the wire are
// always non-negative; direction lives in the command name.

use std::time::Duration;

use super::protocol::{Arg, Command};
use crate::messages::Vector3;

/// move_straight: mm/s -> server units
pub const STRAIGHT_FACTOR: f64 = 0.25;

/// spin: deg/s -> server units
pub const SPIN_FACTOR: f64 = 0.85;

/// set_power: yaw power fraction -> server units
pub const POWER_ANGULAR_FACTOR: f64 = 30.0;

/// set_power: forward power fraction -> server units
pub const POWER_LINEAR_FACTOR: f64 = 25.0;

/// set_velocity: deg/s -> server units
pub const VELOCITY_ANGULAR_FACTOR: f64 = 0.85;

/// set_velocity: mm/s -> server units (both forward and strafe)
pub const VELOCITY_LINEAR_FACTOR: f64 = 0.25;

/// Direction of a spin, decided by the sign of the requested velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpinDirection {
    Left,
    Right,
}

/// Planned spin: the command to send, the heading change and the wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinPlan {
    pub command: Command,
    pub direction: SpinDirection,
    pub heading_delta: f64,
    pub duration: Duration,
}

/// Non-finite values are treated as zero: no command for that axis
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Half-to-even rounding, saturating at the i64 range
fn round_to_int(value: f64) -> i64 {
    finite_or_zero(value).round_ties_even() as i64
}

fn forward_or_backward(value: f64) -> Command {
    if value > 0.0 {
        Command::MoveForward(Arg::Decimal(value.abs()))
    } else {
        Command::MoveBackward(Arg::Decimal(value.abs()))
    }
}

fn left_or_right(value: f64) -> Command {
    if value > 0.0 {
        Command::TurnLeft(Arg::Decimal(value.abs()))
    } else {
        Command::TurnRight(Arg::Decimal(value.abs()))
    }
}

/// Straight-line motion; `None` means the request is a stop
///
/// Distance only gates the call. The server has no distance feedback, so it
/// never bounds the motion.
pub fn straight(distance: f64, velocity: f64) -> Option<Command> {
    let scaled = finite_or_zero(velocity * STRAIGHT_FACTOR);
    if distance == 0.0 || distance.is_nan() || scaled == 0.0 {
        return None;
    }
    Some(forward_or_backward(scaled))
}

/// Expected time for a spin to complete, `|angle / velocity|`
pub fn spin_duration(angle: f64, velocity: f64) -> Duration {
    let secs = (angle / velocity).abs();
    if secs.is_finite() {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// In-place rotation; `None` means the request is a stop
pub fn spin(angle: f64, velocity: f64) -> Option<SpinPlan> {
    let magnitude = finite_or_zero(velocity * SPIN_FACTOR).abs();
    if finite_or_zero(angle) == 0.0 || magnitude == 0.0 {
        return None;
    }

    let (command, direction, heading_delta) = if velocity > 0.0 {
        (Command::TurnLeft(Arg::Decimal(magnitude)), SpinDirection::Left, angle)
    } else {
        (Command::TurnRight(Arg::Decimal(magnitude)), SpinDirection::Right, -angle)
    };

    Some(SpinPlan {
        command,
        direction,
        heading_delta,
        duration: spin_duration(angle, velocity),
    })
}

/// Power control: at most one turn command then one translation command
///
/// Lateral (x) power has no translation here.
pub fn power(linear: Vector3, angular: Vector3) -> Vec<Command> {
    let ang = round_to_int(angular.z * POWER_ANGULAR_FACTOR);
    let lin = round_to_int(linear.y * POWER_LINEAR_FACTOR);

    let mut commands = Vec::with_capacity(2);
    if ang > 0 {
        commands.push(Command::TurnLeft(Arg::Integer(ang)));
    } else if ang < 0 {
        commands.push(Command::TurnRight(Arg::Integer(ang.saturating_abs())));
    }
    if lin > 0 {
        commands.push(Command::MoveForward(Arg::Integer(lin)));
    } else if lin < 0 {
        commands.push(Command::MoveBackward(Arg::Integer(lin.saturating_abs())));
    }
    commands
}

/// Velocity control: turn, forward/backward, strafe, each only when non-zero
pub fn velocity(linear: Vector3, angular: Vector3) -> Vec<Command> {
    let ang = finite_or_zero(angular.z * VELOCITY_ANGULAR_FACTOR);
    let y_lin = finite_or_zero(linear.y * VELOCITY_LINEAR_FACTOR);
    let x_lin = finite_or_zero(linear.x * VELOCITY_LINEAR_FACTOR);

    let mut commands = Vec::with_capacity(3);
    if ang != 0.0 {
        commands.push(left_or_right(ang));
    }
    if y_lin != 0.0 {
        commands.push(forward_or_backward(y_lin));
    }
    if x_lin != 0.0 {
        let magnitude = Arg::Decimal(x_lin.abs());
        commands.push(if x_lin > 0.0 {
            Command::StepRight(magnitude)
        } else {
            Command::StepLeft(magnitude)
        });
    }
    commands
}
