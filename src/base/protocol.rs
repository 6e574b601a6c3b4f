// Robot dog line protocol
//
// Every command is one ASCII line: NAME ('#' ARG)* '\n'
// No length prefix, no checksum, no acknowledgment.

use std::fmt;
use std::str::FromStr;

/// Line terminator appended to every command
pub const LINE_END: char = '\n';

/// Separator between the command name and each argument
pub const ARG_SEPARATOR: char = '#';

/// Argument carried by CMD_MOVE_STOP
pub const STOP_ARG: i64 = 8;

/// Error types for parsing protocol lines
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty command line")]
    Empty,

    #[error("Unknown command name: {0}")]
    UnknownCommand(String),

    #[error("Command {name} expects 1 argument, got {count}")]
    ArgumentCount { name: &'static str, count: usize },

    #[error("Invalid argument '{0}'")]
    InvalidArgument(String),
}

/// Numeric command argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    /// Rendered like a Python float (`1.25`, `2.0`, `1e-05`)
    Decimal(f64),
    /// Rendered as a plain integer (`15`)
    Integer(i64),
}

impl Arg {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Arg::Decimal(v) => v,
            Arg::Integer(v) => v as f64,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arg::Decimal(v) => f.write_str(&format_decimal(v)),
            Arg::Integer(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for Arg {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidArgument(s.to_string());
        let looks_decimal = s.contains(['.', 'e', 'E']) || s.contains("inf") || s.contains("nan");
        if looks_decimal {
            s.parse::<f64>().map(Arg::Decimal).map_err(|_| invalid())
        } else {
            s.parse::<i64>().map(Arg::Integer).map_err(|_| invalid())
        }
    }
}

/// Fixed command vocabulary understood by the actuator server
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    MoveForward(Arg),
    MoveBackward(Arg),
    TurnLeft(Arg),
    TurnRight(Arg),
    StepLeft(Arg),
    StepRight(Arg),
    MoveStop(Arg),
}

impl Command {
    /// The stop command, always `CMD_MOVE_STOP#8`
    pub fn stop() -> Self {
        Command::MoveStop(Arg::Integer(STOP_ARG))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::MoveForward(_) => "CMD_MOVE_FORWARD",
            Command::MoveBackward(_) => "CMD_MOVE_BACKWARD",
            Command::TurnLeft(_) => "CMD_TURN_LEFT",
            Command::TurnRight(_) => "CMD_TURN_RIGHT",
            Command::StepLeft(_) => "CMD_STEP_LEFT",
            Command::StepRight(_) => "CMD_STEP_RIGHT",
            Command::MoveStop(_) => "CMD_MOVE_STOP",
        }
    }

    pub fn arg(&self) -> Arg {
        match *self {
            Command::MoveForward(a)
            | Command::MoveBackward(a)
            | Command::TurnLeft(a)
            | Command::TurnRight(a)
            | Command::StepLeft(a)
            | Command::StepRight(a)
            | Command::MoveStop(a) => a,
        }
    }

    /// Full wire line including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{}{}", self, LINE_END)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name(), ARG_SEPARATOR, self.arg())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Parse one line, with or without its terminator
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut parts = line.split(ARG_SEPARATOR);
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let build: fn(Arg) -> Command = match name {
            "CMD_MOVE_FORWARD" => Command::MoveForward,
            "CMD_MOVE_BACKWARD" => Command::MoveBackward,
            "CMD_TURN_LEFT" => Command::TurnLeft,
            "CMD_TURN_RIGHT" => Command::TurnRight,
            "CMD_STEP_LEFT" => Command::StepLeft,
            "CMD_STEP_RIGHT" => Command::StepRight,
            "CMD_MOVE_STOP" => Command::MoveStop,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };

        match args.as_slice() {
            [arg] => Ok(build(arg.parse()?)),
            _ => {
                let cmd = build(Arg::Integer(0));
                Err(ProtocolError::ArgumentCount {
                    name: cmd.name(),
                    count: args.len(),
                })
            }
        }
    }
}

/// Render a float the way the actuator server's reference client does
///
/// Shortest round-trip digits; integral values keep `.0`; exponent form
/// below 1e-4 and from 1e16 upwards with a signed, two-digit exponent.
pub fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value == 0.0 {
        return format!("{}0.0", sign);
    }

    // Rust's `{:e}` already yields the shortest round-trip digits
    let sci = format!("{:e}", value.abs());
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let body = if (-4..16).contains(&exp) {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                format!("{}{}.0", digits, "0".repeat(int_len - digits.len()))
            } else {
                format!("{}.{}", &digits[..int_len], &digits[int_len..])
            }
        } else {
            format!("0.{}{}", "0".repeat((-exp - 1) as usize), digits)
        }
    } else {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, exp_sign, exp.abs())
    };

    format!("{}{}", sign, body)
}
