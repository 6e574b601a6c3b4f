// Message and value types shared by the driver, the bridge and the CLI

use serde::{Deserialize, Serialize};

/// Three-axis vector used for linear and angular velocity/power requests
///
/// For the base, `y` is forward, `x` is side to side and `z` is yaw.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Static physical description of the base
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub width_meters: f64,
    pub turning_radius_meters: f64,
}

// Command from teleop/scripts -> bridge
// x_vel is strafe (mm/s), y_vel is forward (mm/s), theta_vel is yaw (deg/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
}

impl BaseCommand {
    /// Split into the (linear, angular) pair the driver expects
    pub fn to_vectors(&self) -> (Vector3, Vector3) {
        (
            Vector3::new(self.x_vel, self.y_vel, 0.0),
            Vector3::new(0.0, 0.0, self.theta_vel),
        )
    }
}

/// Health status published by the bridge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_command_json() {
        let cmd: BaseCommand =
            serde_json::from_str(r#"{"x_vel": 0.0, "y_vel": 100.0, "theta_vel": -30.0}"#).unwrap();
        let (linear, angular) = cmd.to_vectors();
        assert_eq!(linear, Vector3::new(0.0, 100.0, 0.0));
        assert_eq!(angular, Vector3::new(0.0, 0.0, -30.0));
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
    }
}
