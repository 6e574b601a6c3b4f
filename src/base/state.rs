// Soft motion state
//
// Best-effort bookkeeping of what was last commanded. Nothing is read back
// from the dog, so this can drift from the physical truth.

use crate::messages::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub is_stopped: bool,
    /// Accumulated heading in degrees, counter-clockwise positive
    pub heading_angle: f64,
    /// Set by the stand step before a spin, cleared by stop
    pub standing: bool,
    pub last_linear_velocity: Vector3,
    pub last_angular_velocity: Vector3,
    pub last_linear_power: Vector3,
    pub last_angular_power: Vector3,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            is_stopped: true,
            heading_angle: 0.0,
            standing: false,
            last_linear_velocity: Vector3::zero(),
            last_angular_velocity: Vector3::zero(),
            last_linear_power: Vector3::zero(),
            last_angular_power: Vector3::zero(),
        }
    }
}

impl MotionState {
    pub fn mark_stopped(&mut self) {
        self.is_stopped = true;
        self.standing = false;
    }

    pub fn mark_moving(&mut self) {
        self.is_stopped = false;
    }

    pub fn accumulate_heading(&mut self, delta: f64) {
        self.heading_angle += delta;
    }

    /// Stabilization step before turning in place.
    ///
    /// The protocol has no stand command, so this only records the stance.
    pub fn stand(&mut self) {
        self.standing = true;
    }

    pub fn record_velocity(&mut self, linear: Vector3, angular: Vector3) {
        self.last_linear_velocity = linear;
        self.last_angular_velocity = angular;
    }

    pub fn record_power(&mut self, linear: Vector3, angular: Vector3) {
        self.last_linear_power = linear;
        self.last_angular_power = angular;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_stopped() {
        let state = MotionState::default();
        assert!(state.is_stopped);
        assert_eq!(state.heading_angle, 0.0);
        assert!(!state.standing);
    }

    #[test]
    fn test_heading_accumulates() {
        let mut state = MotionState::default();
        state.accumulate_heading(90.0);
        state.accumulate_heading(-30.0);
        assert_eq!(state.heading_angle, 60.0);
    }

    #[test]
    fn test_stop_clears_stance() {
        let mut state = MotionState::default();
        state.stand();
        state.mark_moving();
        state.mark_stopped();
        assert!(state.is_stopped);
        assert!(!state.standing);
    }
}
