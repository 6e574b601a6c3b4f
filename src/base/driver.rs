// High-level driver for the robot dog base
//
// Combines the translation table and the line protocol to provide the base
// motion API. Every call is fire-and-forget: it returns once its commands
// are handed to the link, never once the motion completes.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::connection::{Connection, ConnectionError, LineSink, TransmissionError};
use super::protocol::Command;
use super::state::MotionState;
use super::translate;
use crate::config::{BaseConfig, ConfigError};
use crate::messages::{Properties, Vector3};

/// Static properties of the robot dog base
pub const PROPERTIES: Properties = Properties {
    width_meters: 0.1,
    turning_radius_meters: 0.0,
};

/// Capacity of the transmission failure event channel
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Extra options and timeout accepted by every base call.
///
/// Neither changes what is sent; they exist for host API compatibility.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub extra: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

/// What to do when a command line can't be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Log, publish a failure event, and report success to the caller
    #[default]
    BestEffort,
    /// Publish a failure event and return the error to the caller
    Strict,
}

/// Published on every failed transmission, whatever the policy
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionFailure {
    pub command: Command,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Failed to send {command}: {source}")]
    Transmission {
        command: Command,
        source: TransmissionError,
    },
}

/// Motion interface a host drives the base through
pub trait Base: Send + Sync {
    /// Drive straight at `velocity` (mm/s). Distance (mm) only gates the call.
    fn move_straight(
        &self,
        distance: f64,
        velocity: f64,
        opts: &CallOptions,
    ) -> impl Future<Output = Result<(), MotionError>> + Send;

    /// Turn in place by `angle` degrees at `velocity` deg/s, returning after
    /// the expected completion time.
    fn spin(
        &self,
        angle: f64,
        velocity: f64,
        opts: &CallOptions,
    ) -> impl Future<Output = Result<(), MotionError>> + Send;

    /// Drive with power fractions in [-1, 1]
    fn set_power(
        &self,
        linear: Vector3,
        angular: Vector3,
        opts: &CallOptions,
    ) -> impl Future<Output = Result<(), MotionError>> + Send;

    /// Drive with linear (mm/s) and angular (deg/s) velocities
    fn set_velocity(
        &self,
        linear: Vector3,
        angular: Vector3,
        opts: &CallOptions,
    ) -> impl Future<Output = Result<(), MotionError>> + Send;

    fn stop(&self, opts: &CallOptions) -> impl Future<Output = Result<(), MotionError>> + Send;

    fn is_moving(&self) -> impl Future<Output = bool> + Send;

    fn get_properties(&self, opts: &CallOptions) -> impl Future<Output = Properties> + Send;
}

/// Open-loop driver for the robot dog, generic over its line transport
pub struct RobotDog<L> {
    link: L,
    state: Mutex<MotionState>,
    policy: SendPolicy,
    failures: broadcast::Sender<TransmissionFailure>,
}

impl RobotDog<Connection> {
    /// Validate the configuration, then connect
    pub async fn connect(config: &BaseConfig, policy: SendPolicy) -> Result<Self, MotionError> {
        config.validate()?;
        let link = Connection::connect(config.endpoint()).await?;
        Ok(Self::new(link, policy))
    }

    /// Validate the new configuration, then replace the connection
    pub async fn reconfigure(&self, config: &BaseConfig) -> Result<(), MotionError> {
        config.validate()?;
        info!("Reconfiguring robot dog base for {}", config.endpoint());
        self.link.reconnect(config.endpoint()).await?;
        Ok(())
    }
}

impl<L: LineSink> RobotDog<L> {
    pub fn new(link: L, policy: SendPolicy) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            link,
            state: Mutex::new(MotionState::default()),
            policy,
            failures,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn policy(&self) -> SendPolicy {
        self.policy
    }

    /// Snapshot of the last commanded state
    pub fn state(&self) -> MotionState {
        self.lock_state().clone()
    }

    /// Observe transmission failures. Nothing is kept when nobody listens.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<TransmissionFailure> {
        self.failures.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, MotionState> {
        // Plain data, fine to recover after a panic
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update_state<R>(&self, f: impl FnOnce(&mut MotionState) -> R) -> R {
        f(&mut *self.lock_state())
    }

    async fn transmit(&self, command: Command) -> Result<(), MotionError> {
        let line = command.to_line();
        match self.link.send_line(&line).await {
            Ok(()) => Ok(()),
            Err(source) => {
                error!("Failed to send {}: {}", command, source);
                // No receivers is fine
                let _ = self.failures.send(TransmissionFailure {
                    command,
                    reason: source.to_string(),
                });
                Err(MotionError::Transmission { command, source })
            }
        }
    }

    /// Send commands in order, one attempt each
    async fn dispatch(&self, commands: &[Command]) -> Result<(), MotionError> {
        for &command in commands {
            if let Err(e) = self.transmit(command).await {
                if self.policy == SendPolicy::Strict {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn halt(&self) -> Result<(), MotionError> {
        self.update_state(MotionState::mark_stopped);
        self.dispatch(&[Command::stop()]).await
    }

    /// Spin whose completion wait can be cut short.
    ///
    /// Cancelling skips the wait only; the turn command already sent stands.
    pub async fn spin_with_cancel(
        &self,
        angle: f64,
        velocity: f64,
        cancel: &CancellationToken,
    ) -> Result<(), MotionError> {
        let Some(plan) = translate::spin(angle, velocity) else {
            return self.halt().await;
        };

        self.update_state(|s| {
            s.accumulate_heading(plan.heading_delta);
            s.stand();
        });
        debug!(
            "Spinning {:?} {} deg, expecting {:?}",
            plan.direction, angle, plan.duration
        );

        self.dispatch(&[plan.command]).await?;

        tokio::select! {
            _ = tokio::time::sleep(plan.duration) => {}
            _ = cancel.cancelled() => {
                info!("Spin wait cancelled, {} stands", plan.command);
            }
        }

        self.update_state(MotionState::mark_moving);
        Ok(())
    }
}

impl<L: LineSink> Base for RobotDog<L> {
    async fn move_straight(
        &self,
        distance: f64,
        velocity: f64,
        _opts: &CallOptions,
    ) -> Result<(), MotionError> {
        let Some(command) = translate::straight(distance, velocity) else {
            return self.halt().await;
        };
        self.update_state(MotionState::mark_moving);
        self.dispatch(&[command]).await
    }

    async fn spin(&self, angle: f64, velocity: f64, _opts: &CallOptions) -> Result<(), MotionError> {
        self.spin_with_cancel(angle, velocity, &CancellationToken::new())
            .await
    }

    async fn set_power(
        &self,
        linear: Vector3,
        angular: Vector3,
        _opts: &CallOptions,
    ) -> Result<(), MotionError> {
        self.update_state(|s| s.record_power(linear, angular));
        self.dispatch(&translate::power(linear, angular)).await
    }

    async fn set_velocity(
        &self,
        linear: Vector3,
        angular: Vector3,
        _opts: &CallOptions,
    ) -> Result<(), MotionError> {
        self.update_state(|s| s.record_velocity(linear, angular));
        self.dispatch(&translate::velocity(linear, angular)).await
    }

    async fn stop(&self, _opts: &CallOptions) -> Result<(), MotionError> {
        self.halt().await
    }

    /// No feedback channel exists, so this is always false
    async fn is_moving(&self) -> bool {
        false
    }

    async fn get_properties(&self, _opts: &CallOptions) -> Properties {
        PROPERTIES
    }
}
