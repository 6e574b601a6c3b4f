// Zenoh command bridge with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if teleop crashes and stops publishing, the dog would otherwise keep walking on its last command

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::base::{Base, CallOptions, LineSink, MotionError, RobotDog};
use crate::config::{CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_BASE, TOPIC_HEALTH};
use crate::messages::{BaseCommand, RuntimeHealth};

/// What the dog was last told to do
#[derive(Debug, Clone, Copy, PartialEq)]
enum Forwarded {
    Stopped,
    Driving(BaseCommand),
}

/// What the loop should send this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BridgeAction {
    Drive(BaseCommand),
    Stop,
}

/// Turns a stream of velocity commands into deduplicated driver calls.
///
/// The dog keeps executing its last command, so only changes are forwarded.
/// A stale or all-zero command becomes a single stop.
pub struct Bridge {
    timeout: Duration,
    latest_cmd: Option<BaseCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    forwarded: Forwarded,
}

impl Bridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            forwarded: Forwarded::Stopped,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: BaseCommand, now: Instant) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Decide what to send, if anything, based on watchdog state
    pub fn compute_action(&mut self, now: Instant) -> Option<BridgeAction> {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        let wanted = match self.latest_cmd {
            Some(cmd) if cmd_age <= self.timeout => {
                self.health = RuntimeHealth::Ok;
                if cmd.x_vel == 0.0 && cmd.y_vel == 0.0 && cmd.theta_vel == 0.0 {
                    Forwarded::Stopped
                } else {
                    Forwarded::Driving(cmd)
                }
            }
            Some(_) => {
                // Watchdog triggered - stop the dog
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot dog", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                Forwarded::Stopped
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                Forwarded::Stopped
            }
        };

        if wanted == self.forwarded {
            return None;
        }
        self.forwarded = wanted;
        Some(match wanted {
            Forwarded::Stopped => BridgeAction::Stop,
            Forwarded::Driving(cmd) => BridgeAction::Drive(cmd),
        })
    }
}

/// Forward one bridge action to the driver
pub async fn apply<L: LineSink>(dog: &RobotDog<L>, action: BridgeAction) -> Result<(), MotionError> {
    let opts = CallOptions::default();
    match action {
        BridgeAction::Stop => dog.stop(&opts).await,
        BridgeAction::Drive(cmd) => {
            // Zero axes send nothing, so clear the previous motion first
            dog.stop(&opts).await?;
            let (linear, angular) = cmd.to_vectors();
            dog.set_velocity(linear, angular, &opts).await
        }
    }
}

pub async fn run<L: LineSink>(
    dog: &RobotDog<L>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut bridge = Bridge::new(CMD_TIMEOUT);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Bridge started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_BASE);
    info!("Publishing to: {}", TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<BaseCommand>(&payload) {
                Ok(cmd) => bridge.on_command(cmd, Instant::now()),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Forward changes (includes watchdog logic)
        if let Some(action) = bridge.compute_action(Instant::now()) {
            info!("Forwarding {:?}", action);
            if let Err(e) = apply(dog, action).await {
                warn!("Failed to forward {:?}: {}", action, e);
            }
        }

        // 3. Publish health
        let health_json = serde_json::to_string(&bridge.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(250);

    fn cmd(x: f64, y: f64, theta: f64) -> BaseCommand {
        BaseCommand {
            x_vel: x,
            y_vel: y,
            theta_vel: theta,
        }
    }

    #[test]
    fn test_idle_bridge_sends_nothing() {
        let mut bridge = Bridge::new(TIMEOUT);
        assert_eq!(bridge.compute_action(Instant::now()), None);
        assert_eq!(bridge.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_forwards_changes_only() {
        let mut bridge = Bridge::new(TIMEOUT);
        let t0 = Instant::now();
        let forward = cmd(0.0, 20.0, 0.0);

        bridge.on_command(forward, t0);
        assert_eq!(bridge.compute_action(t0), Some(BridgeAction::Drive(forward)));
        assert_eq!(bridge.health(), RuntimeHealth::Ok);

        bridge.on_command(forward, t0 + Duration::from_millis(20));
        assert_eq!(bridge.compute_action(t0 + Duration::from_millis(20)), None);

        let turn = cmd(0.0, 20.0, 10.0);
        bridge.on_command(turn, t0 + Duration::from_millis(40));
        assert_eq!(
            bridge.compute_action(t0 + Duration::from_millis(40)),
            Some(BridgeAction::Drive(turn))
        );
    }

    #[test]
    fn test_watchdog_stops_once() {
        let mut bridge = Bridge::new(TIMEOUT);
        let t0 = Instant::now();
        bridge.on_command(cmd(0.0, 20.0, 0.0), t0);
        bridge.compute_action(t0);

        let late = t0 + Duration::from_millis(300);
        assert_eq!(bridge.compute_action(late), Some(BridgeAction::Stop));
        assert_eq!(bridge.health(), RuntimeHealth::CmdStale);
        assert_eq!(bridge.compute_action(late + Duration::from_millis(20)), None);
    }

    #[test]
    fn test_zero_command_stops() {
        let mut bridge = Bridge::new(TIMEOUT);
        let t0 = Instant::now();
        bridge.on_command(cmd(5.0, 0.0, 0.0), t0);
        bridge.compute_action(t0);

        bridge.on_command(cmd(0.0, 0.0, 0.0), t0);
        assert_eq!(bridge.compute_action(t0), Some(BridgeAction::Stop));
        assert_eq!(bridge.health(), RuntimeHealth::Ok);
    }

    #[tokio::test]
    async fn test_apply_drive_stops_then_sets_velocity() {
        use crate::base::{SendPolicy, TransmissionError};
        use std::sync::Mutex;

        #[derive(Default)]
        struct Lines(Mutex<Vec<String>>);

        impl LineSink for Lines {
            async fn send_line(&self, line: &str) -> Result<(), TransmissionError> {
                self.0.lock().unwrap().push(line.to_string());
                Ok(())
            }
        }

        let dog = RobotDog::new(Lines::default(), SendPolicy::BestEffort);
        apply(&dog, BridgeAction::Drive(cmd(-4.0, 0.0, 10.0))).await.unwrap();
        apply(&dog, BridgeAction::Stop).await.unwrap();

        assert_eq!(
            *dog.link().0.lock().unwrap(),
            [
                "CMD_MOVE_STOP#8\n",
                "CMD_TURN_LEFT#8.5\n",
                "CMD_STEP_LEFT#1.0\n",
                "CMD_MOVE_STOP#8\n"
            ]
        );
    }
}
