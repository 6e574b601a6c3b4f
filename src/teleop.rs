// Keyboard teleop: WASD move, Z/X rotate, Space stop, R/F speed, Q quit
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::base::{LineSink, RobotDog};
use crate::messages::BaseCommand;
use crate::runtime::{Bridge, BridgeAction, apply};

const SPEEDS: [f64; 3] = [10.0, 20.0, 40.0]; // mm/s
const THETA_SPEEDS: [f64; 3] = [4.0, 8.0, 12.0]; // deg/s
const SPEED_LABELS: [&str; 3] = ["LOW", "MED", "HIGH"];
const INPUT_TIMEOUT: Duration = Duration::from_millis(300); // Stop after this much time with no input
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of one key press
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyOutcome {
    Move(BaseCommand),
    Speed(usize),
    Quit,
    Ignored,
}

/// Keyboard state: current speed level and held velocities
#[derive(Debug, Clone)]
pub struct Keymap {
    speed_idx: usize,
    cmd: BaseCommand,
}

impl Default for Keymap {
    fn default() -> Self {
        Self {
            speed_idx: 0,
            cmd: BaseCommand {
                x_vel: 0.0,
                y_vel: 0.0,
                theta_vel: 0.0,
            },
        }
    }
}

impl Keymap {
    pub fn handle(&mut self, code: KeyCode) -> KeyOutcome {
        let speed = SPEEDS[self.speed_idx];
        let theta = THETA_SPEEDS[self.speed_idx];
        match code {
            // Movement: y is forward, x is strafe (right positive)
            KeyCode::Char('w') => self.cmd.y_vel = speed,
            KeyCode::Char('s') => self.cmd.y_vel = -speed,
            KeyCode::Char('a') => self.cmd.x_vel = -speed,
            KeyCode::Char('d') => self.cmd.x_vel = speed,

            // Rotation, counter-clockwise positive
            KeyCode::Char('z') => self.cmd.theta_vel = theta,
            KeyCode::Char('x') => self.cmd.theta_vel = -theta,

            KeyCode::Char(' ') => self.reset(),

            // Speed control
            KeyCode::Char('r') => {
                self.speed_idx = (self.speed_idx + 1).min(SPEEDS.len() - 1);
                return KeyOutcome::Speed(self.speed_idx);
            }
            KeyCode::Char('f') => {
                self.speed_idx = self.speed_idx.saturating_sub(1);
                return KeyOutcome::Speed(self.speed_idx);
            }

            KeyCode::Char('q') | KeyCode::Esc => return KeyOutcome::Quit,

            _ => return KeyOutcome::Ignored,
        }
        KeyOutcome::Move(self.cmd)
    }

    /// Drop all held velocities
    pub fn reset(&mut self) {
        self.cmd = BaseCommand {
            x_vel: 0.0,
            y_vel: 0.0,
            theta_vel: 0.0,
        };
    }
}

pub async fn run<L: LineSink>(
    dog: &RobotDog<L>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Controls: WASD=move, Z/X=rotate, Space=stop, R/F=speed, Q=quit");
    info!("Speed: {}", SPEED_LABELS[0]);

    enable_raw_mode()?;
    let result = run_teleop(dog).await;
    finish(dog, disable_raw_mode(), result).await
}

/// Leave the dog stopped whatever happened, including a terminal that
/// couldn't be restored
async fn finish<L: LineSink>(
    dog: &RobotDog<L>,
    restored: std::io::Result<()>,
    result: Result<(), Box<dyn std::error::Error + Send + Sync>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = &restored {
        warn!("Failed to restore terminal: {}", e);
    }
    if let Err(e) = apply(dog, BridgeAction::Stop).await {
        warn!("Failed to stop robot dog on exit: {}", e);
    }
    result?;
    restored?;
    Ok(())
}

async fn run_teleop<L: LineSink>(
    dog: &RobotDog<L>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut keymap = Keymap::default();
    let mut bridge = Bridge::new(INPUT_TIMEOUT);

    loop {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if pressed {
                    match keymap.handle(code) {
                        KeyOutcome::Move(cmd) => bridge.on_command(cmd, Instant::now()),
                        KeyOutcome::Speed(idx) => info!("Speed: {}", SPEED_LABELS[idx]),
                        KeyOutcome::Quit => break,
                        KeyOutcome::Ignored => {}
                    }
                }
            }
        }

        // Bridge watchdog turns released keys into a stop
        if let Some(action) = bridge.compute_action(Instant::now()) {
            if action == BridgeAction::Stop {
                keymap.reset();
            }
            if let Err(e) = apply(dog, action).await {
                warn!("Failed to send {:?}: {}", action, e);
            }
        }
    }

    Ok(())
}
