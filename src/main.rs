use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use robotdog_base::base::{Base, CallOptions, Connection, RobotDog, SendPolicy};
use robotdog_base::config::{BaseConfig, DEFAULT_PORT};
use robotdog_base::messages::Vector3;
use robotdog_base::{runtime, simulator, teleop};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive a robot dog base over its TCP command protocol")]
struct Cli {
    #[command(flatten)]
    target: Target,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args, Debug)]
struct Target {
    /// IP address of the robot dog server
    #[arg(long, global = true)]
    ip: Option<String>,

    /// Command port of the robot dog server
    #[arg(long, global = true)]
    port: Option<u16>,

    /// JSON attribute file, e.g. {"ip_address": "192.168.1.20", "port": 5001}
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Return transmission failures instead of logging them
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Walk straight (velocity in mm/s, negative for backward)
    Straight {
        #[arg(long, default_value_t = 1000.0)]
        distance: f64,
        #[arg(long, allow_negative_numbers = true)]
        velocity: f64,
    },
    /// Turn in place (angle in degrees, velocity in deg/s)
    Spin {
        #[arg(long, allow_negative_numbers = true)]
        angle: f64,
        #[arg(long, allow_negative_numbers = true)]
        velocity: f64,
    },
    /// Drive with power fractions in [-1, 1]
    Power {
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        linear_y: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        angular_z: f64,
    },
    /// Drive with velocities (mm/s and deg/s)
    Velocity {
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        linear_x: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        linear_y: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        angular_z: f64,
    },
    /// Stop moving
    Stop,
    /// Print the base properties
    Properties,
    /// Forward Zenoh velocity commands to the dog
    Bridge,
    /// Drive the dog from the keyboard
    Teleop,
    /// Run a stand-in command server that logs what it receives
    Simulate {
        #[arg(long, default_value_t = format!("0.0.0.0:{}", DEFAULT_PORT))]
        listen: String,
    },
}

impl Target {
    fn base_config(&self) -> Result<BaseConfig, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = match &self.config {
            Some(path) => BaseConfig::from_json_file(path)?,
            None => BaseConfig::new(String::new()),
        };
        if let Some(ip) = &self.ip {
            config.ip_address = ip.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.validate()?;
        Ok(config)
    }

    fn policy(&self) -> SendPolicy {
        if self.strict {
            SendPolicy::Strict
        } else {
            SendPolicy::BestEffort
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match cli.command {
        Cmd::Simulate { listen } => simulate(&listen).await,
        command => {
            let config = cli.target.base_config()?;
            let dog = RobotDog::connect(&config, cli.target.policy()).await?;
            let result = drive(&dog, command).await;
            dog.link().disconnect().await;
            result
        }
    }
}

async fn simulate(listen: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(listen).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    // The simulator logs every command; nothing else consumes them here
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    simulator::serve(listener, tx).await?;
    Ok(())
}

async fn drive(
    dog: &RobotDog<Connection>,
    command: Cmd,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = CallOptions::default();

    match command {
        Cmd::Straight { distance, velocity } => {
            dog.move_straight(distance, velocity, &opts).await?
        }
        Cmd::Spin { angle, velocity } => dog.spin(angle, velocity, &opts).await?,
        Cmd::Power {
            linear_y,
            angular_z,
        } => {
            dog.set_power(
                Vector3::new(0.0, linear_y, 0.0),
                Vector3::new(0.0, 0.0, angular_z),
                &opts,
            )
            .await?
        }
        Cmd::Velocity {
            linear_x,
            linear_y,
            angular_z,
        } => {
            dog.set_velocity(
                Vector3::new(linear_x, linear_y, 0.0),
                Vector3::new(0.0, 0.0, angular_z),
                &opts,
            )
            .await?
        }
        Cmd::Stop => dog.stop(&opts).await?,
        Cmd::Properties => {
            let props = dog.get_properties(&opts).await;
            println!("{}", serde_json::to_string_pretty(&props)?);
        }
        Cmd::Bridge => runtime::run(dog).await?,
        Cmd::Teleop => teleop::run(dog).await?,
        Cmd::Simulate { listen } => simulate(&listen).await?,
    }

    info!("Done");
    Ok(())
}
