// ev3-tacho: drive a single EV3 tacho motor from the command line
//
// Usage: ev3-tacho --port A --driver large rotations 360 2.5
// Set RUST_LOG=debug to see every attribute write.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ev3_tacho::config::{EV3_LARGE, EV3_MEDIUM, SYSFS_ROOT};
use ev3_tacho::messages::StopAction;
use ev3_tacho::motor::TachoMotor;

#[derive(Parser, Debug)]
#[command(name = "ev3-tacho", about = "Control a LEGO EV3 tacho motor")]
struct Cli {
    /// Output port ("A".."D" or a full address such as ev3-ports:outA)
    #[arg(short, long, default_value = "A")]
    port: String,

    /// Motor driver: large, medium, or a raw kernel driver name
    #[arg(short, long, default_value = "large")]
    driver: String,

    /// Root of the sysfs mount
    #[arg(long, default_value = SYSFS_ROOT)]
    sysfs_root: String,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the motor's static properties as JSON
    Info,
    /// Print the motor's state flags and position as JSON
    State,
    /// Run at a speed (deg/s) until stopped
    Run {
        #[arg(allow_negative_numbers = true)]
        speed: i32,
    },
    /// Run at a speed (deg/s) for a number of rotations
    Rotations {
        #[arg(allow_negative_numbers = true)]
        speed: i32,
        #[arg(allow_negative_numbers = true)]
        rotations: f32,
        #[arg(long, value_enum, default_value_t = StopArg::Hold)]
        stop_action: StopArg,
        /// Return immediately instead of waiting for the move to finish
        #[arg(long)]
        no_wait: bool,
    },
    /// Run at a speed (deg/s) for a duration in seconds
    Time {
        #[arg(allow_negative_numbers = true)]
        speed: i32,
        seconds: f32,
        #[arg(long, value_enum, default_value_t = StopArg::Hold)]
        stop_action: StopArg,
        /// Let the driver time the run and return immediately
        #[arg(long)]
        no_wait: bool,
    },
    /// Run with a raw duty cycle (-100..100 percent)
    Unregulated {
        #[arg(allow_negative_numbers = true)]
        duty_cycle: i32,
    },
    /// Stop the motor
    Stop {
        #[arg(long, value_enum, default_value_t = StopArg::Hold)]
        stop_action: StopArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StopArg {
    Coast,
    Brake,
    Hold,
}

impl From<StopArg> for StopAction {
    fn from(arg: StopArg) -> Self {
        match arg {
            StopArg::Coast => StopAction::Coast,
            StopArg::Brake => StopAction::Brake,
            StopArg::Hold => StopAction::Hold,
        }
    }
}

fn driver_name(driver: &str) -> &str {
    match driver {
        "large" => EV3_LARGE,
        "medium" => EV3_MEDIUM,
        other => other,
    }
}

fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut motor = TachoMotor::with_sysfs_root(&cli.sysfs_root, &cli.port, driver_name(&cli.driver))?;

    match cli.command {
        Action::Info => {
            println!("{}", serde_json::to_string_pretty(&motor.info())?);
        }
        Action::State => {
            let report = serde_json::json!({
                "state": motor.state()?,
                "position": motor.position()?,
                "rotations": motor.position_rotations()?,
                "duty_cycle": motor.duty_cycle()?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Action::Run { speed } => motor.run(speed)?,
        Action::Rotations {
            speed,
            rotations,
            stop_action,
            no_wait,
        } => motor.run_for_rotations(speed, rotations, stop_action.into(), !no_wait)?,
        Action::Time {
            speed,
            seconds,
            stop_action,
            no_wait,
        } => motor.run_for_time(speed, seconds, stop_action.into(), !no_wait)?,
        Action::Unregulated { duty_cycle } => motor.run_unregulated(duty_cycle)?,
        Action::Stop { stop_action } => motor.stop(stop_action.into())?,
    }

    Ok(())
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
