// Tacho motor controller
//
// Wraps one tacho-motor device node and exposes run/stop commands in
// engineering units (degrees/second, rotations, seconds).

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, info};

use super::sysfs::{self, Attribute, SysfsError};
use super::units::{
    counts_to_deg_s, counts_to_rotations, deg_s_to_counts, rotations_to_counts, seconds_to_ms,
};
use crate::config::{
    EV3_LARGE, EV3_MEDIUM, OUTPUT_PORT_PREFIX, STATE_POLL_INTERVAL, SYSFS_ROOT, TACHO_MOTOR_CLASS,
};
use crate::messages::{MotorInfo, MotorState, StopAction};

/// Duty cycle limits in percent
pub const DUTY_CYCLE_MIN: i32 = -100;
pub const DUTY_CYCLE_MAX: i32 = 100;

/// Error types for motor control
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("{driver} not found on port {port}")]
    NotFound { driver: String, port: String },

    #[error("{quantity} is out of range: {value}")]
    ValueOutOfRange { quantity: &'static str, value: String },

    #[error(transparent)]
    Sysfs(#[from] SysfsError),
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Commands accepted by the `command` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RunForever,
    RunToRelPos,
    RunTimed,
    RunDirect,
    Stop,
    Reset,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::RunForever => "run-forever",
            Command::RunToRelPos => "run-to-rel-pos",
            Command::RunTimed => "run-timed",
            Command::RunDirect => "run-direct",
            Command::Stop => "stop",
            Command::Reset => "reset",
        }
    }
}

/// Expand a single-letter output port ("A") to its full address
pub fn port_address(port: &str) -> String {
    if port.chars().count() == 1 {
        format!("{}{}", OUTPUT_PORT_PREFIX, port)
    } else {
        port.to_string()
    }
}

/// A motor with position feedback
pub struct TachoMotor {
    port: String,

    // Static properties, read once
    commands: Vec<String>,
    count_per_rot: i32,
    driver_name: String,
    max_speed: i32,
    stop_actions: Vec<String>,

    // Endpoints
    command: Attribute,
    duty_cycle: Attribute,
    duty_cycle_sp: Attribute,
    position: Attribute,
    position_sp: Attribute,
    speed_sp: Attribute,
    state: Attribute,
    stop_action: Attribute,
    time_sp: Attribute,
}

impl TachoMotor {
    /// Open the motor bound to `driver` on `port`
    pub fn new(port: &str, driver: &str) -> Result<Self> {
        Self::with_sysfs_root(SYSFS_ROOT, port, driver)
    }

    /// Open an EV3 Large Motor
    pub fn large(port: &str) -> Result<Self> {
        Self::new(port, EV3_LARGE)
    }

    /// Open an EV3 Medium Motor
    pub fn medium(port: &str) -> Result<Self> {
        Self::new(port, EV3_MEDIUM)
    }

    /// Open a motor under a custom sysfs mount
    ///
    /// The motor is reset and its static properties are read and cached.
    pub fn with_sysfs_root(root: impl AsRef<Path>, port: &str, driver: &str) -> Result<Self> {
        let port = port_address(port);
        let node = sysfs::find_node(root.as_ref(), TACHO_MOTOR_CLASS, &port, driver)?.ok_or_else(
            || MotorError::NotFound {
                driver: driver.to_string(),
                port: port.clone(),
            },
        )?;
        info!("Opening {} on {} ({})", driver, port, node.display());

        let attr = |name: &str| Attribute::new(&node, name);

        let command = attr("command");
        let motor = Self {
            commands: attr("commands").read_list()?,
            count_per_rot: attr("count_per_rot").read_int()?,
            driver_name: attr("driver_name").read()?,
            max_speed: attr("max_speed").read_int()?,
            stop_actions: attr("stop_actions").read_list()?,
            duty_cycle: attr("duty_cycle"),
            duty_cycle_sp: attr("duty_cycle_sp"),
            position: attr("position"),
            position_sp: attr("position_sp"),
            speed_sp: attr("speed_sp"),
            state: attr("state"),
            stop_action: attr("stop_action"),
            time_sp: attr("time_sp"),
            command,
            port,
        };

        motor.send(Command::Reset)?;
        debug!(
            "Motor {}: count_per_rot={}, max_speed={}, stop_actions={:?}",
            motor.port, motor.count_per_rot, motor.max_speed, motor.stop_actions
        );
        Ok(motor)
    }

    /// Run at `speed` degrees/second until another command is given
    pub fn run(&mut self, speed: i32) -> Result<()> {
        self.set_speed_sp(speed)?;
        self.send(Command::RunForever)
    }

    /// Run at `speed` degrees/second for a number of rotations
    ///
    /// With `wait`, blocks until the move has completed.
    pub fn run_for_rotations(
        &mut self,
        speed: i32,
        rotations: f32,
        stop_action: StopAction,
        wait: bool,
    ) -> Result<()> {
        // The driver ignores the sign of speed_sp for relative moves, so the
        // direction has to be carried by the position setpoint instead
        let rotations = if speed < 0 { -rotations } else { rotations };
        self.set_speed_sp(speed)?;
        self.set_stop_action(stop_action)?;
        self.set_position_sp(rotations)?;
        self.send(Command::RunToRelPos)?;

        if wait {
            self.wait_until_settled()?;
        }
        Ok(())
    }

    /// Run at `speed` degrees/second for `time` seconds
    ///
    /// With `wait`, the duration is timed here and this call blocks;
    /// otherwise the driver times the run itself and this returns immediately.
    pub fn run_for_time(
        &mut self,
        speed: i32,
        time: f32,
        stop_action: StopAction,
        wait: bool,
    ) -> Result<()> {
        self.set_speed_sp(speed)?;
        let ms = self.set_time_sp(time)?;
        self.set_stop_action(stop_action)?;

        if wait {
            self.send(Command::RunForever)?;
            sleep(Duration::from_millis(ms as u64));
            self.send(Command::Stop)
        } else {
            self.send(Command::RunTimed)
        }
    }

    /// Run with a raw duty cycle (-100 to 100 percent), bypassing speed regulation
    pub fn run_unregulated(&mut self, duty_cycle: i32) -> Result<()> {
        self.set_duty_cycle_sp(duty_cycle)?;
        self.send(Command::RunDirect)
    }

    /// Stop the motor using `action`
    pub fn stop(&mut self, action: StopAction) -> Result<()> {
        self.set_stop_action(action)?;
        self.send(Command::Stop)
    }

    // === Readers ===

    /// Current state flags
    pub fn state(&self) -> Result<MotorState> {
        Ok(MotorState::parse(&self.state.read()?))
    }

    /// Current position in tacho counts
    pub fn position(&self) -> Result<i32> {
        Ok(self.position.read_int()?)
    }

    /// Current position in rotations
    pub fn position_rotations(&self) -> Result<f32> {
        Ok(counts_to_rotations(self.position()?, self.count_per_rot))
    }

    /// Current duty cycle in percent
    pub fn duty_cycle(&self) -> Result<i32> {
        Ok(self.duty_cycle.read_int()?)
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn count_per_rot(&self) -> i32 {
        self.count_per_rot
    }

    /// Maximum speed in tacho counts/second
    pub fn max_speed(&self) -> i32 {
        self.max_speed
    }

    /// Maximum speed in degrees/second accepted by the speed setters
    pub fn max_speed_deg_s(&self) -> i32 {
        counts_to_deg_s(self.max_speed, self.count_per_rot)
    }

    /// Nominal speed in degrees/second under ideal conditions (no load at 9V)
    ///
    /// The obtainable speed depends on load and battery voltage.
    pub fn nominal_speed(&self) -> i32 {
        self.max_speed_deg_s()
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn stop_actions(&self) -> &[String] {
        &self.stop_actions
    }

    pub fn info(&self) -> MotorInfo {
        MotorInfo {
            port: self.port.clone(),
            driver_name: self.driver_name.clone(),
            count_per_rot: self.count_per_rot,
            max_speed: self.max_speed,
            nominal_speed: self.nominal_speed(),
            commands: self.commands.clone(),
            stop_actions: self.stop_actions.clone(),
        }
    }

    // === Setpoints ===

    fn send(&self, command: Command) -> Result<()> {
        info!("Motor {}: {}", self.port, command.as_str());
        self.command.write(command.as_str())?;
        Ok(())
    }

    fn wait_until_settled(&self) -> Result<()> {
        while !self.state()?.is_settled() {
            sleep(STATE_POLL_INTERVAL);
        }
        Ok(())
    }

    fn set_speed_sp(&mut self, speed: i32) -> Result<()> {
        let counts = deg_s_to_counts(speed, self.count_per_rot);
        if counts.abs() > self.max_speed as i64 {
            return Err(MotorError::ValueOutOfRange {
                quantity: "speed",
                value: format!("{} deg/s", speed),
            });
        }
        self.speed_sp.write_int(counts as i32)?;
        Ok(())
    }

    fn set_position_sp(&mut self, rotations: f32) -> Result<()> {
        let counts = rotations_to_counts(rotations, self.count_per_rot);
        self.position_sp.write_int(counts)?;
        Ok(())
    }

    /// Returns the written setpoint in milliseconds
    fn set_time_sp(&mut self, time: f32) -> Result<i32> {
        let ms = seconds_to_ms(time).ok_or_else(|| MotorError::ValueOutOfRange {
            quantity: "time",
            value: format!("{} s", time),
        })?;
        self.time_sp.write_int(ms)?;
        Ok(ms)
    }

    fn set_duty_cycle_sp(&mut self, duty_cycle: i32) -> Result<()> {
        if !(DUTY_CYCLE_MIN..=DUTY_CYCLE_MAX).contains(&duty_cycle) {
            return Err(MotorError::ValueOutOfRange {
                quantity: "duty cycle",
                value: format!("{}%", duty_cycle),
            });
        }
        self.duty_cycle_sp.write_int(duty_cycle)?;
        Ok(())
    }

    fn set_stop_action(&mut self, action: StopAction) -> Result<()> {
        if !self.stop_actions.iter().any(|a| a == action.as_str()) {
            return Err(MotorError::ValueOutOfRange {
                quantity: "stop action",
                value: action.to_string(),
            });
        }
        self.stop_action.write(action.as_str())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Instant;
    use tempfile::{tempdir, TempDir};

    /// Fake sysfs tree with a single tacho-motor node
    struct FakeMotor {
        root: TempDir,
        node: PathBuf,
    }

    impl FakeMotor {
        fn new(address: &str, driver: &str) -> Self {
            Self::with_stop_actions(address, driver, "coast brake hold")
        }

        fn with_stop_actions(address: &str, driver: &str, stop_actions: &str) -> Self {
            let root = tempdir().unwrap();
            let node = root.path().join("class/tacho-motor/motor0");
            fs::create_dir_all(&node).unwrap();

            let attrs = [
                ("address", address),
                ("driver_name", driver),
                (
                    "commands",
                    "run-forever run-to-abs-pos run-to-rel-pos run-timed run-direct stop reset",
                ),
                ("count_per_rot", "360"),
                ("max_speed", "1050"),
                ("stop_actions", stop_actions),
                ("command", ""),
                ("duty_cycle", "0"),
                ("duty_cycle_sp", "0"),
                ("position", "0"),
                ("position_sp", "0"),
                ("speed_sp", "0"),
                ("state", ""),
                ("stop_action", "coast"),
                ("time_sp", "0"),
            ];
            for (name, value) in attrs {
                fs::write(node.join(name), format!("{}\n", value)).unwrap();
            }

            Self { root, node }
        }

        fn open(&self, port: &str) -> Result<TachoMotor> {
            TachoMotor::with_sysfs_root(self.root.path(), port, EV3_LARGE)
        }

        fn read(&self, name: &str) -> String {
            fs::read_to_string(self.node.join(name))
                .unwrap()
                .trim()
                .to_string()
        }

        fn write(&self, name: &str, value: &str) {
            fs::write(self.node.join(name), value).unwrap();
        }
    }

    #[test]
    fn test_port_address() {
        assert_eq!(port_address("A"), "ev3-ports:outA");
        assert_eq!(port_address("ev3-ports:outD"), "ev3-ports:outD");
    }

    #[test]
    fn test_construct_resets_and_caches() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let motor = fake.open("A").unwrap();

        assert_eq!(fake.read("command"), "reset");
        assert_eq!(motor.port(), "ev3-ports:outA");
        assert_eq!(motor.driver_name(), EV3_LARGE);
        assert_eq!(motor.count_per_rot(), 360);
        assert_eq!(motor.max_speed(), 1050);
        assert_eq!(motor.max_speed_deg_s(), 1050);
        assert_eq!(motor.stop_actions(), ["coast", "brake", "hold"]);
        assert!(motor.commands().iter().any(|c| c == "run-direct"));

        let info = motor.info();
        assert_eq!(info.nominal_speed, 1050);
        assert_eq!(info.port, "ev3-ports:outA");
    }

    #[test]
    fn test_construct_not_found() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);

        let err = fake.open("B").err().unwrap();
        assert!(matches!(err, MotorError::NotFound { ref port, .. } if port == "ev3-ports:outB"));

        let err = TachoMotor::with_sysfs_root(fake.root.path(), "A", EV3_MEDIUM)
            .err()
            .unwrap();
        assert!(matches!(err, MotorError::NotFound { .. }));
        assert_eq!(err.to_string(), "lego-ev3-m-motor not found on port ev3-ports:outA");
    }

    #[test]
    fn test_run() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        motor.run(-720).unwrap();
        assert_eq!(fake.read("speed_sp"), "-720");
        assert_eq!(fake.read("command"), "run-forever");
    }

    #[test]
    fn test_speed_out_of_range() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        let max = motor.max_speed_deg_s();
        motor.run(max).unwrap();
        motor.run(-max).unwrap();

        let err = motor.run(max + 1).unwrap_err();
        assert!(matches!(err, MotorError::ValueOutOfRange { quantity: "speed", .. }));
        // Nothing written on rejection
        assert_eq!(fake.read("speed_sp"), (-max).to_string());
        assert_eq!(fake.read("command"), "run-forever");
    }

    #[test]
    fn test_run_for_rotations_direction() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        motor
            .run_for_rotations(360, 2.0, StopAction::Brake, false)
            .unwrap();
        assert_eq!(fake.read("position_sp"), "720");
        assert_eq!(fake.read("speed_sp"), "360");
        assert_eq!(fake.read("stop_action"), "brake");
        assert_eq!(fake.read("command"), "run-to-rel-pos");

        motor
            .run_for_rotations(-360, 2.0, StopAction::Brake, false)
            .unwrap();
        assert_eq!(fake.read("position_sp"), "-720");

        // Negative speed and negative rotations cancel out
        motor
            .run_for_rotations(-360, -0.5, StopAction::Hold, false)
            .unwrap();
        assert_eq!(fake.read("position_sp"), "180");
    }

    #[test]
    fn test_run_for_rotations_wait_returns_when_settled() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        fake.write("state", "running holding\n");
        motor
            .run_for_rotations(180, 1.0, StopAction::Hold, true)
            .unwrap();

        fake.write("state", "");
        motor
            .run_for_rotations(180, 1.0, StopAction::Hold, true)
            .unwrap();
        assert_eq!(fake.read("command"), "run-to-rel-pos");
    }

    #[test]
    fn test_run_for_rotations_wait_polls_until_stopped() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();
        fake.write("state", "running\n");

        let state_path = fake.node.join("state");
        let clear = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            fs::write(state_path, "").unwrap();
        });

        let start = Instant::now();
        motor
            .run_for_rotations(180, 1.0, StopAction::Hold, true)
            .unwrap();
        let elapsed = start.elapsed();
        clear.join().unwrap();

        assert!(elapsed >= Duration::from_millis(60), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
        assert!(motor.state().unwrap().is_settled());
    }

    #[test]
    fn test_run_for_time_wait_blocks_for_duration() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        let start = Instant::now();
        motor
            .run_for_time(300, 0.25, StopAction::Brake, true)
            .unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(250), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
        assert_eq!(fake.read("time_sp"), "250");
        assert_eq!(fake.read("command"), "stop");
    }

    #[test]
    fn test_run_for_time() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        motor
            .run_for_time(500, 1.25, StopAction::Coast, false)
            .unwrap();
        assert_eq!(fake.read("time_sp"), "1250");
        assert_eq!(fake.read("speed_sp"), "500");
        assert_eq!(fake.read("stop_action"), "coast");
        assert_eq!(fake.read("command"), "run-timed");

        motor
            .run_for_time(500, 0.125, StopAction::Hold, true)
            .unwrap();
        assert_eq!(fake.read("time_sp"), "125");
        assert_eq!(fake.read("command"), "stop");

        let err = motor
            .run_for_time(500, -1.0, StopAction::Hold, false)
            .unwrap_err();
        assert!(matches!(err, MotorError::ValueOutOfRange { quantity: "time", .. }));
    }

    #[test]
    fn test_run_unregulated() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        motor.run_unregulated(-100).unwrap();
        assert_eq!(fake.read("duty_cycle_sp"), "-100");
        assert_eq!(fake.read("command"), "run-direct");

        for duty in [101, -101, i32::MAX] {
            let err = motor.run_unregulated(duty).unwrap_err();
            assert!(matches!(
                err,
                MotorError::ValueOutOfRange { quantity: "duty cycle", .. }
            ));
        }
        assert_eq!(fake.read("duty_cycle_sp"), "-100");
    }

    #[test]
    fn test_stop() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        motor.run(100).unwrap();
        motor.stop(StopAction::Brake).unwrap();
        assert_eq!(fake.read("stop_action"), "brake");
        assert_eq!(fake.read("command"), "stop");
    }

    #[test]
    fn test_unsupported_stop_action() {
        let fake = FakeMotor::with_stop_actions("ev3-ports:outA", EV3_LARGE, "coast brake");
        let mut motor = fake.open("A").unwrap();

        let err = motor.stop(StopAction::Hold).unwrap_err();
        assert!(matches!(
            err,
            MotorError::ValueOutOfRange { quantity: "stop action", .. }
        ));
        // Stop command not issued
        assert_eq!(fake.read("command"), "reset");
        assert_eq!(fake.read("stop_action"), "coast");
    }

    #[test]
    fn test_readers() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let motor = fake.open("A").unwrap();

        fake.write("position", "-540\n");
        fake.write("duty_cycle", "42\n");
        fake.write("state", "running stalled\n");

        assert_eq!(motor.position().unwrap(), -540);
        assert!((motor.position_rotations().unwrap() + 1.5).abs() < 1e-6);
        assert_eq!(motor.duty_cycle().unwrap(), 42);

        let state = motor.state().unwrap();
        assert!(state.running);
        assert!(state.stalled);
        assert!(!state.holding);
    }

    #[test]
    fn test_write_failure_propagates() {
        let fake = FakeMotor::new("ev3-ports:outA", EV3_LARGE);
        let mut motor = fake.open("A").unwrap();

        // Replace the attribute file with a directory so writes fail
        fs::remove_file(fake.node.join("duty_cycle_sp")).unwrap();
        fs::create_dir(fake.node.join("duty_cycle_sp")).unwrap();

        let err = motor.run_unregulated(50).unwrap_err();
        assert!(matches!(err, MotorError::Sysfs(SysfsError::Io { .. })));
        assert_eq!(fake.read("command"), "reset");
    }
}
