// Sysfs locations, port naming and polling defaults
use std::time::Duration;

// Root of the sysfs mount
pub const SYSFS_ROOT: &str = "/sys";

// Device class the tacho-motor driver registers under /sys/class
pub const TACHO_MOTOR_CLASS: &str = "tacho-motor";

// Single-letter output ports are expanded with this prefix ("A" -> "ev3-ports:outA")
pub const OUTPUT_PORT_PREFIX: &str = "ev3-ports:out";

// Driver names reported by the kernel
pub const EV3_LARGE: &str = "lego-ev3-l-motor"; // LEGO EV3 Large Motor
pub const EV3_MEDIUM: &str = "lego-ev3-m-motor"; // LEGO EV3 Medium Motor

// Delay between state reads while waiting for a position move to finish
pub const STATE_POLL_INTERVAL: Duration = Duration::from_millis(10);
