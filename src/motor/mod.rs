// Motor control module for LEGO EV3 tacho motors
//
// Provides:
// - Sysfs device discovery and attribute access
// - Unit conversions (deg/s, rotations, seconds <-> tacho counts, ms)
// - High-level tacho motor API

pub mod sysfs;
mod tacho;
pub mod units;

pub use sysfs::{Attribute, SysfsError};
pub use tacho::{port_address, Command, MotorError, TachoMotor, DUTY_CYCLE_MAX, DUTY_CYCLE_MIN};
