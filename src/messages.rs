// Value types exchanged with the tacho-motor driver and reported by the CLI

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Behavior applied when the motor halts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopAction {
    /// Remove power and let the motor spin down freely
    Coast,
    /// Short the windings so the motor stops quickly
    Brake,
    /// Actively hold the current position
    #[default]
    Hold,
}

impl StopAction {
    /// String the kernel uses for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            StopAction::Coast => "coast",
            StopAction::Brake => "brake",
            StopAction::Hold => "hold",
        }
    }
}

impl fmt::Display for StopAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coast" => Ok(StopAction::Coast),
            "brake" => Ok(StopAction::Brake),
            "hold" => Ok(StopAction::Hold),
            other => Err(format!("unknown stop action '{}'", other)),
        }
    }
}

/// Flags reported by the `state` attribute
// An empty state means the motor is idle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MotorState {
    pub running: bool,
    pub ramping: bool,
    pub holding: bool,
    pub overloaded: bool,
    pub stalled: bool,
}

impl MotorState {
    /// Parse the space-separated flag list; unknown flags are ignored
    pub fn parse(raw: &str) -> Self {
        let mut state = Self::default();
        for flag in raw.split_whitespace() {
            match flag {
                "running" => state.running = true,
                "ramping" => state.ramping = true,
                "holding" => state.holding = true,
                "overloaded" => state.overloaded = true,
                "stalled" => state.stalled = true,
                _ => {}
            }
        }
        state
    }

    /// A position move is finished once the motor stops running or starts holding
    pub fn is_settled(&self) -> bool {
        !self.running || self.holding
    }
}

/// Snapshot of a motor's static properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotorInfo {
    pub port: String,
    pub driver_name: String,
    pub count_per_rot: i32,
    pub max_speed: i32,     // tacho counts per second
    pub nominal_speed: i32, // degrees per second
    pub commands: Vec<String>,
    pub stop_actions: Vec<String>,
}
