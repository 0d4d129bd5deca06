//! Feature flags and the transition table that keeps them consistent.
//!
//! [`FeatureState::toggled`] is a pure function from (state, key) to the next
//! state. After every transition the following hold:
//! - at most one shelf is active
//! - an active shelf implies robot mode and excludes the shift-cut device
//! - robot mode is never active without a shelf

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A configurable machine feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKey {
    #[serde(rename = "ShiftCutDevice")]
    ShiftCutDevice,
    #[serde(rename = "createShelf")]
    SmallShelf,
    #[serde(rename = "createBigShelf")]
    BigShelf,
    #[serde(rename = "RobotMode")]
    RobotMode,
}

impl FeatureKey {
    /// Canonical order, also used for the descriptor's feature list
    pub const ALL: [FeatureKey; 4] = [
        FeatureKey::ShiftCutDevice,
        FeatureKey::SmallShelf,
        FeatureKey::BigShelf,
        FeatureKey::RobotMode,
    ];

    /// Name used in the output descriptor and by the host application
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKey::ShiftCutDevice => "ShiftCutDevice",
            FeatureKey::SmallShelf => "createShelf",
            FeatureKey::BigShelf => "createBigShelf",
            FeatureKey::RobotMode => "RobotMode",
        }
    }

    pub fn is_shelf(&self) -> bool {
        matches!(self, FeatureKey::SmallShelf | FeatureKey::BigShelf)
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown feature: {0}")]
pub struct FeatureKeyError(pub String);

impl FromStr for FeatureKey {
    type Err = FeatureKeyError;

    /// Accepts the descriptor names as well as kebab-case aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ShiftCutDevice" | "shift-cut-device" => Ok(FeatureKey::ShiftCutDevice),
            "createShelf" | "small-shelf" => Ok(FeatureKey::SmallShelf),
            "createBigShelf" | "big-shelf" => Ok(FeatureKey::BigShelf),
            "RobotMode" | "robot-mode" => Ok(FeatureKey::RobotMode),
            other => Err(FeatureKeyError(other.to_string())),
        }
    }
}

/// The four feature flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureState {
    pub shift_cut_device: bool,
    pub small_shelf: bool,
    pub big_shelf: bool,
    pub robot_mode: bool,
}

/// Result of applying one toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureTransition {
    pub state: FeatureState,

    /// Set when the shift-cut device was switched on; testing is then bars-only
    pub forces_bars_mode: bool,
}

impl FeatureState {
    pub fn get(&self, key: FeatureKey) -> bool {
        match key {
            FeatureKey::ShiftCutDevice => self.shift_cut_device,
            FeatureKey::SmallShelf => self.small_shelf,
            FeatureKey::BigShelf => self.big_shelf,
            FeatureKey::RobotMode => self.robot_mode,
        }
    }

    fn set(&mut self, key: FeatureKey, value: bool) {
        match key {
            FeatureKey::ShiftCutDevice => self.shift_cut_device = value,
            FeatureKey::SmallShelf => self.small_shelf = value,
            FeatureKey::BigShelf => self.big_shelf = value,
            FeatureKey::RobotMode => self.robot_mode = value,
        }
    }

    pub fn any_shelf(&self) -> bool {
        self.small_shelf || self.big_shelf
    }

    /// Active features in canonical order
    pub fn active(&self) -> Vec<FeatureKey> {
        FeatureKey::ALL
            .into_iter()
            .filter(|key| self.get(*key))
            .collect()
    }

    /// Whether a feature can currently be toggled on by the operator.
    ///
    /// Robot mode needs a shelf, the shift-cut device cannot coexist with one.
    /// Switching a feature off is always possible.
    pub fn is_blocked(&self, key: FeatureKey) -> bool {
        match key {
            FeatureKey::RobotMode => !self.any_shelf(),
            FeatureKey::ShiftCutDevice => self.any_shelf(),
            _ => false,
        }
    }

    /// Flip `key` and apply the consistency rules.
    pub fn toggled(self, key: FeatureKey) -> FeatureTransition {
        let mut next = self;
        next.set(key, !self.get(key));

        if key.is_shelf() && next.get(key) {
            let other = if key == FeatureKey::SmallShelf {
                FeatureKey::BigShelf
            } else {
                FeatureKey::SmallShelf
            };
            next.set(other, false);
            next.robot_mode = true;
            next.shift_cut_device = false;
        } else if !next.any_shelf() {
            next.robot_mode = false;
        }

        let mut forces_bars_mode = false;
        if key == FeatureKey::ShiftCutDevice && next.shift_cut_device {
            if next.any_shelf() {
                next.shift_cut_device = false;
            } else {
                forces_bars_mode = true;
            }
        }

        FeatureTransition {
            state: next,
            forces_bars_mode,
        }
    }
}
