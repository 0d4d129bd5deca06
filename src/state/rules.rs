// Feature rule engine
//
// Owns the feature flags and the mount count of a session. Flag changes go
// through the transition table in `models::features`; the mount count is clamped
// into the range that the active features and machine model allow.

use crate::models::{FeatureKey, FeatureState, FeatureTransition, MountLimits};
use std::fmt;

/// Inclusive mount-count range with the reason it applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRange {
    pub min: u32,
    pub max: u32,
    pub label: Option<String>,
}

impl MountRange {
    pub fn contains(&self, value: i64) -> bool {
        value >= i64::from(self.min) && value <= i64::from(self.max)
    }

    pub fn clamp(&self, value: i64) -> u32 {
        value.max(i64::from(self.min)).min(i64::from(self.max)) as u32
    }

    /// Hint shown next to the input field, e.g. `Range: 1 - 9 (Small Shelf Limit)`
    pub fn hint(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MountRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Range: {} - {}", self.min, self.max)?;
        if let Some(label) = &self.label {
            write!(f, " {}", label)?;
        }
        Ok(())
    }
}

/// Result of validating a mount-count input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountValidation {
    /// Clamped value as text, ready to put back into the input field
    pub value: String,

    /// The parsed input was outside the allowed range
    pub has_error: bool,

    pub hint: String,
}

/// Feature flags plus the mount count they constrain
#[derive(Debug, Clone)]
pub struct FeatureRuleEngine {
    features: FeatureState,
    mount_count: u32,
    limits: MountLimits,
}

impl FeatureRuleEngine {
    pub fn new(limits: MountLimits) -> Self {
        Self {
            features: FeatureState::default(),
            mount_count: limits.default_min,
            limits,
        }
    }

    pub fn features(&self) -> FeatureState {
        self.features
    }

    /// Stored mount count, as last committed
    pub fn mount_count(&self) -> u32 {
        self.mount_count
    }

    /// Stored mount count clamped into the range currently in force
    pub fn current_mount_count(&self, model_name: &str) -> u32 {
        self.mount_range(model_name).clamp(i64::from(self.mount_count))
    }

    pub fn limits(&self) -> &MountLimits {
        &self.limits
    }

    /// Set the initial mount count for a freshly identified model
    pub fn initialize_mount_count(&mut self, model_name: &str) {
        self.mount_count = self.limits.initial_mount_count(model_name);
        tracing::debug!("Initial mount count for {}: {}", model_name, self.mount_count);
    }

    pub fn reset(&mut self) {
        self.features = FeatureState::default();
        self.mount_count = self.limits.default_min;
    }

    pub fn toggle(&mut self, key: FeatureKey) -> FeatureTransition {
        let transition = self.features.toggled(key);
        tracing::info!(
            "Toggled {}: {:?} -> {:?}",
            key,
            self.features,
            transition.state
        );
        self.features = transition.state;
        transition
    }

    /// Switching between bars and profiles is locked while the shift-cut device is active
    pub fn is_mode_switch_allowed(&self) -> bool {
        !self.features.shift_cut_device
    }

    /// Range allowed for the mount count, by priority:
    /// small shelf, big shelf, precision model, default.
    pub fn mount_range(&self, model_name: &str) -> MountRange {
        let limits = &self.limits;

        if self.features.small_shelf {
            MountRange {
                min: limits.equipped_min,
                max: limits.small_shelf_max,
                label: Some("(Small Shelf Limit)".to_string()),
            }
        } else if self.features.big_shelf {
            MountRange {
                min: limits.equipped_min,
                max: limits.default_max,
                label: Some("(Big Shelf Limit)".to_string()),
            }
        } else if model_name == limits.precision_model {
            MountRange {
                min: limits.equipped_min,
                max: limits.precision_model_max,
                label: Some(format!("({} Limit)", limits.precision_model)),
            }
        } else {
            MountRange {
                min: limits.default_min,
                max: limits.default_max,
                label: None,
            }
        }
    }

    /// Validate raw input and commit the clamped value.
    ///
    /// Empty or non-numeric input counts as 0. `has_error` reflects the parsed
    /// value, so an out-of-range entry is flagged even though a safe value is
    /// stored.
    pub fn validate_mount_count(&mut self, raw_input: &str, model_name: &str) -> MountValidation {
        let range = self.mount_range(model_name);
        let parsed = parse_mount_input(raw_input);
        let clamped = range.clamp(parsed);

        self.mount_count = clamped;

        MountValidation {
            value: clamped.to_string(),
            has_error: !range.contains(parsed),
            hint: range.hint(),
        }
    }

    /// Re-validate the stored mount count, e.g. after the range changed
    pub fn commit_mount_count(&mut self, model_name: &str) -> MountValidation {
        let stored = self.mount_count.to_string();
        self.validate_mount_count(&stored, model_name)
    }
}

/// Parse user input as an integer; digit strings too long for `i64` saturate.
fn parse_mount_input(raw_input: &str) -> i64 {
    let trimmed = raw_input.trim();
    if trimmed.is_empty() {
        return 0;
    }

    match trimmed.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            let (negative, digits) = match trimmed.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
            };
            let is_number = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
            match (is_number, negative) {
                (true, true) => i64::MIN,
                (true, false) => i64::MAX,
                (false, _) => 0,
            }
        }
    }
}
