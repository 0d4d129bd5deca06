use serde::{Deserialize, Serialize};

/// Model name used until the configuration member has been resolved
pub const UNKNOWN_MODEL: &str = "UNKNOWN";

/// Display label used until the configuration member has been resolved
pub const UNKNOWN_DISPLAY: &str = "Unknown Machine";

/// Identity of the machine an archive was exported from.
///
/// `model_name` is either the canonical short code from the machine-type
/// table (e.g. `AF500`) or the raw id when the table has no entry for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub model_name: String,
    pub display_string: String,
}

impl Default for MachineIdentity {
    fn default() -> Self {
        Self::unknown()
    }
}

impl MachineIdentity {
    pub fn unknown() -> Self {
        Self {
            model_name: UNKNOWN_MODEL.to_string(),
            display_string: UNKNOWN_DISPLAY.to_string(),
        }
    }

    /// Identity for a model found in the machine-type table
    pub fn named(name: &str) -> Self {
        Self {
            model_name: name.to_string(),
            display_string: name.replace('_', " "),
        }
    }

    /// Identity for an id with no machine-type table entry
    pub fn raw_id(id: &str) -> Self {
        Self {
            model_name: id.to_string(),
            display_string: format!("ID {}", id),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.model_name == UNKNOWN_MODEL
    }
}
