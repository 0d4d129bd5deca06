use serde::{Deserialize, Serialize};

/// Engine configuration loaded from `machseq.yaml`.
///
/// Every field has a default so a missing or partial file still yields a
/// usable configuration. Environment overrides are layered on top by
/// [`crate::config::ConfigManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local directory uploaded archives are copied into
    pub upload_dir: String,

    /// Member holding the machine's plain-text configuration
    pub config_member: String,

    pub bars_folder: String,
    pub profiles_folder: String,

    /// Member name of the descriptor added on export
    pub descriptor_name: String,

    /// Suffix appended to the uploaded file stem for the suggested export name
    pub export_suffix: String,

    /// Field tags extracted from every XML test file
    pub xml_tags: Vec<String>,

    pub identity: IdentitySettings,
    pub mount_limits: MountLimits,
    pub logging: LogSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_string(),
            config_member: "Configuration/MainKonfiguration.txt".to_string(),
            bars_folder: "Bars/".to_string(),
            profiles_folder: "Profiles/".to_string(),
            descriptor_name: "config.json".to_string(),
            export_suffix: "_konfiguriert".to_string(),
            xml_tags: vec![XML_TAG_IST.to_string(), XML_TAG_SOLL.to_string()],
            identity: IdentitySettings::default(),
            mount_limits: MountLimits::default(),
            logging: LogSettings::default(),
        }
    }
}

/// Current-value field of a test file
pub const XML_TAG_IST: &str = "IST";

/// Reference-value field of a test file
pub const XML_TAG_SOLL: &str = "SOLL";

/// Line prefixes recognised in the configuration member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub machine_type_prefix: String,
    pub real_machine_id_prefix: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            machine_type_prefix: ";MACHINE_TYPE_".to_string(),
            real_machine_id_prefix: "REAL_MACHINE_TYPE:".to_string(),
        }
    }
}

/// Mount-count bounds and the model sets they depend on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountLimits {
    pub default_min: u32,
    pub default_max: u32,
    pub small_shelf_max: u32,

    /// Lower bound whenever a shelf or the precision model is involved
    pub equipped_min: u32,

    /// Model with its own, narrower range
    pub precision_model: String,
    pub precision_model_max: u32,

    /// Models whose initial mount count is `equipped_min` instead of `default_min`
    pub baseline_models: Vec<String>,
}

impl Default for MountLimits {
    fn default() -> Self {
        Self {
            default_min: 0,
            default_max: 25,
            small_shelf_max: 9,
            equipped_min: 1,
            precision_model: "AS100".to_string(),
            precision_model_max: 10,
            baseline_models: vec![
                "AF500".to_string(),
                "AF510".to_string(),
                "AS100".to_string(),
            ],
        }
    }
}

impl MountLimits {
    /// Initial mount count for a freshly identified model
    pub fn initial_mount_count(&self, model_name: &str) -> u32 {
        if self.baseline_models.iter().any(|m| m == model_name) {
            self.equipped_min
        } else {
            self.default_min
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: String,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            prefix: "machseq".to_string(),
            debug: false,
            console: true,
        }
    }
}
