//! Machine identification from the archive's plain-text configuration member.
//!
//! The configuration contains a table of machine types and a line selecting
//! the active one:
//!
//! ```text
//! ;MACHINE_TYPE_AF500=3
//! ;MACHINE_TYPE_AS100=7
//! REAL_MACHINE_TYPE:3
//! ```
//!
//! Malformed lines are skipped silently; parsing never fails.

use crate::models::{IdentitySettings, MachineIdentity};
use std::collections::HashMap;

/// Resolves a [`MachineIdentity`] from configuration text
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    machine_type_prefix: String,
    real_machine_id_prefix: String,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(&IdentitySettings::default())
    }
}

impl IdentityResolver {
    pub fn new(settings: &IdentitySettings) -> Self {
        Self {
            machine_type_prefix: settings.machine_type_prefix.clone(),
            real_machine_id_prefix: settings.real_machine_id_prefix.clone(),
        }
    }

    /// Build the id → model-name table and find the selected id.
    ///
    /// When several selection lines are present the last one wins.
    pub fn scan(&self, content: &str) -> (HashMap<String, String>, Option<String>) {
        let mut definitions = HashMap::new();
        let mut real_id = None;

        for line in content.lines() {
            let line = line.trim();

            if line.starts_with(&self.machine_type_prefix) && line.contains('=') {
                let parts: Vec<&str> = line.split('=').collect();
                if let [name, id] = parts.as_slice() {
                    let name = name.trim();
                    let model = name.get(self.machine_type_prefix.len()..).unwrap_or_default();
                    definitions.insert(id.trim().to_string(), model.to_string());
                } else {
                    tracing::debug!("Skipping malformed machine type line: {}", line);
                }
            } else if line.starts_with(&self.real_machine_id_prefix) {
                if let Some(id) = line.split(':').nth(1) {
                    real_id = Some(id.trim().to_string());
                }
            }
        }

        let real_id = real_id.filter(|id| !id.is_empty());
        (definitions, real_id)
    }

    /// Resolve the machine identity, `None` if no machine id is selected.
    pub fn resolve(&self, content: &str) -> Option<MachineIdentity> {
        let (definitions, real_id) = self.scan(content);
        let real_id = real_id?;

        let identity = match definitions.get(&real_id) {
            Some(name) => MachineIdentity::named(name),
            None => {
                tracing::warn!("Machine id {} has no machine type entry", real_id);
                MachineIdentity::raw_id(&real_id)
            }
        };

        tracing::info!(
            "Resolved machine identity: {} ({})",
            identity.model_name,
            identity.display_string
        );
        Some(identity)
    }
}
