use crate::models::features::{FeatureKey, FeatureState};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// Key shared by both shelf sizes in the descriptor's feature list
pub const SHELF_FEATURE_NAME: &str = "createShelf";

/// Value of a single feature entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Enabled(bool),
    ShelfSize(&'static str),
}

/// One `{ name: value }` object in the descriptor's `Features` array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEntry {
    pub name: &'static str,
    pub value: FeatureValue,
}

impl FeatureEntry {
    /// Translate an active feature into its descriptor entry.
    ///
    /// Shelves collapse into a single `createShelf` key carrying the size.
    pub fn from_key(key: FeatureKey) -> Self {
        match key {
            FeatureKey::SmallShelf => Self {
                name: SHELF_FEATURE_NAME,
                value: FeatureValue::ShelfSize("smallShelf"),
            },
            FeatureKey::BigShelf => Self {
                name: SHELF_FEATURE_NAME,
                value: FeatureValue::ShelfSize("bigShelf"),
            },
            other => Self {
                name: other.as_str(),
                value: FeatureValue::Enabled(true),
            },
        }
    }
}

impl Serialize for FeatureEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.name, &self.value)?;
        map.end()
    }
}

/// Compiled result of a configuration run, written as `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalDescriptor {
    #[serde(rename = "MachineModel")]
    pub machine_model: String,

    #[serde(rename = "TestBars")]
    pub test_bars: bool,

    #[serde(rename = "FileOrder")]
    pub file_order: Vec<String>,

    #[serde(rename = "MountCount")]
    pub mount_count: u32,

    #[serde(rename = "Features")]
    pub features: Vec<FeatureEntry>,
}

impl FinalDescriptor {
    pub fn feature_entries(state: &FeatureState) -> Vec<FeatureEntry> {
        state.active().into_iter().map(FeatureEntry::from_key).collect()
    }

    /// Serialize with four-space indentation
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn sample() -> FinalDescriptor {
        let state = FeatureState {
            small_shelf: true,
            robot_mode: true,
            ..Default::default()
        };
        FinalDescriptor {
            machine_model: "AF500".to_string(),
            test_bars: true,
            file_order: vec!["b.xml".to_string(), "a.xml".to_string()],
            mount_count: 3,
            features: FinalDescriptor::feature_entries(&state),
        }
    }

    #[test]
    fn test_descriptor_json_shape() {
        let bytes = sample().to_json_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(
            value,
            json!({
                "MachineModel": "AF500",
                "TestBars": true,
                "FileOrder": ["b.xml", "a.xml"],
                "MountCount": 3,
                "Features": [{"createShelf": "smallShelf"}, {"RobotMode": true}]
            })
        );
    }

    #[test]
    fn test_descriptor_uses_four_space_indent() {
        let text = String::from_utf8(sample().to_json_bytes().unwrap()).unwrap();
        assert!(text.starts_with("{\n    \"MachineModel\": \"AF500\""));
    }

    #[test]
    fn test_big_shelf_entry() {
        let entry = FeatureEntry::from_key(FeatureKey::BigShelf);
        assert_eq!(serde_json::to_value(&entry).unwrap(), json!({"createShelf": "bigShelf"}));
    }
}
