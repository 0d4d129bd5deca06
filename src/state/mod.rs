// Session state module
//
// This module provides the ConfigurationSession which owns all state of one
// wizard run (uploaded archive, machine identity, features, mount count, file
// sequence, XML field map) and emits change events for the host application.

pub mod rules;
pub mod sequence;

pub use rules::{FeatureRuleEngine, MountRange, MountValidation};
pub use sequence::{SequenceError, SequenceManager};

use crate::models::{EngineConfig, FeatureKey, FeatureState, FinalDescriptor, MachineIdentity};
use crate::services::{ArchiveStore, FieldValues, IdentityResolver, XmlFieldExtractor, XmlFieldMap};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;
use tokio::sync::broadcast;

/// Change events emitted when the session is modified
///
/// The host application subscribes to these to re-render without polling.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    /// A new archive became the active one
    ArchiveUploaded { file_name: String },

    /// The configuration member named a machine
    IdentityResolved {
        model_name: String,
        display_string: String,
    },

    /// The file sequence was rebuilt from the archive
    FilesReloaded { folder: String, count: usize },

    /// The XML field map was rebuilt
    XmlDataReloaded { members: usize },

    FeaturesChanged { features: FeatureState },

    MountCountChanged { value: u32, has_error: bool },

    /// Bars/profiles mode changed
    ModeChanged { test_bars: bool },

    FileMoved { from: usize, to: usize },

    Exported { destination: String, success: bool },
}

/// Errors surfaced to the caller of a session operation
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Upload source not found: {0}")]
    SourceNotFound(String),

    #[error("Upload source has no file name: {0}")]
    InvalidSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot switch to profiles while the shift-cut device is active")]
    ModeLocked,

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// What a feature toggle changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub features: FeatureState,

    /// Mount count re-committed against the range now in force
    pub mount: MountValidation,

    /// The toggle forced bars mode and the file list and XML data were reloaded
    pub reloaded: bool,
}

/// One configuration run over one uploaded archive
///
/// Operations are synchronous and take `&mut self`; the archive is opened and
/// closed inside each call. Typical order:
///
/// 1. [`handle_upload()`](Self::handle_upload)
/// 2. [`start()`](Self::start) (identity, file list, XML data)
/// 3. any number of [`toggle_feature()`](Self::toggle_feature),
///    [`validate_mount_count()`](Self::validate_mount_count),
///    [`set_bars_mode()`](Self::set_bars_mode),
///    [`reorder_file()`](Self::reorder_file)
/// 4. [`export_archive()`](Self::export_archive)
pub struct ConfigurationSession {
    config: EngineConfig,
    store: ArchiveStore,
    resolver: IdentityResolver,
    extractor: XmlFieldExtractor,

    upload_dir: Utf8PathBuf,
    archive_path: Option<Utf8PathBuf>,

    identity: MachineIdentity,
    rules: FeatureRuleEngine,
    test_bars: bool,
    active_folder: String,
    sequence: SequenceManager,
    xml_fields: XmlFieldMap,

    /// Broadcast channel for session change events
    events: broadcast::Sender<SessionChange>,
}

impl ConfigurationSession {
    /// Create a session and its upload directory
    pub fn new(config: EngineConfig) -> Result<Self, SessionError> {
        let upload_dir = Utf8PathBuf::from(&config.upload_dir);
        fs::create_dir_all(&upload_dir)?;

        let (events, _) = broadcast::channel(100);

        Ok(Self {
            store: ArchiveStore::new(),
            resolver: IdentityResolver::new(&config.identity),
            extractor: XmlFieldExtractor::new(&config.xml_tags),
            rules: FeatureRuleEngine::new(config.mount_limits.clone()),
            active_folder: config.bars_folder.clone(),
            upload_dir,
            archive_path: None,
            identity: MachineIdentity::unknown(),
            test_bars: true,
            sequence: SequenceManager::new(),
            xml_fields: XmlFieldMap::new(),
            events,
            config,
        })
    }

    /// Subscribe to session change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }

    fn emit(&self, change: SessionChange) {
        // No listener is fine
        let _ = self.events.send(change);
    }

    fn reset_derived_state(&mut self) {
        self.identity = MachineIdentity::unknown();
        self.rules.reset();
        self.test_bars = true;
        self.active_folder = self.config.bars_folder.clone();
        self.sequence.clear();
        self.xml_fields.clear();
    }

    /// Copy `source` into the upload directory and make it the active archive.
    ///
    /// A previous upload with the same name is overwritten. The archive itself is
    /// not validated here; unreadable archives surface as empty results later.
    pub fn handle_upload(&mut self, source: &Utf8Path) -> Result<String, SessionError> {
        if !source.is_file() {
            return Err(SessionError::SourceNotFound(source.to_string()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| SessionError::InvalidSource(source.to_string()))?
            .to_string();

        let destination = self.upload_dir.join(&file_name);
        let same_file = destination.exists()
            && fs::canonicalize(source)? == fs::canonicalize(&destination)?;
        if !same_file {
            fs::copy(source, &destination)?;
        }

        tracing::info!("Uploaded {} to {}", source, destination);
        self.archive_path = Some(destination);
        self.reset_derived_state();
        self.emit(SessionChange::ArchiveUploaded {
            file_name: file_name.clone(),
        });

        Ok(file_name)
    }

    /// Resolve the machine identity and initial mount count.
    ///
    /// Does nothing once a machine has been identified.
    pub fn parse_config(&mut self) {
        if !self.identity.is_unknown() {
            return;
        }
        let Some(archive) = &self.archive_path else {
            return;
        };

        let content = match self.store.read_entry(archive, &self.config.config_member) {
            Some(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
            _ => {
                tracing::warn!("No machine configuration found in {}", archive);
                return;
            }
        };

        if let Some(identity) = self.resolver.resolve(&content) {
            self.identity = identity;
            self.emit(SessionChange::IdentityResolved {
                model_name: self.identity.model_name.clone(),
                display_string: self.identity.display_string.clone(),
            });
        }

        self.rules.initialize_mount_count(&self.identity.model_name);
        self.emit(SessionChange::MountCountChanged {
            value: self.rules.mount_count(),
            has_error: false,
        });
    }

    /// Rebuild the file sequence from the folder of the current mode
    pub fn load_files_for_mode(&mut self) {
        self.active_folder = if self.test_bars {
            self.config.bars_folder.clone()
        } else {
            self.config.profiles_folder.clone()
        };

        let names = match &self.archive_path {
            Some(archive) => self.store.list_member_names_in_folder(archive, &self.active_folder),
            None => Vec::new(),
        };
        tracing::debug!("Loaded {} file(s) from {}", names.len(), self.active_folder);

        self.sequence.reload(names);
        self.emit(SessionChange::FilesReloaded {
            folder: self.active_folder.clone(),
            count: self.sequence.len(),
        });
    }

    /// Rebuild the XML field map for both folders
    pub fn load_xml_data_for_files(&mut self) {
        let Some(archive) = &self.archive_path else {
            return;
        };

        let folders = [&self.config.bars_folder, &self.config.profiles_folder];
        self.xml_fields = self.extractor.extract(archive, &folders);
        self.emit(SessionChange::XmlDataReloaded {
            members: self.xml_fields.len(),
        });
    }

    /// Identity, file list and XML data for a freshly uploaded archive
    pub fn start(&mut self) {
        self.parse_config();
        self.load_files_for_mode();
        self.load_xml_data_for_files();
    }

    /// Switch between bars (`true`) and profiles (`false`) and reload.
    pub fn set_bars_mode(&mut self, test_bars: bool) -> Result<(), SessionError> {
        if !test_bars && !self.rules.is_mode_switch_allowed() {
            return Err(SessionError::ModeLocked);
        }

        self.test_bars = test_bars;
        self.emit(SessionChange::ModeChanged { test_bars });
        self.load_files_for_mode();
        self.load_xml_data_for_files();
        Ok(())
    }

    /// Toggle a feature, apply the consistency rules and re-commit the mount count.
    pub fn toggle_feature(&mut self, key: FeatureKey) -> ToggleOutcome {
        let transition = self.rules.toggle(key);
        self.emit(SessionChange::FeaturesChanged {
            features: transition.state,
        });

        let reloaded = transition.forces_bars_mode;
        if reloaded {
            tracing::info!("{} enabled, forcing bars mode", key);
            if !self.test_bars {
                self.test_bars = true;
                self.emit(SessionChange::ModeChanged { test_bars: true });
            }
            self.load_files_for_mode();
            self.load_xml_data_for_files();
        }

        let mount = self.rules.commit_mount_count(&self.identity.model_name);
        self.emit(SessionChange::MountCountChanged {
            value: self.rules.mount_count(),
            has_error: mount.has_error,
        });

        ToggleOutcome {
            features: transition.state,
            mount,
            reloaded,
        }
    }

    /// Validate mount-count input and store the clamped value
    pub fn validate_mount_count(&mut self, raw_input: &str) -> MountValidation {
        let result = self
            .rules
            .validate_mount_count(raw_input, &self.identity.model_name);
        self.emit(SessionChange::MountCountChanged {
            value: self.rules.mount_count(),
            has_error: result.has_error,
        });
        result
    }

    pub fn is_mode_switch_allowed(&self) -> bool {
        self.rules.is_mode_switch_allowed()
    }

    /// Move a file within the sequence; indices must be within the current list
    pub fn reorder_file(&mut self, from: usize, to: usize) -> Result<(), SessionError> {
        self.sequence.reorder(from, to)?;
        if from != to {
            self.emit(SessionChange::FileMoved { from, to });
        }
        Ok(())
    }

    /// Compile the descriptor written into the exported archive
    pub fn prepare_final_data(&self) -> FinalDescriptor {
        FinalDescriptor {
            machine_model: self.identity.model_name.clone(),
            test_bars: self.test_bars,
            file_order: self.sequence.names().to_vec(),
            mount_count: self.rules.current_mount_count(&self.identity.model_name),
            features: FinalDescriptor::feature_entries(&self.rules.features()),
        }
    }

    /// Write a copy of the uploaded archive with the descriptor added to `destination`.
    ///
    /// Returns `false` on any failure; no partial destination file is left behind.
    pub fn export_archive(&self, destination: &Utf8Path) -> bool {
        let Some(archive) = &self.archive_path else {
            tracing::warn!("Export requested without an uploaded archive");
            return false;
        };

        let success = match self.prepare_final_data().to_json_bytes() {
            Ok(content) => self.store.rewrite_with_added_member(
                archive,
                destination,
                Some(&self.config.descriptor_name),
                &content,
            ),
            Err(e) => {
                tracing::error!("Failed to serialize descriptor: {}", e);
                false
            }
        };

        self.emit(SessionChange::Exported {
            destination: destination.to_string(),
            success,
        });
        success
    }

    /// Suggested export file name, e.g. `machine_konfiguriert.zip`
    pub fn default_export_name(&self) -> Option<String> {
        let archive = self.archive_path.as_ref()?;
        let stem = archive.file_stem()?;
        let name = match archive.extension() {
            Some(extension) => format!("{}{}.{}", stem, self.config.export_suffix, extension),
            None => format!("{}{}", stem, self.config.export_suffix),
        };
        Some(name)
    }

    /// XML fields of a file in the active folder
    pub fn xml_fields_for(&self, base_name: &str) -> Option<&FieldValues> {
        self.xml_fields
            .get(&format!("{}{}", self.active_folder, base_name))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn archive_path(&self) -> Option<&Utf8Path> {
        self.archive_path.as_deref()
    }

    pub fn identity(&self) -> &MachineIdentity {
        &self.identity
    }

    pub fn features(&self) -> FeatureState {
        self.rules.features()
    }

    pub fn mount_count(&self) -> u32 {
        self.rules.mount_count()
    }

    pub fn mount_range(&self) -> MountRange {
        self.rules.mount_range(&self.identity.model_name)
    }

    pub fn is_bars_mode(&self) -> bool {
        self.test_bars
    }

    pub fn active_folder(&self) -> &str {
        &self.active_folder
    }

    pub fn file_order(&self) -> &[String] {
        self.sequence.names()
    }

    pub fn sequence(&self) -> &SequenceManager {
        &self.sequence
    }

    pub fn xml_fields(&self) -> &XmlFieldMap {
        &self.xml_fields
    }
}
