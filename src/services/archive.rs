//! Read and rewrite access to ZIP archives.
//!
//! [`ArchiveStore`] is stateless: every call opens the archive, does its work and
//! closes it again. Read operations never fail towards the caller. A missing or
//! unreadable archive yields an empty result, and a member that cannot be decoded
//! is reported as [`MemberContent::Undecodable`] instead of aborting the call.
//!
//! Rewrites copy the source archive entry by entry into a temporary file next to
//! the destination. Untouched entries are raw-copied (no recompression), and the
//! temporary file is only persisted to the destination once the archive has been
//! finished successfully.

use camino::Utf8Path;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Member name used for the descriptor when the caller does not supply one
pub const DEFAULT_DESCRIPTOR_NAME: &str = "config.json";

/// Upper bound for the initial read buffer of a member
const READ_CAPACITY_HINT: u64 = 64 * 1024;

/// Rendered content of a member that is not valid UTF-8
pub const DECODE_ERROR_MESSAGE: &str = "Error: Could not decode file content.";

/// Errors raised while accessing an archive.
///
/// These stay inside the store: the public operations log them and degrade to
/// empty results or `false`.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive not found: {0}")]
    NotFound(String),

    #[error("Member {0} not found in archive")]
    MemberNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to persist archive: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Decoded content of a single text member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberContent {
    Text(String),
    Undecodable,
}

impl MemberContent {
    fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => MemberContent::Text(text),
            Err(_) => MemberContent::Undecodable,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MemberContent::Text(text) => Some(text),
            MemberContent::Undecodable => None,
        }
    }

    /// Text to show for this member; undecodable members render as an error marker
    pub fn display(&self) -> &str {
        self.as_text().unwrap_or(DECODE_ERROR_MESSAGE)
    }
}

/// Stateless access to ZIP archives on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveStore;

impl ArchiveStore {
    pub fn new() -> Self {
        Self
    }

    fn open(archive: &Utf8Path) -> Result<ZipArchive<File>, ArchiveError> {
        if !archive.exists() {
            return Err(ArchiveError::NotFound(archive.to_string()));
        }
        let file = File::open(archive)?;
        Ok(ZipArchive::new(file)?)
    }

    fn stored_names(zip: &mut ZipArchive<File>) -> Result<Vec<String>, ArchiveError> {
        let mut names = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            names.push(entry.name().to_string());
        }
        Ok(names)
    }

    fn open_with_names(archive: &Utf8Path) -> Result<(ZipArchive<File>, Vec<String>), ArchiveError> {
        let mut zip = Self::open(archive)?;
        let names = Self::stored_names(&mut zip)?;
        Ok((zip, names))
    }

    fn read_member(zip: &mut ZipArchive<File>, member: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut entry = zip.by_name(member).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => ArchiveError::MemberNotFound(member.to_string()),
            other => ArchiveError::Zip(other),
        })?;
        // The declared size is untrusted, only use it as a bounded hint
        let mut buffer = Vec::with_capacity(entry.size().min(READ_CAPACITY_HINT) as usize);
        entry.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn is_under_folders<P: AsRef<str>>(name: &str, prefixes: &[P]) -> bool {
        let in_folder = prefixes.iter().any(|p| name.starts_with(p.as_ref()));
        in_folder && !name.ends_with('/')
    }

    /// Entry names in the archive's stored order.
    pub fn try_list_entries(&self, archive: &Utf8Path) -> Result<Vec<String>, ArchiveError> {
        let mut zip = Self::open(archive)?;
        Self::stored_names(&mut zip)
    }

    /// Entry names in the archive's stored order, empty if the archive cannot be read.
    pub fn list_entries(&self, archive: &Utf8Path) -> Vec<String> {
        self.try_list_entries(archive).unwrap_or_else(|e| {
            tracing::warn!("Failed to list entries of {}: {}", archive, e);
            Vec::new()
        })
    }

    pub fn try_read_entry(&self, archive: &Utf8Path, member: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = Self::open(archive)?;
        Self::read_member(&mut zip, member)
    }

    /// Raw bytes of a single member, `None` if it does not exist or cannot be read.
    pub fn read_entry(&self, archive: &Utf8Path, member: &str) -> Option<Vec<u8>> {
        match self.try_read_entry(archive, member) {
            Ok(bytes) => Some(bytes),
            Err(ArchiveError::MemberNotFound(name)) => {
                tracing::info!("File {} not found in {}", name, archive);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to read {} from {}: {}", member, archive, e);
                None
            }
        }
    }

    /// Single member decoded as UTF-8 text.
    pub fn read_entry_text(&self, archive: &Utf8Path, member: &str) -> Option<MemberContent> {
        self.read_entry(archive, member).map(MemberContent::from_bytes)
    }

    /// All non-folder members below any of `prefixes`, sorted by name.
    ///
    /// A member that cannot be read or decoded is kept as
    /// [`MemberContent::Undecodable`] so callers see the corruption.
    pub fn read_members_under_folders<P: AsRef<str>>(
        &self,
        archive: &Utf8Path,
        prefixes: &[P],
    ) -> IndexMap<String, MemberContent> {
        let mut contents = IndexMap::new();

        let (mut zip, mut names) = match Self::open_with_names(archive) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!("Error reading zip {}: {}", archive, e);
                return contents;
            }
        };
        names.sort();

        for name in names {
            if !Self::is_under_folders(&name, prefixes) {
                continue;
            }
            let content = match Self::read_member(&mut zip, &name) {
                Ok(bytes) => MemberContent::from_bytes(bytes),
                Err(e) => {
                    tracing::warn!("Could not read member {}: {}", name, e);
                    MemberContent::Undecodable
                }
            };
            contents.insert(name, content);
        }

        contents
    }

    /// Raw bytes of all non-folder members below any of `prefixes`, in stored order.
    ///
    /// Members that fail to read are logged and left out.
    pub fn read_member_bytes_under_folders<P: AsRef<str>>(
        &self,
        archive: &Utf8Path,
        prefixes: &[P],
    ) -> IndexMap<String, Vec<u8>> {
        let mut contents = IndexMap::new();

        let (mut zip, names) = match Self::open_with_names(archive) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!("Error reading zip {}: {}", archive, e);
                return contents;
            }
        };

        for name in names {
            if !Self::is_under_folders(&name, prefixes) {
                continue;
            }
            match Self::read_member(&mut zip, &name) {
                Ok(bytes) => {
                    contents.insert(name, bytes);
                }
                Err(e) => tracing::warn!("Skipping unreadable member {}: {}", name, e),
            }
        }

        contents
    }

    /// Base names of the files inside `folder`, ordered by their full path.
    ///
    /// The folder entry itself and entries with an empty base name (sub-folder
    /// markers) are excluded.
    pub fn list_member_names_in_folder(&self, archive: &Utf8Path, folder: &str) -> Vec<String> {
        let mut names = self.list_entries(archive);
        names.sort();

        names
            .iter()
            .filter(|name| name.starts_with(folder) && name.as_str() != folder)
            .filter_map(|name| name.rsplit('/').next())
            .filter(|base| !base.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn rewrite(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        replacements: &HashMap<String, Vec<u8>>,
        appended: Option<(&str, &[u8])>,
    ) -> Result<(), ArchiveError> {
        let mut source_zip = Self::open(source)?;

        let staging_dir = match dest.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let staging = tempfile::NamedTempFile::new_in(staging_dir)?;
        let mut writer = ZipWriter::new(staging);
        let mut pending = appended;

        for index in 0..source_zip.len() {
            let entry = source_zip.by_index_raw(index)?;
            let name = entry.name().to_string();

            let replacement = match replacements.get(&name) {
                Some(content) => Some(content.as_slice()),
                None => appended
                    .filter(|(appended_name, _)| *appended_name == name)
                    .map(|(_, content)| content),
            };

            match replacement {
                Some(content) => {
                    let options = SimpleFileOptions::default()
                        .compression_method(writable_method(entry.compression()));
                    drop(entry);

                    writer.start_file(name.as_str(), options)?;
                    writer.write_all(content)?;
                    if pending.is_some_and(|(appended_name, _)| appended_name == name) {
                        pending = None;
                    }
                    tracing::debug!("Replaced member {}", name);
                }
                None => writer.raw_copy_file(entry)?,
            }
        }

        if let Some((name, content)) = pending {
            writer.start_file(name, SimpleFileOptions::default())?;
            writer.write_all(content)?;
            tracing::debug!("Added member {}", name);
        }

        // Staging files are owner-only; the output takes the source's permissions
        let staging = writer.finish()?;
        let permissions = std::fs::metadata(source)?.permissions();
        staging.as_file().set_permissions(permissions)?;
        staging.persist(dest)?;
        Ok(())
    }

    /// Copy `source` to `dest`, substituting the content of every member named in
    /// `replacements`. Names that do not exist in the source are ignored.
    pub fn rewrite_with_replacements(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> bool {
        match self.rewrite(source, dest, replacements, None) {
            Ok(()) => {
                tracing::info!(
                    "Saved {} with {} replaced member(s) to {}",
                    source,
                    replacements.len(),
                    dest
                );
                true
            }
            Err(e) => {
                tracing::error!("Error saving zip {}: {}", dest, e);
                false
            }
        }
    }

    /// Copy `source` to `dest` and add one member.
    ///
    /// The member is named `name`, or [`DEFAULT_DESCRIPTOR_NAME`] when `None`.
    /// If the source already holds a member of that name it is replaced in place.
    pub fn rewrite_with_added_member(
        &self,
        source: &Utf8Path,
        dest: &Utf8Path,
        name: Option<&str>,
        content: &[u8],
    ) -> bool {
        if !source.exists() {
            tracing::warn!("Source archive {} does not exist", source);
            return false;
        }

        let member_name = name.unwrap_or(DEFAULT_DESCRIPTOR_NAME);
        match self.rewrite(source, dest, &HashMap::new(), Some((member_name, content))) {
            Ok(()) => {
                tracing::info!("Created {} with added member {}", dest, member_name);
                true
            }
            Err(e) => {
                tracing::error!("Error creating final zip {}: {}", dest, e);
                false
            }
        }
    }
}

/// Compression used when a member's content is rewritten
fn writable_method(method: CompressionMethod) -> CompressionMethod {
    match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}
