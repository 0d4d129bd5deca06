//! Services module - archive, identity and XML access for the configuration engine.
//!
//! The services are stateless and have no knowledge of the session; every call
//! names the archive it works on and opens/closes it internally.
//!
//! # Components
//!
//! - [`ArchiveStore`]: ZIP access. Lists and reads members, collects members
//!   under folder prefixes and writes modified copies atomically (replaced
//!   members or one added member, everything else copied byte for byte).
//!
//! - [`IdentityResolver`]: Parses the plain-text machine configuration into a
//!   [`MachineIdentity`](crate::models::MachineIdentity).
//!
//! - [`XmlFieldExtractor`]: Pulls the IST/SOLL fields out of the XML test
//!   files, first from root attributes, then from descendant elements.
//!
//! # Usage Example
//!
//! ```ignore
//! use machseq::services::{ArchiveStore, XmlFieldExtractor};
//!
//! let store = ArchiveStore::new();
//! let names = store.list_member_names_in_folder(archive, "Bars/");
//!
//! let extractor = XmlFieldExtractor::new(&["IST", "SOLL"]);
//! let fields = extractor.extract(archive, &["Bars/", "Profiles/"]);
//! ```

pub mod archive;
pub mod identity;
pub mod xml_fields;

pub use archive::{
    ArchiveError, ArchiveStore, DECODE_ERROR_MESSAGE, DEFAULT_DESCRIPTOR_NAME, MemberContent,
};
pub use identity::IdentityResolver;
pub use xml_fields::{FieldValues, NOT_FOUND, XmlFieldError, XmlFieldExtractor, XmlFieldMap};
