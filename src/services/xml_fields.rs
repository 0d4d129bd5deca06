//! Extraction of IST/SOLL values from the XML test files inside an archive.
//!
//! Each requested field is looked up with an ordered list of strategies:
//! 1. an attribute of the document root
//! 2. the text of the first descendant element with that tag
//!
//! If neither matches, the field is recorded as [`NOT_FOUND`]. A member that is
//! not well-formed XML is logged and left out of the result.
//!
//! Documents are transcoded to UTF-8 before parsing. The encoding comes from a
//! byte order mark, else from the `encoding` of the XML declaration, else UTF-8.

use crate::services::archive::ArchiveStore;
use camino::Utf8Path;
use encoding_rs::{Encoding, UTF_8};
use indexmap::IndexMap;
use std::borrow::Cow;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Value recorded for a field that is neither a root attribute nor an element
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Field values of one member, keyed by tag in request order
pub type FieldValues = IndexMap<String, String>;

/// Field values of all members, keyed by full member path
pub type XmlFieldMap = IndexMap<String, FieldValues>;

#[derive(Error, Debug)]
pub enum XmlFieldError {
    #[error("XML parse error at byte {position}: {source}")]
    Parse {
        position: usize,
        source: quick_xml::Error,
    },

    #[error("Content is not valid {0}")]
    Encoding(&'static str),

    #[error("Invalid attribute: {0}")]
    Attribute(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Unclosed element at end of document")]
    Unclosed,

    #[error("Content after the root element")]
    TrailingElement,
}

/// The parts of a document the lookup strategies need
#[derive(Debug, Default)]
struct DocumentSummary {
    root_attributes: IndexMap<String, String>,

    /// Text of the first descendant for each requested tag that occurs
    first_descendants: IndexMap<String, String>,
}

/// One way of finding a field value in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupStrategy {
    RootAttribute,
    DescendantElement,
}

impl LookupStrategy {
    const ORDER: [LookupStrategy; 2] = [LookupStrategy::RootAttribute, LookupStrategy::DescendantElement];

    fn lookup<'a>(&self, document: &'a DocumentSummary, tag: &str) -> Option<&'a str> {
        match self {
            LookupStrategy::RootAttribute => document.root_attributes.get(tag),
            LookupStrategy::DescendantElement => document.first_descendants.get(tag),
        }
        .map(String::as_str)
    }
}

/// Text being collected for a matched descendant element
struct Capture {
    tag: String,
    depth: usize,
    text: String,
}

/// Extracts a fixed set of fields from XML members
#[derive(Debug, Clone)]
pub struct XmlFieldExtractor {
    tags: Vec<String>,
    store: ArchiveStore,
}

impl XmlFieldExtractor {
    pub fn new<T: AsRef<str>>(tags: &[T]) -> Self {
        Self {
            tags: tags.iter().map(|t| t.as_ref().to_string()).collect(),
            store: ArchiveStore::new(),
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Extract the fields of every `.xml` member below any of `prefixes`.
    pub fn extract<P: AsRef<str>>(&self, archive: &Utf8Path, prefixes: &[P]) -> XmlFieldMap {
        let mut results = XmlFieldMap::new();

        for (name, bytes) in self.store.read_member_bytes_under_folders(archive, prefixes) {
            if !name.to_lowercase().ends_with(".xml") {
                continue;
            }
            match self.extract_from_bytes(&bytes) {
                Ok(values) => {
                    results.insert(name, values);
                }
                Err(e) => tracing::warn!("Error: {} is not valid XML: {}", name, e),
            }
        }

        tracing::debug!("Extracted XML fields from {} member(s) of {}", results.len(), archive);
        results
    }

    /// Extract the fields from a single XML document.
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> Result<FieldValues, XmlFieldError> {
        let text = Self::decode_document(bytes)?;
        let document = self.summarize(text.as_bytes())?;

        let values = self
            .tags
            .iter()
            .map(|tag| {
                let value = LookupStrategy::ORDER
                    .iter()
                    .find_map(|strategy| strategy.lookup(&document, tag))
                    .unwrap_or(NOT_FOUND);
                (tag.clone(), value.to_string())
            })
            .collect();

        Ok(values)
    }

    fn decode_document(bytes: &[u8]) -> Result<Cow<'_, str>, XmlFieldError> {
        let (encoding, body) = match Encoding::for_bom(bytes) {
            Some((encoding, bom_length)) => (encoding, &bytes[bom_length..]),
            None => (Self::declared_encoding(bytes).unwrap_or(UTF_8), bytes),
        };

        let (text, malformed) = encoding.decode_without_bom_handling(body);
        if malformed {
            return Err(XmlFieldError::Encoding(encoding.name()));
        }
        Ok(text)
    }

    /// Encoding named by the XML declaration, if the document starts with one.
    ///
    /// A declaration readable without a BOM is ASCII-compatible, so UTF-16
    /// labels map to UTF-8 here.
    fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();

        match reader.read_event_into(&mut buf).ok()? {
            Event::Decl(declaration) => {
                let label = declaration.encoding()?.ok()?;
                Encoding::for_label(&label).map(Encoding::output_encoding)
            }
            _ => None,
        }
    }

    fn summarize(&self, bytes: &[u8]) -> Result<DocumentSummary, XmlFieldError> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut summary = DocumentSummary::default();

        let mut depth = 0usize;
        let mut seen_root = false;
        let mut capture: Option<Capture> = None;

        loop {
            buf.clear();
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| XmlFieldError::Parse {
                    position: reader.buffer_position(),
                    source,
                })?;

            match event {
                Event::Start(ref element) | Event::Empty(ref element) => {
                    let is_empty = matches!(event, Event::Empty(_));

                    if depth == 0 {
                        if seen_root {
                            return Err(XmlFieldError::TrailingElement);
                        }
                        seen_root = true;
                        summary.root_attributes = Self::attributes(element)?;
                    } else {
                        // element text stops at the first child
                        if let Some(done) = capture.take() {
                            summary.first_descendants.insert(done.tag, done.text);
                        }

                        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                        if self.tags.contains(&name) && !summary.first_descendants.contains_key(&name) {
                            if is_empty {
                                summary.first_descendants.insert(name, String::new());
                            } else {
                                capture = Some(Capture {
                                    tag: name,
                                    depth: depth + 1,
                                    text: String::new(),
                                });
                            }
                        }
                    }

                    if !is_empty {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    if capture.as_ref().is_some_and(|c| c.depth == depth) {
                        if let Some(done) = capture.take() {
                            summary.first_descendants.insert(done.tag, done.text);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Text(text) => {
                    if let Some(active) = capture.as_mut() {
                        let unescaped = text.unescape().map_err(|source| XmlFieldError::Parse {
                            position: reader.buffer_position(),
                            source,
                        })?;
                        active.text.push_str(&unescaped);
                    }
                }
                Event::CData(data) => {
                    if let Some(active) = capture.as_mut() {
                        active.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(XmlFieldError::NoRoot);
        }
        if depth != 0 {
            return Err(XmlFieldError::Unclosed);
        }

        Ok(summary)
    }

    fn attributes(element: &BytesStart) -> Result<IndexMap<String, String>, XmlFieldError> {
        let mut attributes = IndexMap::new();
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| XmlFieldError::Attribute(e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| XmlFieldError::Attribute(e.to_string()))?;
            attributes.insert(key, value.into_owned());
        }
        Ok(attributes)
    }
}
