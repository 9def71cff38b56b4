//! Bundle metadata documents
//!
//! Every bundle ships a gzipped MPEG-21 DIDL document. It lists the bundle's
//! resources (`didl:Resource` elements carrying `dcx:filename`, a checksum and
//! a `ref` URL) and the publication date of the issue (`srw_dc:dcx/dc:date`).
//! Elements are matched by namespace URI, so the prefixes a document happens to
//! use do not matter.

use crate::error::MetadataError;
use crate::types::{Checksum, ChecksumAlgorithm};
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use regex::Regex;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// MPEG-21 DIDL namespace
pub const DIDL_NS: &str = "urn:mpeg:mpeg21:2002:02-DIDL-NS";
/// KB "dcx" extension namespace (resource filenames and checksums)
pub const DCX_NS: &str = "http://krait.kb.nl/coop/tel/handbook/telah.html";
/// SRW Dublin Core record namespace
pub const SRW_DC_NS: &str = "info:srw/schema/1/dc-v1.1";
/// Dublin Core elements namespace
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Descriptor statement marking a resource as OCR text
const OCR_STATEMENT: &str = "ocr";

// The pattern is a literal; compiling it cannot fail.
#[allow(clippy::expect_used)]
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2}-\d{2})").expect("valid date pattern"));

/// One `didl:Resource` of a metadata document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceEntry {
    /// `dcx:filename`
    pub filename: Option<String>,
    /// `dcx:md5_checksum`
    pub md5_checksum: Option<String>,
    /// `dcx:sha512_checksum`
    pub sha512_checksum: Option<String>,
    /// Unqualified `ref` attribute, the source URL
    pub url: Option<String>,
    /// Whether a sibling descriptor marks this resource as OCR text
    pub ocr: bool,
}

impl ResourceEntry {
    /// The declared checksum, preferring MD5 over SHA-512
    pub fn checksum(&self) -> Option<Checksum> {
        if let Some(hex) = &self.md5_checksum {
            return Some(Checksum::new(ChecksumAlgorithm::Md5, hex));
        }
        self.sha512_checksum
            .as_deref()
            .map(|hex| Checksum::new(ChecksumAlgorithm::Sha512, hex))
    }
}

/// Publication date of an issue
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicationDate {
    /// Four-digit year, e.g. `1921`
    pub year: String,
    /// Full date, e.g. `1921-03-04`
    pub date: String,
}

impl PublicationDate {
    /// Parse the leading `YYYY-MM-DD` of a date string
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let text = text.trim();
        let caps = DATE_RE
            .captures(text)
            .ok_or_else(|| MetadataError::MalformedDate(text.to_string()))?;
        Ok(Self {
            year: caps[1].to_string(),
            date: format!("{}-{}", &caps[1], &caps[2]),
        })
    }
}

/// The parts of a metadata document the pipeline cares about
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleMetadata {
    resources: Vec<ResourceEntry>,
    date: Option<String>,
}

impl BundleMetadata {
    /// Read and parse a gzipped metadata document
    pub fn from_gzip_file(path: &Path) -> Result<Self, MetadataError> {
        let file = std::fs::File::open(path).map_err(|source| MetadataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = std::io::BufReader::new(GzDecoder::new(file));
        Self::from_reader(reader)
    }

    /// Parse a gzipped metadata document on the blocking pool
    pub async fn load(path: &Path) -> Result<Self, MetadataError> {
        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::from_gzip_file(&owned))
            .await
            .map_err(|e| MetadataError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::other(format!("metadata task failed: {}", e)),
            })?
    }

    /// Parse an uncompressed metadata document
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, MetadataError> {
        let mut reader = NsReader::from_reader(reader);
        let mut buf = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut meta = BundleMetadata::default();

        loop {
            let (ns, event) = reader.read_resolved_event_into(&mut buf)?;
            let ns = Ns::from_resolved(&ns);
            match event {
                Event::Start(e) => {
                    let tag = Tag::classify(ns, e.local_name().as_ref());
                    if tag == Tag::Resource {
                        let entry = read_resource(&reader, &e)?;
                        meta.push_resource(entry, stack.last_mut());
                    }
                    stack.push(Frame::new(tag));
                }
                Event::Empty(e) => {
                    if Tag::classify(ns, e.local_name().as_ref()) == Tag::Resource {
                        let entry = read_resource(&reader, &e)?;
                        meta.push_resource(entry, stack.last_mut());
                    }
                }
                Event::Text(t) => {
                    if let Some(frame) = stack.last_mut().filter(|f| f.collects_text()) {
                        frame.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(frame) = stack.last_mut().filter(|f| f.collects_text()) {
                        frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::End(_) => {
                    if let Some(frame) = stack.pop() {
                        meta.close(frame, &mut stack);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(meta)
    }

    /// Every resource in document order
    pub fn resources(&self) -> &[ResourceEntry] {
        &self.resources
    }

    /// Resources marked as OCR text
    pub fn ocr_resources(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.resources.iter().filter(|r| r.ocr)
    }

    /// Look up a resource by filename, OCR-tagged or not
    pub fn find_resource(&self, filename: &str) -> Option<&ResourceEntry> {
        self.resources
            .iter()
            .find(|r| r.filename.as_deref() == Some(filename))
    }

    /// The issue's publication date
    pub fn publication_date(&self) -> Result<PublicationDate, MetadataError> {
        let text = self.date.as_deref().ok_or(MetadataError::MissingDate)?;
        PublicationDate::parse(text)
    }

    fn push_resource(&mut self, entry: ResourceEntry, parent: Option<&mut Frame>) {
        self.resources.push(entry);
        if let Some(parent) = parent {
            parent.resources.push(self.resources.len() - 1);
        }
    }

    fn close(&mut self, frame: Frame, stack: &mut [Frame]) {
        let depth = stack.len();
        match frame.tag {
            // didl:Statement inside didl:Descriptor marks the descriptor's parent
            Tag::Statement if frame.text.trim() == OCR_STATEMENT => {
                if depth >= 2 && stack[depth - 1].tag == Tag::Descriptor {
                    stack[depth - 2].ocr = true;
                }
            }
            Tag::Date if self.date.is_none() => {
                let text = frame.text.trim();
                if !text.is_empty() && stack.last().is_some_and(|p| p.tag == Tag::SrwDcx) {
                    self.date = Some(text.to_string());
                }
            }
            _ => {}
        }
        if frame.ocr {
            for &i in &frame.resources {
                self.resources[i].ocr = true;
            }
        }
    }
}

fn read_resource<R>(reader: &NsReader<R>, e: &BytesStart<'_>) -> Result<ResourceEntry, MetadataError> {
    let mut entry = ResourceEntry::default();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let (ns, local) = reader.resolve_attribute(attr.key);
        let slot = match (Ns::from_resolved(&ns), local.as_ref()) {
            (Ns::Dcx, b"filename") => &mut entry.filename,
            (Ns::Dcx, b"md5_checksum") => &mut entry.md5_checksum,
            (Ns::Dcx, b"sha512_checksum") => &mut entry.sha512_checksum,
            (Ns::None, b"ref") => &mut entry.url,
            _ => continue,
        };
        *slot = Some(attr.unescape_value()?.into_owned());
    }
    Ok(entry)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ns {
    Didl,
    Dcx,
    SrwDc,
    Dc,
    None,
    Other,
}

impl Ns {
    fn from_resolved(resolved: &ResolveResult<'_>) -> Self {
        match resolved {
            ResolveResult::Bound(Namespace(uri)) => match *uri {
                u if u == DIDL_NS.as_bytes() => Ns::Didl,
                u if u == DCX_NS.as_bytes() => Ns::Dcx,
                u if u == SRW_DC_NS.as_bytes() => Ns::SrwDc,
                u if u == DC_NS.as_bytes() => Ns::Dc,
                _ => Ns::Other,
            },
            ResolveResult::Unbound => Ns::None,
            ResolveResult::Unknown(_) => Ns::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tag {
    Resource,
    Descriptor,
    Statement,
    SrwDcx,
    Date,
    Other,
}

impl Tag {
    fn classify(ns: Ns, local: &[u8]) -> Self {
        match (ns, local) {
            (Ns::Didl, b"Resource") => Tag::Resource,
            (Ns::Didl, b"Descriptor") => Tag::Descriptor,
            (Ns::Didl, b"Statement") => Tag::Statement,
            (Ns::SrwDc, b"dcx") => Tag::SrwDcx,
            (Ns::Dc, b"date") => Tag::Date,
            _ => Tag::Other,
        }
    }
}

struct Frame {
    tag: Tag,
    resources: Vec<usize>,
    ocr: bool,
    text: String,
}

impl Frame {
    fn new(tag: Tag) -> Self {
        Self {
            tag,
            resources: Vec::new(),
            ocr: false,
            text: String::new(),
        }
    }

    fn collects_text(&self) -> bool {
        matches!(self.tag, Tag::Statement | Tag::Date)
    }
}
