//! Bundle fixtures: metadata documents, manifests and archives

use flate2::Compression;
use flate2::write::GzEncoder;
use ocr_harvest::ChecksumAlgorithm;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bundle serial used throughout the tests; its tail directory is `01`
pub const PAPER_ID: &str = "010000001";

/// Publication date written into fixture metadata
pub const PUBLICATION_DATE: &str = "1921-03-04";

/// One OCR resource listed in a fixture metadata document
#[derive(Clone, Debug)]
pub struct ResourceFixture {
    /// `dcx:filename`
    pub filename: String,
    /// The bytes the server will serve; its MD5 goes into the document
    pub content: Vec<u8>,
    /// The `ref` URL
    pub url: String,
}

impl ResourceFixture {
    /// Resource `article` of [`PAPER_ID`] served from `url`
    pub fn new(article: &str, content: &[u8], url: impl Into<String>) -> Self {
        Self {
            filename: article_name(article),
            content: content.to_vec(),
            url: url.into(),
        }
    }

    /// Hex MD5 of the content
    pub fn md5(&self) -> String {
        ChecksumAlgorithm::Md5.digest_hex(&self.content)
    }
}

/// `DDD_<id>_<article>_articletext.xml`
pub fn article_name(article: &str) -> String {
    format!("DDD_{}_{}_articletext.xml", PAPER_ID, article)
}

/// Name of the fixture bundle's metadata document
pub fn metadata_file_name() -> String {
    format!("DDD:ddd:{}:mpeg21.didl.xml.gz", PAPER_ID)
}

/// A DIDL document with a publication date and OCR resources
pub fn didl_document(date: &str, resources: &[ResourceFixture]) -> String {
    let mut doc = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<didl:DIDL xmlns:didl="urn:mpeg:mpeg21:2002:02-DIDL-NS""#,
        r#" xmlns:dcx="http://krait.kb.nl/coop/tel/handbook/telah.html""#,
        r#" xmlns:srw_dc="info:srw/schema/1/dc-v1.1""#,
        r#" xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
        r#"<didl:Item>"#,
    ));
    doc.push_str(&format!(
        r#"<didl:Component><didl:Resource><srw_dc:dcx><dc:title>Het Nieuws</dc:title><dc:date>{}</dc:date></srw_dc:dcx></didl:Resource></didl:Component>"#,
        date
    ));
    for resource in resources {
        doc.push_str(&format!(
            concat!(
                r#"<didl:Component>"#,
                r#"<didl:Resource dcx:filename="{}" dcx:md5_checksum="{}" ref="{}"/>"#,
                r#"<didl:Descriptor><didl:Statement>ocr</didl:Statement></didl:Descriptor>"#,
                r#"</didl:Component>"#
            ),
            resource.filename,
            resource.md5(),
            resource.url
        ));
    }
    doc.push_str("</didl:Item></didl:DIDL>");
    doc
}

/// Gzip `body`
pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// Write the fixture bundle's metadata document into `<root>/01/`
pub fn write_bundle_metadata(root: &Path, resources: &[ResourceFixture]) -> PathBuf {
    let tail = root.join("01");
    std::fs::create_dir_all(&tail).expect("create tail dir");
    let path = tail.join(metadata_file_name());
    let body = didl_document(PUBLICATION_DATE, resources);
    std::fs::write(&path, gzip(body.as_bytes())).expect("write metadata");
    path
}

/// Put a manifest listing `entries` into the todo directory
pub fn write_manifest(root: &Path, name: &str, entries: &[&Path]) -> PathBuf {
    let todo = root.join("manifests");
    std::fs::create_dir_all(&todo).expect("create todo dir");
    let mut body = String::new();
    for entry in entries {
        body.push_str(&entry.to_string_lossy());
        body.push('\n');
    }
    let path = todo.join(name);
    std::fs::write(&path, body).expect("write manifest");
    path
}

/// Write a bundle archive into `<root>/01/` with raw entry names
///
/// Names are copied into the tar header verbatim, so entries such as
/// `../../etc/passwd` can be produced.
pub fn write_raw_archive(root: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
    let tail = root.join("01");
    std::fs::create_dir_all(&tail).expect("create tail dir");
    let path = tail.join(format!("DDD_ddd_{}.tgz", PAPER_ID));
    let file = std::fs::File::create(&path).expect("create archive");
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_old();
        let bytes = name.as_bytes();
        header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *data).expect("append entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip");
    path
}
