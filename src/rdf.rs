//! # RDF Descriptor Module
//!
//! Every published asset folder contains an RDF/XML descriptor written by the
//! publishing tools. Its single `rdf:Description` is stated `rdf:about="."`,
//! i.e. about the folder itself, and carries the piece header fields in the
//! Mutopia piece-data namespace:
//!
//! ```xml
//! <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
//!          xmlns:mp="http://www.mutopiaproject.org/piece-data/0.1/">
//!   <rdf:Description rdf:about=".">
//!     <mp:title>Prelude in C</mp:title>
//!     <mp:composer>BachJS</mp:composer>
//!     <mp:id>Mutopia-2016/2/12-33</mp:id>
//!   </rdf:Description>
//! </rdf:RDF>
//! ```
//!
//! This module reads such documents into a [`PieceDescriptor`] and defines
//! [`DescriptorSource`], the seam through which the reconciler fetches them.

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Namespace of the piece header properties.
pub const MP_NAMESPACE: &str = "http://www.mutopiaproject.org/piece-data/0.1/";

const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// Why a descriptor could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("descriptor not found: {0}")]
    NotFound(String),

    #[error("HTTP status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },
}

/// Why a fetched descriptor could not be read.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed RDF/XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("no description of {0} in document")]
    MissingSubject(String),
}

/// Header fields stated about one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PieceDescriptor {
    fields: HashMap<String, String>,
}

impl PieceDescriptor {
    /// Value of a piece-data property, trimmed. Empty values read as `None`.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&str> {
        self.fields
            .get(property)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Value of a property, or the empty string.
    #[must_use]
    pub fn text(&self, property: &str) -> String {
        self.get(property).unwrap_or_default().to_string()
    }

    /// True when the preview image is vector graphics.
    #[must_use]
    pub fn has_svg_preview(&self) -> bool {
        self.get("preview")
            .is_some_and(|image| image.to_ascii_lowercase().ends_with(".svg"))
    }

    pub fn insert(&mut self, property: &str, value: &str) {
        self.fields.insert(property.to_string(), value.to_string());
    }
}

/// Resolve an `rdf:about` reference against the document URL.
fn resolve_about(about: &str, document_url: &str) -> String {
    if about.contains("://") {
        return about.to_string();
    }
    let dir = match document_url.rfind('/') {
        Some(idx) => &document_url[..=idx],
        None => "",
    };
    match about.trim_start_matches("./") {
        "" | "." => dir.to_string(),
        rest => format!("{dir}{rest}"),
    }
}

/// The namespaces the parser cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NsKind {
    Rdf,
    Mp,
    Other,
}

impl NsKind {
    fn of(ns: &ResolveResult<'_>) -> Self {
        match ns {
            ResolveResult::Bound(Namespace(uri)) if *uri == RDF_NAMESPACE.as_bytes() => NsKind::Rdf,
            ResolveResult::Bound(Namespace(uri)) if *uri == MP_NAMESPACE.as_bytes() => NsKind::Mp,
            _ => NsKind::Other,
        }
    }
}

/// `rdf:about` and the property attributes of an `rdf:Description` tag.
struct DescriptionAttributes {
    about: String,
    properties: Vec<(String, String)>,
}

impl DescriptionAttributes {
    fn fill(self, descriptor: &mut PieceDescriptor) {
        for (name, value) in self.properties {
            descriptor.insert(&name, &value);
        }
    }
}

fn read_description(
    reader: &NsReader<&[u8]>,
    start: &BytesStart<'_>,
) -> Result<DescriptionAttributes, DescriptorError> {
    let mut about = String::from(".");
    let mut properties = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let (attr_ns, attr_local) = reader.resolve_attribute(attr.key);
        let name = String::from_utf8_lossy(attr_local.as_ref()).into_owned();
        match NsKind::of(&attr_ns) {
            NsKind::Rdf if name == "about" => about = attr.unescape_value()?.into_owned(),
            NsKind::Mp => properties.push((name, attr.unescape_value()?.into_owned())),
            _ => {}
        }
    }
    Ok(DescriptionAttributes { about, properties })
}

/// Parse an RDF/XML document and return the properties stated about `subject`.
///
/// `document_url` is where the document was fetched from; relative
/// `rdf:about` references are resolved against it.
pub fn parse_descriptor(
    xml: &str,
    subject: &str,
    document_url: &str,
) -> Result<PieceDescriptor, DescriptorError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut descriptor = PieceDescriptor::default();
    let mut found = false;
    let mut depth = 0usize;
    // Depth of the matching rdf:Description while inside it.
    let mut subject_depth: Option<usize> = None;
    let mut property: Option<String> = None;
    let mut value = String::new();

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let ns = NsKind::of(&ns);
        match event {
            Event::Start(e) => {
                depth += 1;
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match subject_depth {
                    None if ns == NsKind::Rdf && local == "Description" => {
                        let attrs = read_description(&reader, &e)?;
                        if resolve_about(&attrs.about, document_url) == subject {
                            found = true;
                            subject_depth = Some(depth);
                            attrs.fill(&mut descriptor);
                        }
                    }
                    Some(d) if depth == d + 1 && ns == NsKind::Mp => {
                        property = Some(local);
                        value.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match subject_depth {
                    None if ns == NsKind::Rdf && local == "Description" => {
                        let attrs = read_description(&reader, &e)?;
                        if resolve_about(&attrs.about, document_url) == subject {
                            found = true;
                            attrs.fill(&mut descriptor);
                        }
                    }
                    Some(d) if depth == d && ns == NsKind::Mp => descriptor.insert(&local, ""),
                    _ => {}
                }
            }
            Event::Text(t) => {
                if property.is_some() {
                    value.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if property.is_some() {
                    value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                match subject_depth {
                    Some(d) if depth == d + 1 => {
                        if let Some(name) = property.take() {
                            descriptor.insert(&name, &value);
                        }
                    }
                    Some(d) if depth == d => subject_depth = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Err(DescriptorError::MissingSubject(subject.to_string()));
    }
    debug!("Read {} properties about {subject}", descriptor.fields.len());
    Ok(descriptor)
}

/// Where descriptors come from.
pub trait DescriptorSource {
    /// Fetch the raw document at `url`.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`] is treated as transient by the reconciler: the asset
    /// stays pending and is retried on the next pass.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches descriptors over HTTP with a blocking agent.
pub struct HttpSource {
    agent: ureq::Agent,
}

impl HttpSource {
    #[must_use]
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .build();
        Self { agent }
    }
}

impl DescriptorSource for HttpSource {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|error| request_failure(url, error))?;

        response
            .into_string()
            .map_err(|error| body_failure(url, &error))
    }
}

/// Map a failed request: gone descriptors are `NotFound`, other error
/// statuses keep their code, everything else is a transport problem.
fn request_failure(url: &str, error: ureq::Error) -> FetchError {
    match error {
        ureq::Error::Status(404 | 410, _) => FetchError::NotFound(url.to_string()),
        ureq::Error::Status(status, _) => FetchError::Status {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => FetchError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

fn body_failure(url: &str, error: &std::io::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        message: format!("reading response body: {error}"),
    }
}

/// Serves documents from memory, keyed by URL. Unknown URLs are not found.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str, document: &str) {
        self.documents.insert(url.to_string(), document.to_string());
    }
}

impl DescriptorSource for MemorySource {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_URL: &str = "http://www.mutopiaproject.org/ftp/BachJS/BWV846/wtk1/wtk1.rdf";
    const SUBJECT: &str = "http://www.mutopiaproject.org/ftp/BachJS/BWV846/wtk1/";

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:mp="http://www.mutopiaproject.org/piece-data/0.1/">
  <rdf:Description rdf:about=".">
    <mp:title>Prelude &amp; Fugue in C</mp:title>
    <mp:composer>BachJS</mp:composer>
    <mp:for>Harpsichord, Piano</mp:for>
    <mp:id>Mutopia-2016/2/12-33</mp:id>
    <mp:moreInfo><![CDATA[From <b>WTK</b> I]]></mp:moreInfo>
    <mp:opus/>
    <mp:preview>wtk1-preview.svg</mp:preview>
  </rdf:Description>
</rdf:RDF>
"#;

    #[test]
    fn test_parse_descriptor_fields() {
        let d = parse_descriptor(SAMPLE, SUBJECT, DOC_URL).unwrap();
        assert_eq!(d.get("title"), Some("Prelude & Fugue in C"));
        assert_eq!(d.get("composer"), Some("BachJS"));
        assert_eq!(d.get("for"), Some("Harpsichord, Piano"));
        assert_eq!(d.get("id"), Some("Mutopia-2016/2/12-33"));
        assert_eq!(d.get("moreInfo"), Some("From <b>WTK</b> I"));
        assert_eq!(d.get("opus"), None);
        assert_eq!(d.text("opus"), "");
        assert!(d.has_svg_preview());
    }

    #[test]
    fn test_parse_descriptor_wrong_subject() {
        let err = parse_descriptor(SAMPLE, "http://elsewhere/", DOC_URL).unwrap_err();
        assert!(matches!(err, DescriptorError::MissingSubject(_)));
    }

    #[test]
    fn test_parse_descriptor_absolute_about() {
        let doc = SAMPLE.replace(r#"rdf:about=".""#, &format!(r#"rdf:about="{SUBJECT}""#));
        let d = parse_descriptor(&doc, SUBJECT, DOC_URL).unwrap();
        assert_eq!(d.get("composer"), Some("BachJS"));
    }

    #[test]
    fn test_parse_descriptor_ignores_foreign_namespace() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:dc="http://purl.org/dc/elements/1.1/"
            xmlns:mp="http://www.mutopiaproject.org/piece-data/0.1/">
          <rdf:Description rdf:about=".">
            <dc:title>Wrong</dc:title>
            <mp:title>Right</mp:title>
          </rdf:Description>
        </rdf:RDF>"#;
        let d = parse_descriptor(doc, SUBJECT, DOC_URL).unwrap();
        assert_eq!(d.get("title"), Some("Right"));
    }

    #[test]
    fn test_parse_descriptor_malformed() {
        let doc = "<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"><a></b>";
        assert!(parse_descriptor(doc, SUBJECT, DOC_URL).is_err());
    }

    #[test]
    fn test_resolve_about() {
        assert_eq!(resolve_about(".", DOC_URL), SUBJECT);
        assert_eq!(resolve_about("", DOC_URL), SUBJECT);
        assert_eq!(resolve_about("./", DOC_URL), SUBJECT);
        assert_eq!(resolve_about("http://x/y/", DOC_URL), "http://x/y/");
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemorySource::new();
        source.insert(DOC_URL, SAMPLE);
        assert!(source.fetch(DOC_URL).is_ok());
        assert!(matches!(
            source.fetch("http://missing"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_descriptor_attribute_properties() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:mp="http://www.mutopiaproject.org/piece-data/0.1/">
          <rdf:Description rdf:about="." mp:title="Minuet &amp; Trio" mp:composer="BachJS"/>
        </rdf:RDF>"#;
        let d = parse_descriptor(doc, SUBJECT, DOC_URL).unwrap();
        assert_eq!(d.get("title"), Some("Minuet & Trio"));
        assert_eq!(d.get("composer"), Some("BachJS"));
        assert_eq!(d.get("about"), None);
    }

    #[test]
    fn test_parse_descriptor_mixed_attribute_and_element_properties() {
        let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:mp="http://www.mutopiaproject.org/piece-data/0.1/">
          <rdf:Description rdf:about="http://elsewhere.test/" mp:title="Other"/>
          <rdf:Description rdf:about="." mp:style="Baroque">
            <mp:title>Gavotte</mp:title>
          </rdf:Description>
        </rdf:RDF>"#;
        let d = parse_descriptor(doc, SUBJECT, DOC_URL).unwrap();
        assert_eq!(d.get("title"), Some("Gavotte"));
        assert_eq!(d.get("style"), Some("Baroque"));
    }

    fn status_error(status: u16) -> ureq::Error {
        let response = ureq::Response::new(status, "Error", "").unwrap();
        ureq::Error::Status(status, response)
    }

    #[test]
    fn test_request_failure_classification() {
        assert!(matches!(
            request_failure(DOC_URL, status_error(404)),
            FetchError::NotFound(url) if url == DOC_URL
        ));
        assert!(matches!(
            request_failure(DOC_URL, status_error(410)),
            FetchError::NotFound(_)
        ));
        assert!(matches!(
            request_failure(DOC_URL, status_error(500)),
            FetchError::Status { status: 500, .. }
        ));
        assert!(matches!(
            request_failure(DOC_URL, status_error(403)),
            FetchError::Status { status: 403, .. }
        ));
    }

    #[test]
    fn test_body_failure_is_transport() {
        let error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed early");
        match body_failure(DOC_URL, &error) {
            FetchError::Transport { url, message } => {
                assert_eq!(url, DOC_URL);
                assert!(message.contains("closed early"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Serve one canned HTTP response per connection, in order.
    fn serve(responses: Vec<&'static str>) -> String {
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for response in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                    line.clear();
                }
                let mut stream = reader.into_inner();
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });
        format!("http://{addr}/ftp/BachJS/wtk1/wtk1.rdf")
    }

    #[test]
    fn test_http_source_against_local_server() {
        let url = serve(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\ntruncated",
            "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\n<rdf/>\n",
        ]);
        let source = HttpSource::new(Duration::from_secs(5), Duration::from_secs(5));

        assert!(matches!(source.fetch(&url), Err(FetchError::NotFound(_))));
        assert!(matches!(
            source.fetch(&url),
            Err(FetchError::Status { status: 500, .. })
        ));
        assert!(matches!(source.fetch(&url), Err(FetchError::Transport { .. })));
        assert_eq!(source.fetch(&url).unwrap(), "<rdf/>\n");
    }
}
