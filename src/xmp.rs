//! XMP sidecar codec.
//!
//! Lightroom keeps develop settings as `crs:` attributes on the first
//! `rdf:Description` of the sidecar. Rendering either merges settings into an
//! existing sidecar (only the attributes of set fields change, everything else
//! is passed through event-for-event) or fills a minimal skeleton.

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::model::{FieldValue, Response, Settings};

// ── Vocabulary ───────────────────────────────────────────────────

pub const NS_META: &str = "adobe:ns:meta/";
pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_CRS: &str = "http://ns.adobe.com/camera-raw-settings/1.0/";

pub const XPACKET_BEGIN: &str = "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>";
pub const XPACKET_END: &str = "<?xpacket end=\"w\"?>";

/// Minimal sidecar Lightroom accepts. Settings are merged into its
/// `rdf:Description` like into any other document.
const SKELETON: &str = concat!(
    "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\" x:xmptk=\"lr-ai-settings ",
    env!("CARGO_PKG_VERSION"),
    "\">\n",
    " <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
    "  <rdf:Description rdf:about=\"\"\n",
    "    xmlns:crs=\"http://ns.adobe.com/camera-raw-settings/1.0/\"\n",
    "   crs:Version=\"15.0\"\n",
    "   crs:ProcessVersion=\"15\"\n",
    "   crs:HasSettings=\"True\"/>\n",
    " </rdf:RDF>\n",
    "</x:xmpmeta>"
);

#[derive(Debug, Error)]
pub enum XmpError {
    #[error("malformed XMP: {0}")]
    Malformed(String),
    #[error("no rdf:Description element found")]
    NoDescription,
    #[error("failed to write XMP: {0}")]
    Write(String),
}

fn malformed(e: impl std::fmt::Display) -> XmpError {
    XmpError::Malformed(e.to_string())
}

// ── Public API ───────────────────────────────────────────────────

/// Render `settings` as a complete XMP packet.
///
/// When `existing` is a well-formed sidecar with an `rdf:Description`, the
/// set fields are merged into it. Otherwise a fresh skeleton is used. A bad
/// `existing` document is never an error.
pub fn render(settings: &Settings, existing: Option<&str>) -> String {
    let merged = existing.and_then(|doc| match merge(doc, settings) {
        Ok(body) => Some(body),
        Err(e) => {
            debug!(error = %e, "existing XMP unusable, synthesizing a new document");
            None
        }
    });
    let body = merged.unwrap_or_else(|| {
        merge(SKELETON, settings).unwrap_or_else(|e| {
            error!(error = %e, "failed to fill XMP skeleton");
            SKELETON.to_string()
        })
    });
    format!("{XPACKET_BEGIN}\n{body}\n{XPACKET_END}")
}

/// Render the settings a response suggests for a single image: the global
/// settings with the first image's overrides applied. Masks have no plain
/// attribute form and are left out.
pub fn render_response(response: &Response, existing: Option<&str>) -> String {
    render(&response.settings_for_image(1), existing)
}

/// Read the develop settings stored on the first `rdf:Description`.
/// Values that do not parse as the field's type are skipped.
pub fn read_settings(document: &str) -> Result<Settings, XmpError> {
    let mut cursor = Cursor::new(document);
    loop {
        match cursor.next()? {
            Item::Description(start, _) => return cursor.read_description(&start),
            Item::Eof => return Err(XmpError::NoDescription),
            Item::Event(_) | Item::Prolog => {}
        }
    }
}

/// Attribute values for every set field, keyed by Camera Raw attribute name.
pub fn attribute_values(settings: &Settings) -> IndexMap<&'static str, String> {
    settings
        .entries()
        .map(|(spec, value)| (spec.attribute, value.to_string()))
        .collect()
}

// ── Merge ────────────────────────────────────────────────────────

/// Body of the merged document, without the xpacket wrapper.
fn merge(document: &str, settings: &Settings) -> Result<String, XmpError> {
    let mut cursor = Cursor::new(document);
    let mut writer = Writer::new(Vec::new());
    let mut merged = false;

    loop {
        let event = match cursor.next()? {
            Item::Eof => break,
            Item::Prolog => continue,
            Item::Event(event) => event,
            Item::Description(start, empty) if !merged => {
                merged = true;
                let updated = cursor.merge_description(&start, settings)?;
                if empty {
                    Event::Empty(updated)
                } else {
                    Event::Start(updated)
                }
            }
            Item::Description(start, true) => Event::Empty(start),
            Item::Description(start, false) => Event::Start(start),
        };
        writer
            .write_event(event)
            .map_err(|e| XmpError::Write(e.to_string()))?;
    }

    if !merged {
        return Err(XmpError::NoDescription);
    }
    let body = String::from_utf8(writer.into_inner()).map_err(|e| XmpError::Write(e.to_string()))?;
    Ok(body.trim().to_string())
}

// ── Document cursor ──────────────────────────────────────────────

enum Item<'a> {
    Event(Event<'a>),
    /// An `rdf:Description` start tag; `true` when self-closing.
    Description(BytesStart<'a>, bool),
    /// Top-level noise the xpacket wrapper replaces.
    Prolog,
    Eof,
}

/// Streams a document while checking it is well-formed and tracking the
/// namespace declarations in scope.
struct Cursor<'a> {
    reader: Reader<&'a [u8]>,
    scopes: Vec<Vec<(String, String)>>,
    depth: usize,
    root_seen: bool,
    root_closed: bool,
    pop_pending: bool,
}

impl<'a> Cursor<'a> {
    fn new(document: &'a str) -> Self {
        Self {
            reader: Reader::from_str(document),
            scopes: Vec::new(),
            depth: 0,
            root_seen: false,
            root_closed: false,
            pop_pending: false,
        }
    }

    fn next(&mut self) -> Result<Item<'a>, XmpError> {
        if self.pop_pending {
            self.scopes.pop();
            self.pop_pending = false;
        }
        let event = self.reader.read_event().map_err(|e| {
            XmpError::Malformed(format!("{e} at byte {}", self.reader.buffer_position()))
        })?;

        match event {
            Event::Eof => {
                if self.depth != 0 {
                    return Err(malformed("document ends inside an element"));
                }
                if !self.root_seen {
                    return Err(malformed("document has no root element"));
                }
                Ok(Item::Eof)
            }
            Event::Start(start) => {
                self.enter(&start)?;
                self.depth += 1;
                if self.is_description(&start) {
                    Ok(Item::Description(start, false))
                } else {
                    Ok(Item::Event(Event::Start(start)))
                }
            }
            Event::Empty(start) => {
                self.enter(&start)?;
                self.pop_pending = true;
                if self.depth == 0 {
                    self.root_closed = true;
                }
                if self.is_description(&start) {
                    Ok(Item::Description(start, true))
                } else {
                    Ok(Item::Event(Event::Empty(start)))
                }
            }
            Event::End(end) => {
                self.scopes.pop();
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    self.root_closed = true;
                }
                Ok(Item::Event(Event::End(end)))
            }
            Event::Decl(_) if self.depth == 0 => Ok(Item::Prolog),
            Event::PI(pi) if self.depth == 0 && pi.target() == b"xpacket" => Ok(Item::Prolog),
            Event::Text(text) if self.depth == 0 => {
                let bytes: &[u8] = &text;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    Ok(Item::Prolog)
                } else {
                    Err(malformed("text outside the root element"))
                }
            }
            Event::CData(_) if self.depth == 0 => Err(malformed("CDATA outside the root element")),
            other => Ok(Item::Event(other)),
        }
    }

    /// Open an element scope holding its namespace declarations. Every
    /// attribute is parsed here so duplicates or broken quoting surface as
    /// malformed input.
    fn enter(&mut self, start: &BytesStart<'_>) -> Result<(), XmpError> {
        if self.depth == 0 {
            if self.root_closed {
                return Err(malformed("more than one root element"));
            }
            self.root_seen = true;
        }
        let mut frame = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let key = attr.key.as_ref();
            let prefix = if key == b"xmlns" {
                Some(String::new())
            } else {
                key.strip_prefix(b"xmlns:")
                    .map(|p| String::from_utf8_lossy(p).into_owned())
            };
            if let Some(prefix) = prefix {
                let uri = attr.unescape_value().map_err(malformed)?.into_owned();
                frame.push((prefix, uri));
            }
        }
        self.scopes.push(frame);
        Ok(())
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn namespace_of(&self, name: QName<'_>) -> Option<&str> {
        let prefix = name
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
            .unwrap_or_default();
        self.resolve(&prefix)
    }

    fn is_description(&self, start: &BytesStart<'_>) -> bool {
        let name = start.name();
        name.local_name().as_ref() == b"Description" && self.namespace_of(name) == Some(NS_RDF)
    }

    /// Local name of a `crs:` attribute. Unprefixed attributes carry no
    /// namespace, so the default namespace never applies.
    fn crs_local_name<'k>(&self, key: QName<'k>) -> Option<&'k str> {
        key.prefix()?;
        if self.namespace_of(key) != Some(NS_CRS) {
            return None;
        }
        std::str::from_utf8(key.local_name().into_inner()).ok()
    }

    /// Prefix currently bound to the Camera Raw namespace, if any.
    fn crs_prefix(&self) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(prefix, uri)| {
                uri == NS_CRS && !prefix.is_empty() && self.resolve(prefix) == Some(NS_CRS)
            })
            .map(|(prefix, _)| prefix.clone())
    }

    /// An unbound prefix to declare for the Camera Raw namespace.
    fn free_crs_prefix(&self) -> String {
        std::iter::once("crs".to_string())
            .chain((1..).map(|n| format!("crs{n}")))
            .find(|candidate| self.resolve(candidate).is_none())
            .unwrap_or_else(|| "crs".to_string())
    }

    fn merge_description(
        &self,
        start: &BytesStart<'_>,
        settings: &Settings,
    ) -> Result<BytesStart<'static>, XmpError> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(malformed)?
            .to_string();
        let mut updates = attribute_values(settings);
        let mut merged = BytesStart::new(name);

        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            if let Some(local) = self.crs_local_name(attr.key) {
                if let Some(value) = updates.shift_remove(local) {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    merged.push_attribute((key.as_str(), value.as_str()));
                    continue;
                }
            }
            if attr.value.contains(&b'"') {
                // Single-quoted source value; re-escape for the double quotes we write.
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = attr.unescape_value().map_err(malformed)?.into_owned();
                merged.push_attribute((key.as_str(), value.as_str()));
            } else {
                merged.push_attribute(attr);
            }
        }

        if !updates.is_empty() {
            let prefix = match self.crs_prefix() {
                Some(prefix) => prefix,
                None => {
                    let prefix = self.free_crs_prefix();
                    merged.push_attribute((format!("xmlns:{prefix}").as_str(), NS_CRS));
                    prefix
                }
            };
            for (attribute, value) in &updates {
                merged.push_attribute((format!("{prefix}:{attribute}").as_str(), value.as_str()));
            }
        }
        Ok(merged)
    }

    fn read_description(&self, start: &BytesStart<'_>) -> Result<Settings, XmpError> {
        let mut settings = Settings::default();
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let Some(local) = self.crs_local_name(attr.key) else {
                continue;
            };
            let Some(spec) = Settings::field_by_attribute(local) else {
                continue;
            };
            let raw = attr.unescape_value().map_err(malformed)?;
            match FieldValue::parse(spec.kind, &raw) {
                Some(value) if settings.set(spec.name, value) => {}
                _ => warn!(attribute = local, value = %raw, "ignoring unparseable XMP value"),
            }
        }
        Ok(settings)
    }
}
