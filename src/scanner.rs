//! Pre-parse scanning
//!
//! Documents are first decoded to UTF-8 by [`decode_document`]. A streaming pass then runs
//! over those bytes before libxml2 sees them. It rejects DOCTYPE
//! declarations outright and collects the schema location hints the document carries, so
//! that every hint can be checked against the trusted registry and the access policy.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use quick_xml::events::Event;
use quick_xml::{NsReader, Reader};
use quick_xml::name::ResolveResult;

use crate::error::{Result, ValidationError};

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// A schema location hint found in an instance document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaHint {
    /// Namespace the hint applies to; `None` for `xsi:noNamespaceSchemaLocation`
    pub namespace: Option<String>,
    pub location: String,
}

/// What the scan learned about a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentScan {
    pub root_name: Option<String>,
    pub root_namespace: Option<String>,
    pub hints: Vec<SchemaHint>,
}

/// Scan an instance document.
///
/// `document` is only used to label errors.
pub fn scan_document(content: &[u8], document: &str) -> Result<DocumentScan> {
    let mut reader = NsReader::from_reader(content);
    let mut buf = Vec::new();
    let mut scan = DocumentScan::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(document, &reader, e))?;

        match event {
            Event::DocType(_) => {
                return Err(ValidationError::DoctypeDisallowed {
                    document: document.to_string(),
                });
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                if scan.root_name.is_none() {
                    let (ns, _) = reader.resolve_element(e.name());
                    scan.root_name = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    scan.root_namespace = bound_namespace(&ns);
                }

                for attr in e.attributes() {
                    let attr = attr.map_err(|e| malformed(document, &reader, e))?;
                    let (attr_ns, local) = reader.resolve_attribute(attr.key);
                    if bound_namespace(&attr_ns).as_deref() != Some(XSI_NAMESPACE) {
                        continue;
                    }

                    let value = attr
                        .unescape_value()
                        .map_err(|e| malformed(document, &reader, e))?;
                    match local.as_ref() {
                        b"schemaLocation" => scan.hints.extend(parse_schema_location(&value)),
                        b"noNamespaceSchemaLocation" => {
                            let location = value.trim();
                            if !location.is_empty() {
                                scan.hints.push(SchemaHint {
                                    namespace: None,
                                    location: location.to_string(),
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(scan)
}

/// Check that trusted content is an XML Schema document and return its target namespace.
pub fn inspect_schema(content: &[u8], canonical_id: &str) -> Result<Option<String>> {
    let fail = |details: String| ValidationError::MalformedTrustedSchema {
        canonical_id: canonical_id.to_string(),
        details,
    };

    let mut reader = NsReader::from_reader(content);
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| fail(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::DocType(_) => return Err(fail("DOCTYPE declarations are not allowed".to_string())),
            Event::Start(ref e) | Event::Empty(ref e) => {
                let (ns, _) = reader.resolve_element(e.name());
                let namespace = bound_namespace(&ns);
                if namespace.as_deref() != Some(XSD_NAMESPACE) || e.local_name().as_ref() != b"schema"
                {
                    return Err(fail(format!(
                        "root element '{}' is not xs:schema",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }

                for attr in e.attributes() {
                    let attr = attr.map_err(|e| fail(e.to_string()))?;
                    if attr.key.as_ref() == b"targetNamespace" {
                        let value = attr.unescape_value().map_err(|e| fail(e.to_string()))?;
                        let value = value.trim();
                        return Ok((!value.is_empty()).then(|| value.to_string()));
                    }
                }
                return Ok(None);
            }
            Event::Eof => return Err(fail("document has no root element".to_string())),
            _ => {}
        }
        buf.clear();
    }
}

/// Bring a document to UTF-8 before it is scanned or parsed.
///
/// The encoding comes from a byte order mark, the `<\0?\0` pattern of BOM-less UTF-16, or
/// the XML declaration, in that order. The returned bytes carry no BOM. UTF-8 input is
/// borrowed unchanged.
pub fn decode_document<'a>(content: &'a [u8], document: &str) -> Result<Cow<'a, [u8]>> {
    if let Some((encoding, bom_length)) = Encoding::for_bom(content) {
        return transcode(&content[bom_length..], encoding, document);
    }

    match content {
        [b'<', 0, b'?', 0, ..] => return transcode(content, UTF_16LE, document),
        [0, b'<', 0, b'?', ..] => return transcode(content, UTF_16BE, document),
        _ => {}
    }

    let Some(label) = declared_encoding(content) else {
        return Ok(Cow::Borrowed(content));
    };
    match Encoding::for_label(label.trim().as_bytes()) {
        // An 8-bit document labelled UTF-16 is read as UTF-8
        Some(encoding) if encoding == UTF_16LE || encoding == UTF_16BE => {
            Ok(Cow::Borrowed(content))
        }
        Some(encoding) => transcode(content, encoding, document),
        None => Err(ValidationError::MalformedDocument {
            document: document.to_string(),
            details: format!("unsupported encoding '{}'", label),
        }),
    }
}

fn declared_encoding(content: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::new();
    match reader.read_event_into(&mut buf) {
        Ok(Event::Decl(decl)) => match decl.encoding()? {
            Ok(label) => Some(String::from_utf8_lossy(&label).into_owned()),
            Err(_) => None,
        },
        _ => None,
    }
}

fn transcode<'a>(
    content: &'a [u8],
    encoding: &'static Encoding,
    document: &str,
) -> Result<Cow<'a, [u8]>> {
    if encoding == UTF_8 {
        return Ok(Cow::Borrowed(content));
    }

    let (text, had_errors) = encoding.decode_without_bom_handling(content);
    if had_errors {
        return Err(ValidationError::MalformedDocument {
            document: document.to_string(),
            details: format!("content is not valid {}", encoding.name()),
        });
    }
    Ok(Cow::Owned(text.into_owned().into_bytes()))
}

/// Split an `xsi:schemaLocation` value into namespace/location pairs.
///
/// A trailing namespace without a location is ignored.
pub fn parse_schema_location(value: &str) -> Vec<SchemaHint> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    tokens
        .chunks_exact(2)
        .map(|pair| SchemaHint {
            namespace: Some(pair[0].to_string()),
            location: pair[1].to_string(),
        })
        .collect()
}

fn bound_namespace(ns: &ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
        }
        _ => None,
    }
}

fn malformed<E: std::fmt::Display, R>(
    document: &str,
    reader: &NsReader<R>,
    err: E,
) -> ValidationError {
    ValidationError::MalformedDocument {
        document: document.to_string(),
        details: format!("at byte {}: {}", reader.buffer_position(), err),
    }
}
