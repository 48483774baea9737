//! Secure reader factory
//!
//! [`SecureReaderFactory::build`] compiles a registry of trusted schemas into one grammar and
//! returns a [`SecureReader`] bound to it. The reader rejects DOCTYPE declarations, never
//! substitutes entities, and sends every schema reference through the intercepting resolver
//! before the access policy gets a say. Nothing here reads the environment: the only access
//! toggle is [`ReaderConfig::access_external_schema`], and it defaults to no access.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::{ACCESS_EXTERNAL_SCHEMA, AccessPolicy, expand_system_id};
use crate::diagnostics::Diagnostic;
use crate::error::{Result, ValidationError};
use crate::libxml2::{
    BlockedReference, LibXml2Wrapper, LoaderDecision, ResolutionScope, ValidationResult,
    XmlSchemaPtr,
};
use crate::resolver::{EntityResolver, InterceptingResolver, ResolutionRequest};
use crate::resource::SchemaRegistry;
use crate::scanner::{XSD_NAMESPACE, decode_document, inspect_schema, scan_document};

/// Label used for documents that carry no system id
pub const ANONYMOUS_DOCUMENT: &str = "<memory>";

/// Settings applied to every reader a factory builds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Schemes the engine may dereference for references the registry does not cover
    #[serde(default)]
    pub access_external_schema: AccessPolicy,
}

/// A document to validate: its bytes plus the system id used as its base URI
#[derive(Debug, Clone)]
pub struct InputSource {
    system_id: Option<String>,
    content: Vec<u8>,
}

impl InputSource {
    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self {
            system_id: None,
            content: content.into(),
        }
    }

    /// Read a file; its absolute `file:` URL becomes the system id
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let absolute = std::path::absolute(path)?;
        let system_id = url::Url::from_file_path(&absolute)
            .map(String::from)
            .unwrap_or_else(|_| absolute.display().to_string());
        Ok(Self {
            system_id: Some(system_id),
            content,
        })
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    fn label(&self) -> &str {
        self.system_id.as_deref().unwrap_or(ANONYMOUS_DOCUMENT)
    }
}

/// Builds hardened, schema-validating readers
#[derive(Debug, Clone, Default)]
pub struct SecureReaderFactory {
    config: ReaderConfig,
}

impl SecureReaderFactory {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Compile `registry` and return a reader bound to it.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::ReaderHardeningUnsupported`] if the intercepting loader cannot be
    ///   put in place
    /// - [`ValidationError::MalformedTrustedSchema`] if a trusted resource is not a usable XSD
    /// - [`ValidationError::BlockedExternalReference`] if a trusted schema refers to something
    ///   outside the registry that the access policy forbids
    pub fn build(&self, registry: &SchemaRegistry) -> Result<SecureReader> {
        let resolver = InterceptingResolver::new(registry.clone());
        self.build_with_resolver(registry, Arc::new(resolver))
    }

    /// Like [`build`](Self::build), with a caller-provided first-stage resolver
    pub fn build_with_resolver(
        &self,
        registry: &SchemaRegistry,
        resolver: Arc<dyn EntityResolver>,
    ) -> Result<SecureReader> {
        let libxml2 = LibXml2Wrapper::new()?;
        let policy = self.config.access_external_schema.clone();

        let mut members = Vec::with_capacity(registry.len());
        for resource in registry {
            let namespace = inspect_schema(resource.content(), resource.canonical_id())?;
            members.push((resource.canonical_id(), namespace));
        }
        let driver = driver_schema(&members);

        let compilation = {
            let scope = ResolutionScope::enter(Arc::clone(&resolver), policy.clone());
            let compilation = libxml2.parse_schema_from_memory(driver.as_bytes())?;
            if let Some(blocked) = scope.blocked().into_iter().next() {
                return Err(blocked_error(blocked));
            }
            compilation
        };

        for warning in compilation.diagnostics.iter().filter(|d| d.is_warning()) {
            debug!(message = %warning, "schema compilation warning");
        }
        if let Some(error) = compilation.errors().next() {
            return Err(ValidationError::MalformedTrustedSchema {
                canonical_id: faulty_resource(error, registry),
                details: error.to_string(),
            });
        }
        let Some(schema) = compilation.schema else {
            return Err(ValidationError::MalformedTrustedSchema {
                canonical_id: faulty_resource_ids(registry),
                details: "libxml2 produced no grammar".to_string(),
            });
        };

        debug!(
            resources = registry.len(),
            policy = %policy,
            "compiled trusted schemas"
        );

        Ok(SecureReader {
            libxml2,
            schema,
            resolver,
            policy,
        })
    }
}

/// A validating reader bound to one compiled grammar.
///
/// Parsing consumes the reader; build a fresh one per document.
pub struct SecureReader {
    libxml2: LibXml2Wrapper,
    schema: XmlSchemaPtr,
    resolver: Arc<dyn EntityResolver>,
    policy: AccessPolicy,
}

impl SecureReader {
    /// Parse and validate one document
    pub fn parse(self, input: &InputSource) -> Result<()> {
        let document = input.label();
        let scope = ResolutionScope::enter(Arc::clone(&self.resolver), self.policy.clone());

        // The scan and libxml2 both read the UTF-8 text
        let content = decode_document(input.content(), document)?;
        let scan = scan_document(&content, document)?;
        for hint in &scan.hints {
            let system_id = expand_system_id(&hint.location, input.system_id());
            match scope.decide(&ResolutionRequest::new(system_id.as_str())) {
                LoaderDecision::Serve(resource) => debug!(
                    document,
                    location = %hint.location,
                    canonical_id = resource.canonical_id(),
                    "schema hint covered by trusted resource"
                ),
                LoaderDecision::Fallback => info!(
                    document,
                    location = %hint.location,
                    "schema hint permitted by access policy but not fetched; compiled grammar applies"
                ),
                LoaderDecision::Blocked(blocked) => return Err(blocked_error(blocked)),
            }
        }

        let parsed = self.libxml2.parse_document(&content, input.system_id())?;
        if let Some(blocked) = scope.blocked().into_iter().next() {
            return Err(blocked_error(blocked));
        }
        let Some(parsed_document) = parsed.document else {
            return Err(ValidationError::MalformedDocument {
                document: document.to_string(),
                details: first_message(&parsed.diagnostics),
            });
        };

        match self.libxml2.validate_document(&self.schema, &parsed_document)? {
            ValidationResult::Valid => {
                debug!(document, "document is valid");
                Ok(())
            }
            ValidationResult::Invalid { diagnostics, .. } => {
                Err(ValidationError::SchemaValidationViolation {
                    document: document.to_string(),
                    diagnostics,
                })
            }
            ValidationResult::InternalError { code } => Err(ValidationError::LibXml2Internal {
                details: format!("schema validation internal error: code {}", code),
            }),
        }
    }
}

/// Build a fresh reader and validate a single document with it
pub fn validate_document(
    config: &ReaderConfig,
    registry: &SchemaRegistry,
    input: &InputSource,
) -> Result<()> {
    SecureReaderFactory::new(config.clone())
        .build(registry)?
        .parse(input)
}

/// Schema that pulls every trusted resource into one grammar
fn driver_schema(members: &[(&str, Option<String>)]) -> String {
    let mut driver = format!("<xs:schema xmlns:xs=\"{}\">\n", XSD_NAMESPACE);
    for (canonical_id, namespace) in members {
        let location = escape(canonical_id);
        // Writing into a String cannot fail
        let _ = match namespace {
            Some(ns) => writeln!(
                driver,
                "  <xs:import namespace=\"{}\" schemaLocation=\"{}\"/>",
                escape(ns),
                location
            ),
            None => writeln!(driver, "  <xs:include schemaLocation=\"{}\"/>", location),
        };
    }
    driver.push_str("</xs:schema>\n");
    driver
}

fn escape(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

fn blocked_error(blocked: BlockedReference) -> ValidationError {
    ValidationError::BlockedExternalReference {
        system_id: blocked.system_id,
        scheme: blocked.scheme,
        property: ACCESS_EXTERNAL_SCHEMA,
    }
}

fn faulty_resource(error: &Diagnostic, registry: &SchemaRegistry) -> String {
    if let Some(file) = error.file.as_deref() {
        if let Some(resource) = registry.iter().find(|r| r.canonical_id() == file) {
            return resource.canonical_id().to_string();
        }
    }
    faulty_resource_ids(registry)
}

fn faulty_resource_ids(registry: &SchemaRegistry) -> String {
    if registry.is_empty() {
        return "<empty registry>".to_string();
    }
    registry
        .iter()
        .map(|r| r.canonical_id())
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_message(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| !d.is_warning())
        .or_else(|| diagnostics.first())
        .map(ToString::to_string)
        .unwrap_or_else(|| "document could not be parsed".to_string())
}
