use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Main error type: the single failure channel of a validation attempt
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed trusted schema: {canonical_id} - {details}")]
    MalformedTrustedSchema {
        canonical_id: String,
        details: String,
    },

    #[error("Reader hardening unsupported: {details}")]
    ReaderHardeningUnsupported { details: String },

    #[error(
        "schema_reference: Failed to read schema document '{system_id}', because '{scheme}' access is not allowed due to restriction set by the {property} property."
    )]
    BlockedExternalReference {
        system_id: String,
        scheme: String,
        property: &'static str,
    },

    #[error("XML validation failed: {document} - {}", join_diagnostics(.diagnostics))]
    SchemaValidationViolation {
        document: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error(
        "DOCTYPE is disallowed when the feature \"disallow-doctype-decl\" is set to true: {document}"
    )]
    DoctypeDisallowed { document: String },

    #[error("XML document is not well-formed: {document} - {details}")]
    MalformedDocument { document: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },
}

/// Coarse category of a [`ValidationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedTrustedSchema,
    ReaderHardeningUnsupported,
    BlockedExternalReference,
    SchemaValidationViolation,
    DoctypeDisallowed,
    MalformedDocument,
    Io,
    Config,
    Internal,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MalformedTrustedSchema { .. } => ErrorKind::MalformedTrustedSchema,
            ValidationError::ReaderHardeningUnsupported { .. } => {
                ErrorKind::ReaderHardeningUnsupported
            }
            ValidationError::BlockedExternalReference { .. } => {
                ErrorKind::BlockedExternalReference
            }
            ValidationError::SchemaValidationViolation { .. } => {
                ErrorKind::SchemaValidationViolation
            }
            ValidationError::DoctypeDisallowed { .. } => ErrorKind::DoctypeDisallowed,
            ValidationError::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            ValidationError::Io(_) | ValidationError::FileSystemTraversal { .. } => ErrorKind::Io,
            ValidationError::Config(_) => ErrorKind::Config,
            ValidationError::LibXml2Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Diagnostics carried by a schema violation; empty for every other kind
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            ValidationError::SchemaValidationViolation { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }

    /// Whether the failure is about the document rather than the trusted setup
    pub fn is_document_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BlockedExternalReference
                | ErrorKind::SchemaValidationViolation
                | ErrorKind::DoctypeDisallowed
                | ErrorKind::MalformedDocument
        )
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "no diagnostics reported".to_string();
    }
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {details}")]
    SchemaParseFailed { details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("External entity loader could not be installed")]
    LoaderInstallFailed,

    #[error("Input too large for libxml2: {size} bytes")]
    InputTooLarge { size: usize },

    #[error("Schema validation internal error: code {code}")]
    InternalError { code: i32 },
}

impl From<LibXml2Error> for ValidationError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::LoaderInstallFailed => ValidationError::ReaderHardeningUnsupported {
                details: err.to_string(),
            },
            other => ValidationError::LibXml2Internal {
                details: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
