//! Intercepting resolver
//!
//! The resolver is the only channel through which the engine may obtain a schema or entity.
//! It answers from the trusted registry or abstains; it never touches the filesystem or the
//! network. What happens to an abstained request is decided later by the reader's access
//! policy, not here.

use tracing::debug;

use crate::resource::{SchemaRegistry, TrustedResource, filename_of};

/// Host under which the dependency-check schemas were first published
pub const LEGACY_HOST: &str = "jeremylong.github.io";

/// Host the same schemas are published under today
pub const CANONICAL_HOST: &str = "dependency-check.github.io";

/// One resolution request, as issued by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

impl ResolutionRequest {
    pub fn new(system_id: impl Into<String>) -> Self {
        Self {
            public_id: None,
            system_id: Some(system_id.into()),
        }
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }
}

/// Outcome of a resolution request
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Served from the registry; the engine reads this resource's buffered content
    Matched(TrustedResource),
    /// Not recognized; the caller forwards the request to the restricted fallback
    Unmatched,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }

    pub fn resource(&self) -> Option<&TrustedResource> {
        match self {
            Resolution::Matched(resource) => Some(resource),
            Resolution::Unmatched => None,
        }
    }
}

/// First stage of the resolution pipeline.
///
/// Implementations must not perform I/O: every matched resource has to come from content
/// supplied up front.
#[cfg_attr(test, mockall::automock)]
pub trait EntityResolver: Send + Sync {
    fn resolve(&self, request: &ResolutionRequest) -> Resolution;
}

/// Registry-backed resolver.
///
/// Precedence, first match wins: canonical id, legacy host alias, unique filename.
#[derive(Debug, Clone)]
pub struct InterceptingResolver {
    registry: SchemaRegistry,
}

impl InterceptingResolver {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn by_canonical_id(&self, system_id: &str) -> Option<&TrustedResource> {
        self.registry
            .iter()
            .find(|resource| resource.canonical_id() == system_id)
    }

    fn by_filename(&self, system_id: &str) -> Option<&TrustedResource> {
        let wanted = filename_of(system_id);
        if wanted.is_empty() {
            return None;
        }

        let mut candidates = self
            .registry
            .iter()
            .filter(|resource| resource.filename() == wanted);
        let first = candidates.next()?;
        if candidates.next().is_some() {
            debug!(
                system_id,
                filename = wanted,
                "filename matches several trusted resources; leaving unmatched"
            );
            return None;
        }
        Some(first)
    }
}

impl EntityResolver for InterceptingResolver {
    fn resolve(&self, request: &ResolutionRequest) -> Resolution {
        let Some(system_id) = request.system_id.as_deref() else {
            debug!("resolution request without system id");
            return Resolution::Unmatched;
        };

        if let Some(resource) = self.by_canonical_id(system_id) {
            debug!(system_id, "matched trusted resource by canonical id");
            return Resolution::Matched(resource.clone());
        }

        if let Some(alias) = legacy_alias(system_id) {
            if let Some(resource) = self.by_canonical_id(&alias) {
                debug!(system_id, canonical_id = %alias, "matched trusted resource by legacy host");
                return Resolution::Matched(resource.clone());
            }
        }

        if let Some(resource) = self.by_filename(system_id) {
            debug!(
                system_id,
                canonical_id = resource.canonical_id(),
                "matched trusted resource by filename"
            );
            return Resolution::Matched(resource.clone());
        }

        debug!(system_id, "no trusted resource for system id");
        Resolution::Unmatched
    }
}

/// Rewrite a URI on the legacy host onto the canonical host.
///
/// Only an exact host match is rewritten; scheme, port, path, query and fragment are kept
/// byte for byte.
pub fn legacy_alias(system_id: &str) -> Option<String> {
    let scheme_end = system_id.find("://")?;
    let authority_start = scheme_end + 3;
    let rest = &system_id[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    // userinfo is never part of a published schema location
    if authority.contains('@') {
        return None;
    }
    let host_len = authority.find(':').unwrap_or(authority.len());
    if &authority[..host_len] != LEGACY_HOST {
        return None;
    }

    let mut alias = String::with_capacity(system_id.len() + CANONICAL_HOST.len());
    alias.push_str(&system_id[..authority_start]);
    alias.push_str(CANONICAL_HOST);
    alias.push_str(&rest[host_len..]);
    Some(alias)
}
