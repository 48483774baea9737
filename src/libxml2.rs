//! LibXML2 FFI Wrapper Module
//!
//! Direct FFI bindings to the parts of libxml2 the secure reader drives: the in-memory schema
//! parser, the document parser, schema validation, structured error reporting and the
//! process-wide external entity loader.
//!
//! ## Entity loading
//!
//! libxml2 funnels every external load (schema imports and includes, external entities,
//! `xmlCtxtReadFile`) through one global loader function. We install
//! [`intercepting_loader`] once per process. The loader itself holds no trust decisions: it
//! looks up the [`ResolutionScope`] active on the calling thread and asks that scope's
//! resolver first. A matched request is served from memory; an unmatched one is handed to
//! libxml2's original loader only when the scope's access policy permits the scheme, and is
//! otherwise refused and recorded as blocked. With no scope active every load is refused.
//!
//! ## Thread Safety Strategy
//!
//! - **Initialization**: guarded by `std::sync::Once`; libxml2's init functions are not
//!   thread-safe.
//! - **Schema parsing**: serialized behind [`SCHEMA_PARSE_LOCK`]; libxml2's schema parser is
//!   not thread-safe.
//! - **Validation**: fully parallel, each call creates its own validation context against a
//!   read-only compiled schema.
//! - **Error capture**: libxml2 keeps the structured error handler per thread, so each
//!   capture only sees errors raised on its own thread.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};

use libc::{c_char, c_int, c_uchar, c_void};
use tracing::{debug, warn};

use crate::access::{AccessPolicy, scheme_of};
use crate::diagnostics::{Diagnostic, Severity};
use crate::error::{LibXml2Error, LibXml2Result};
use crate::resolver::{EntityResolver, Resolution, ResolutionRequest};
use crate::resource::TrustedResource;

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// Whether our loader was in place right after initialization
static LOADER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// The loader libxml2 had before ours; the restricted fallback for permitted schemes
static DEFAULT_LOADER: OnceLock<XmlExternalEntityLoader> = OnceLock::new();

/// libxml2's schema parser is not thread-safe
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// `XML_CHAR_ENCODING_NONE`: let the parser detect the encoding
const XML_CHAR_ENCODING_NONE: c_int = 0;

/// `XML_PARSE_NONET`: the default loader refuses network access
pub const XML_PARSE_NONET: c_int = 1 << 11;

/// `XML_PARSE_IGNORE_ENC`: ignore the encoding named in the XML declaration
pub const XML_PARSE_IGNORE_ENC: c_int = 1 << 21;

/// Options for instance documents, which arrive already decoded to UTF-8. Entity
/// substitution, DTD loading and DTD attribute defaulting stay off.
const DOCUMENT_PARSE_OPTIONS: c_int = XML_PARSE_NONET | XML_PARSE_IGNORE_ENC;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInputBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

/// Leading fields of `xmlParserInput`; only ever accessed through a libxml2-allocated pointer
#[repr(C)]
pub struct XmlParserInput {
    pub buf: *mut XmlParserInputBuffer,
    pub filename: *const c_char,
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(
        url: *const c_char,
        id: *const c_char,
        context: *mut XmlParserCtxt,
    ) -> *mut XmlParserInput,
>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    // Entity loading
    pub fn xmlSetExternalEntityLoader(f: XmlExternalEntityLoader);
    pub fn xmlGetExternalEntityLoader() -> XmlExternalEntityLoader;
    pub fn xmlParserInputBufferCreateMem(
        mem: *const c_char,
        size: c_int,
        enc: c_int,
    ) -> *mut XmlParserInputBuffer;
    pub fn xmlFreeParserInputBuffer(input: *mut XmlParserInputBuffer);
    pub fn xmlNewIOInputStream(
        ctxt: *mut XmlParserCtxt,
        input: *mut XmlParserInputBuffer,
        enc: c_int,
    ) -> *mut XmlParserInput;
    pub fn xmlStrdup(cur: *const c_uchar) -> *mut c_uchar;

    // Errors
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Documents
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *mut XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let diagnostics = unsafe { &mut *(user_data as *mut Vec<Diagnostic>) };
    let error = unsafe { &*error };

    let Some(severity) = Severity::from_level(error.level) else {
        return;
    };
    let message = if error.message.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(error.message) }
            .to_string_lossy()
            .into_owned()
    };

    let file = c_str_opt(error.file);
    diagnostics.push(
        Diagnostic::new(error.domain, error.code, severity, error.line, &message).with_file(file),
    );
}

/// Routes this thread's libxml2 structured errors into a buffer until dropped
struct ErrorCapture {
    diagnostics: Box<Vec<Diagnostic>>,
}

impl ErrorCapture {
    fn install() -> Self {
        let mut diagnostics = Box::new(Vec::new());
        unsafe {
            xmlSetStructuredErrorFunc(
                diagnostics.as_mut() as *mut Vec<Diagnostic> as *mut c_void,
                Some(structured_error_callback),
            );
        }
        Self { diagnostics }
    }

    fn sink(&mut self) -> *mut c_void {
        self.diagnostics.as_mut() as *mut Vec<Diagnostic> as *mut c_void
    }

    fn finish(mut self) -> Vec<Diagnostic> {
        std::mem::take(self.diagnostics.as_mut())
    }
}

impl Drop for ErrorCapture {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), None);
        }
    }
}

/// A reference the loader refused under the active access policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedReference {
    pub system_id: String,
    pub scheme: String,
}

struct ScopeState {
    resolver: Arc<dyn EntityResolver>,
    policy: AccessPolicy,
    blocked: RefCell<Vec<BlockedReference>>,
}

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<Rc<ScopeState>>> = const { RefCell::new(None) };
}

/// The resolver and access policy the loader consults on this thread.
///
/// Scopes nest: dropping one restores whatever was active before it. A scope is tied to the
/// thread that entered it.
pub struct ResolutionScope {
    state: Rc<ScopeState>,
    previous: Option<Rc<ScopeState>>,
}

impl ResolutionScope {
    pub fn enter(resolver: Arc<dyn EntityResolver>, policy: AccessPolicy) -> Self {
        let state = Rc::new(ScopeState {
            resolver,
            policy,
            blocked: RefCell::new(Vec::new()),
        });
        let previous = ACTIVE_SCOPE.with(|active| active.replace(Some(Rc::clone(&state))));
        Self { state, previous }
    }

    /// References refused since the scope was entered, oldest first
    pub fn blocked(&self) -> Vec<BlockedReference> {
        self.state.blocked.borrow().clone()
    }

    /// Run a request through the same pipeline the loader uses, without touching libxml2
    pub fn decide(&self, request: &ResolutionRequest) -> LoaderDecision {
        decide(&self.state, request)
    }
}

impl Drop for ResolutionScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_SCOPE.with(|active| {
            active.replace(previous);
        });
    }
}

/// What the loader does with one request
#[derive(Debug, Clone)]
pub enum LoaderDecision {
    Serve(TrustedResource),
    Fallback,
    Blocked(BlockedReference),
}

fn decide(state: &ScopeState, request: &ResolutionRequest) -> LoaderDecision {
    match state.resolver.resolve(request) {
        Resolution::Matched(resource) => LoaderDecision::Serve(resource),
        Resolution::Unmatched => {
            let system_id = request.system_id.clone().unwrap_or_default();
            let scheme = scheme_of(&system_id);
            if state.policy.permits(&scheme) {
                debug!(system_id, scheme, "unmatched reference permitted by access policy");
                return LoaderDecision::Fallback;
            }

            warn!(system_id, scheme, "blocked external reference");
            let blocked = BlockedReference { system_id, scheme };
            state.blocked.borrow_mut().push(blocked.clone());
            LoaderDecision::Blocked(blocked)
        }
    }
}

fn c_str_opt(value: *const c_char) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(
        unsafe { CStr::from_ptr(value) }
            .to_string_lossy()
            .into_owned(),
    )
}

/// The process-wide loader: serves trusted resources, refuses whatever the policy forbids
unsafe extern "C" fn intercepting_loader(
    url: *const c_char,
    id: *const c_char,
    context: *mut XmlParserCtxt,
) -> *mut XmlParserInput {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let request = ResolutionRequest {
            public_id: c_str_opt(id),
            system_id: c_str_opt(url),
        };

        let state = ACTIVE_SCOPE.with(|active| active.try_borrow().ok().and_then(|s| s.clone()));
        let Some(state) = state else {
            warn!(
                system_id = request.system_id.as_deref().unwrap_or(""),
                "external load outside a resolution scope refused"
            );
            return ptr::null_mut();
        };

        match decide(&state, &request) {
            LoaderDecision::Serve(resource) => unsafe { memory_input(context, &resource) },
            LoaderDecision::Fallback => match DEFAULT_LOADER.get().copied().flatten() {
                Some(default_loader) => unsafe { default_loader(url, id, context) },
                None => ptr::null_mut(),
            },
            LoaderDecision::Blocked(_) => ptr::null_mut(),
        }
    }));

    outcome.unwrap_or(ptr::null_mut())
}

/// Wrap a trusted resource in a parser input whose base URI is its canonical id
unsafe fn memory_input(
    context: *mut XmlParserCtxt,
    resource: &TrustedResource,
) -> *mut XmlParserInput {
    let Ok(size) = c_int::try_from(resource.len()) else {
        warn!(
            canonical_id = resource.canonical_id(),
            size = resource.len(),
            "trusted resource too large for libxml2"
        );
        return ptr::null_mut();
    };
    let Ok(filename) = CString::new(resource.canonical_id()) else {
        return ptr::null_mut();
    };

    unsafe {
        let buffer = xmlParserInputBufferCreateMem(
            resource.content().as_ptr() as *const c_char,
            size,
            XML_CHAR_ENCODING_NONE,
        );
        if buffer.is_null() {
            return ptr::null_mut();
        }

        let input = xmlNewIOInputStream(context, buffer, XML_CHAR_ENCODING_NONE);
        if input.is_null() {
            xmlFreeParserInputBuffer(buffer);
            return ptr::null_mut();
        }

        // Freed by libxml2 together with the input
        (*input).filename = xmlStrdup(filename.as_ptr() as *const c_uchar) as *const c_char;
        input
    }
}

fn loader_is_ours() -> bool {
    let current = unsafe { xmlGetExternalEntityLoader() };
    current.map(|f| f as *const () as usize)
        == Some(intercepting_loader as *const () as usize)
}

/// Thread-safe wrapper for libxml2 schema pointer with proper resource management
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: compiled schemas are only read after parsing, which libxml2 supports across threads
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

/// A parsed instance document, freed on drop
pub struct XmlDocument {
    ptr: *mut XmlDoc,
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlFreeDoc(self.ptr) };
        }
    }
}

/// Result of compiling a schema: the grammar, if any, and everything libxml2 reported
pub struct SchemaCompilation {
    pub schema: Option<XmlSchemaPtr>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SchemaCompilation {
    /// Diagnostics at error level or above
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_warning())
    }
}

/// Result of parsing an instance document
pub struct DocumentParse {
    pub document: Option<XmlDocument>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Validation result from libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        diagnostics: Vec<Diagnostic>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationResult {
    pub fn from_code(code: c_int, diagnostics: Vec<Diagnostic>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                diagnostics,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }
}

/// Handle on an initialized libxml2 with the intercepting loader in place
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initialize libxml2 and install the intercepting loader, once per process.
    ///
    /// Fails with [`LibXml2Error::LoaderInstallFailed`] when the loader is not (or no longer)
    /// the one libxml2 calls; nothing may be parsed in that state.
    pub fn new() -> LibXml2Result<Self> {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            let previous = xmlGetExternalEntityLoader();
            let _ = DEFAULT_LOADER.set(previous);
            xmlSetExternalEntityLoader(Some(intercepting_loader));
            LOADER_INSTALLED.store(loader_is_ours(), Ordering::SeqCst);
        });

        if !LOADER_INSTALLED.load(Ordering::SeqCst) || !loader_is_ours() {
            return Err(LibXml2Error::LoaderInstallFailed);
        }

        Ok(LibXml2Wrapper {
            _phantom: PhantomData,
        })
    }

    /// Parse an XML schema from a memory buffer.
    ///
    /// Imports and includes are loaded through the loader, so the caller should have a
    /// [`ResolutionScope`] active. Calls are serialized process-wide.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<SchemaCompilation> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::InputTooLarge {
            size: schema_data.len(),
        })?;

        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut capture = ErrorCapture::install();

        let schema = unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt,
                Some(structured_error_callback),
                capture.sink(),
            );

            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);
            XmlSchemaPtr::from_raw(schema_ptr)
        };

        Ok(SchemaCompilation {
            schema,
            diagnostics: capture.finish(),
        })
    }

    /// Parse an instance document from memory.
    ///
    /// `content` must be UTF-8; any encoding named in its declaration is ignored. `url`
    /// becomes the document's base URI.
    pub fn parse_document(&self, content: &[u8], url: Option<&str>) -> LibXml2Result<DocumentParse> {
        let size = c_int::try_from(content.len()).map_err(|_| LibXml2Error::InputTooLarge {
            size: content.len(),
        })?;
        let url = url.and_then(|u| CString::new(u).ok());

        let capture = ErrorCapture::install();
        let doc = unsafe {
            xmlReadMemory(
                content.as_ptr() as *const c_char,
                size,
                url.as_ref().map_or(ptr::null(), |u| u.as_ptr()),
                ptr::null(),
                DOCUMENT_PARSE_OPTIONS,
            )
        };

        Ok(DocumentParse {
            document: (!doc.is_null()).then_some(XmlDocument { ptr: doc }),
            diagnostics: capture.finish(),
        })
    }

    /// Validate a parsed document against a compiled schema.
    ///
    /// Safe to call concurrently; each call owns its validation context.
    pub fn validate_document(
        &self,
        schema: &XmlSchemaPtr,
        document: &XmlDocument,
    ) -> LibXml2Result<ValidationResult> {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        let result_code = unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                &mut diagnostics as *mut Vec<Diagnostic> as *mut c_void,
            );

            let code = xmlSchemaValidateDoc(valid_ctxt, document.ptr);
            xmlSchemaFreeValidCtxt(valid_ctxt);
            code
        };

        match ValidationResult::from_code(result_code, diagnostics) {
            ValidationResult::InternalError { code } => Err(LibXml2Error::InternalError { code }),
            result => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::InterceptingResolver;
    use crate::resource::SchemaRegistry;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    fn scope(resources: Vec<TrustedResource>, policy: AccessPolicy) -> ResolutionScope {
        let resolver = InterceptingResolver::new(SchemaRegistry::new(resources));
        ResolutionScope::enter(Arc::new(resolver), policy)
    }

    #[test]
    fn test_wrapper_installs_loader() {
        let wrapper = LibXml2Wrapper::new();
        assert!(wrapper.is_ok());
        assert!(loader_is_ours());
    }

    #[test]
    fn test_schema_parsing_success() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let _scope = scope(vec![], AccessPolicy::Deny);

        let compiled = wrapper.parse_schema_from_memory(SIMPLE_XSD.as_bytes()).unwrap();
        assert!(compiled.schema.is_some());
        assert_eq!(compiled.errors().count(), 0);
    }

    #[test]
    fn test_schema_parsing_invalid_schema() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let _scope = scope(vec![], AccessPolicy::Deny);

        let compiled = wrapper
            .parse_schema_from_memory(b"<invalid>not a schema</invalid>")
            .unwrap();
        assert!(compiled.schema.is_none());
        assert!(compiled.errors().count() > 0);
    }

    #[test]
    fn test_import_served_from_scope() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let scope = scope(
            vec![TrustedResource::from_bytes("https://example.com/schemas/root.xsd", SIMPLE_XSD)],
            AccessPolicy::Deny,
        );

        let driver = br#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:include schemaLocation="https://example.com/schemas/root.xsd"/>
</xs:schema>"#;
        let compiled = wrapper.parse_schema_from_memory(driver).unwrap();
        assert!(compiled.schema.is_some());
        assert!(scope.blocked().is_empty());
    }

    #[test]
    fn test_unmatched_import_is_blocked() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let scope = scope(vec![], AccessPolicy::Deny);

        let driver = br#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:import namespace="urn:x" schemaLocation="https://example.com/unknown.xsd"/>
</xs:schema>"#;
        let _ = wrapper.parse_schema_from_memory(driver).unwrap();
        assert_eq!(
            scope.blocked(),
            vec![BlockedReference {
                system_id: "https://example.com/unknown.xsd".to_string(),
                scheme: "https".to_string(),
            }]
        );
    }

    #[test]
    fn test_scopes_nest_and_restore() {
        let outer = scope(vec![], AccessPolicy::Deny);
        {
            let inner = scope(vec![], AccessPolicy::All);
            assert!(matches!(
                inner.decide(&ResolutionRequest::new("https://example.com/a.xsd")),
                LoaderDecision::Fallback
            ));
        }
        assert!(matches!(
            outer.decide(&ResolutionRequest::new("https://example.com/a.xsd")),
            LoaderDecision::Blocked(_)
        ));
        assert_eq!(outer.blocked().len(), 1);
    }

    #[test]
    fn test_parse_and_validate_document() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let _scope = scope(vec![], AccessPolicy::Deny);
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap()
            .schema
            .unwrap();

        let valid = wrapper.parse_document(b"<root>Hello</root>", Some("valid.xml")).unwrap();
        let result = wrapper
            .validate_document(&schema, valid.document.as_ref().unwrap())
            .unwrap();
        assert!(result.is_valid());

        let invalid = wrapper
            .parse_document(b"<root><child/></root>", Some("invalid.xml"))
            .unwrap();
        let result = wrapper
            .validate_document(&schema, invalid.document.as_ref().unwrap())
            .unwrap();
        assert!(result.is_invalid());
    }

    #[test]
    fn test_malformed_document_reports_diagnostics() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let parsed = wrapper.parse_document(b"<root><open></root>", None).unwrap();
        assert!(parsed.document.is_none());
        assert!(!parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_declared_encoding_is_ignored_for_decoded_content() {
        let wrapper = LibXml2Wrapper::new().unwrap();
        let parsed = wrapper
            .parse_document(
                br#"<?xml version="1.0" encoding="UTF-16"?><root>Hello</root>"#,
                None,
            )
            .unwrap();
        assert!(parsed.document.is_some(), "{:?}", parsed.diagnostics);
    }

    #[test]
    fn test_validation_result_from_code() {
        assert_eq!(ValidationResult::from_code(0, vec![]), ValidationResult::Valid);
        assert!(ValidationResult::from_code(2, vec![]).is_invalid());
        assert!(ValidationResult::from_code(-1, vec![]).is_error());
    }

    #[test]
    fn test_concurrent_validation_shares_schema() {
        use rayon::prelude::*;

        let wrapper = LibXml2Wrapper::new().unwrap();
        let schema = {
            let _scope = scope(vec![], AccessPolicy::Deny);
            wrapper
                .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
                .unwrap()
                .schema
                .unwrap()
        };

        let all_valid = (0..16).into_par_iter().all(|i| {
            let wrapper = LibXml2Wrapper::new().unwrap();
            let content = format!("<root>{}</root>", i);
            let parsed = wrapper.parse_document(content.as_bytes(), None).unwrap();
            wrapper
                .validate_document(&schema, parsed.document.as_ref().unwrap())
                .unwrap()
                .is_valid()
        });
        assert!(all_valid);
    }
}
