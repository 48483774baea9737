//! End-to-end checks of the secure reader against the schema-validation fixtures

mod common;

use std::sync::Arc;

use common::{IRRELEVANT_ID, SIMPLE_ID, TestFixtures};
use xsd_guard::{
    AccessPolicy, EntityResolver, ErrorKind, InputSource, ReaderConfig, Resolution,
    ResolutionRequest, SchemaRegistry, SecureReaderFactory, TrustedResource, ValidationError,
    validate_document,
};

fn parse_with(registry: &SchemaRegistry, document: &str) -> Result<(), ValidationError> {
    let fixtures = TestFixtures::new();
    validate_document(&ReaderConfig::default(), registry, &fixtures.document(document))
}

fn assert_blocked(document: &str, expected_scheme: &str) {
    let fixtures = TestFixtures::new();
    let err = parse_with(&fixtures.default_registry(), document).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BlockedExternalReference, "{document}: {err}");
    let message = err.to_string();
    assert!(
        message.contains(&format!("'{}'", expected_scheme)),
        "{document}: {message}"
    );
    assert!(message.contains("accessExternalSchema"), "{document}: {message}");
}

#[test]
fn test_valid_documents_against_trusted_schemas() {
    let fixtures = TestFixtures::new();
    let registry = fixtures.default_registry();

    for document in [
        "simpledoc-valid-no-schemaloc.xml",
        "simpledoc-valid-schemaloc-https.xml",
        "simpledoc-valid-schemaloc-https-legacy.xml",
        "simpledoc-valid-schemaloc-ambiguous-uri.xml",
    ] {
        if let Err(e) = parse_with(&registry, document) {
            panic!("{} should validate: {}", document, e);
        }
    }
}

#[test]
fn test_https_reference_with_unknown_file_is_blocked() {
    assert_blocked("simpledoc-invalid-schemaloc-https-badprefix.xml", "https");
}

#[test]
fn test_https_reference_not_in_registry_is_blocked() {
    assert_blocked("simpledoc-invalid-schemaloc-https-notfound.xml", "https");
}

#[test]
fn test_file_reference_is_blocked() {
    assert_blocked("simpledoc-invalid-schemaloc-file.xml", "file");
}

#[test]
fn test_relative_reference_expands_to_file_and_is_blocked() {
    assert_blocked("simpledoc-invalid-schemaloc-ambiguous-uri.xml", "file");
}

#[test]
fn test_bad_content_reports_unexpected_child() {
    let fixtures = TestFixtures::new();
    let err = parse_with(
        &fixtures.default_registry(),
        "simpledoc-invalid-no-schemaloc-bad-content.xml",
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaValidationViolation);
    assert!(err.to_string().contains("cvc-complex-type.2.4.a"), "{err}");
    assert_eq!(err.diagnostics()[0].line, Some(4));
}

#[test]
fn test_wrong_attribute_type_reports_datatype_rule() {
    let fixtures = TestFixtures::new();
    let err = parse_with(&fixtures.default_registry(), "simpledoc-invalid-bad-type.xml").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SchemaValidationViolation, "{err}");
    assert_ne!(err.kind(), ErrorKind::BlockedExternalReference);
    let message = err.to_string();
    assert!(message.contains("cvc-datatype-valid.1.2.1"), "{message}");
    assert!(message.contains("'id'"), "{message}");
    assert_eq!(err.diagnostics()[0].line, Some(4));
}

#[test]
fn test_no_registered_schemas_leaves_root_undeclared() {
    let err = parse_with(&SchemaRegistry::empty(), "simpledoc-valid-no-schemaloc.xml").unwrap_err();

    let message = err.to_string();
    assert!(message.contains("cvc-elt.1.a"), "{message}");
    assert!(message.contains("'items'"), "{message}");
}

#[test]
fn test_only_irrelevant_schema_leaves_root_undeclared() {
    let fixtures = TestFixtures::new();
    let registry = SchemaRegistry::new(vec![fixtures.irrelevant_schema()]);
    let err = parse_with(&registry, "simpledoc-valid-no-schemaloc.xml").unwrap_err();

    let message = err.to_string();
    assert!(message.contains("cvc-elt.1.a"), "{message}");
    assert!(message.contains("'items'"), "{message}");
}

#[test]
fn test_doctype_is_rejected() {
    let fixtures = TestFixtures::new();
    let err = parse_with(&fixtures.default_registry(), "simpledoc-invalid-doctype.xml").unwrap_err();

    assert!(matches!(err, ValidationError::DoctypeDisallowed { .. }), "{err}");
}

#[test]
fn test_registration_order_does_not_matter_for_distinct_schemas() {
    let fixtures = TestFixtures::new();
    let registry = SchemaRegistry::new(vec![fixtures.irrelevant_schema(), fixtures.simple_schema()]);

    assert!(parse_with(&registry, "simpledoc-valid-schemaloc-https.xml").is_ok());
}

#[test]
fn test_document_in_irrelevant_namespace_validates() {
    let fixtures = TestFixtures::new();
    let input = InputSource::from_bytes(
        r#"<unrelated xmlns="urn:example:irrelevant">text</unrelated>"#,
    );

    assert!(
        validate_document(&ReaderConfig::default(), &fixtures.default_registry(), &input).is_ok()
    );
}

#[test]
fn test_permissive_policy_skips_unknown_hint_and_uses_compiled_grammar() {
    let fixtures = TestFixtures::new();
    let config = ReaderConfig {
        access_external_schema: AccessPolicy::parse("https").unwrap(),
    };

    let ok = validate_document(
        &config,
        &fixtures.default_registry(),
        &fixtures.document("simpledoc-valid-no-schemaloc.xml"),
    );
    assert!(ok.is_ok());

    let notfound = validate_document(
        &config,
        &fixtures.default_registry(),
        &fixtures.document("simpledoc-invalid-schemaloc-https-notfound.xml"),
    );
    assert!(notfound.is_ok(), "{:?}", notfound);

    // Permitting https says nothing about file
    let file = validate_document(
        &config,
        &fixtures.default_registry(),
        &fixtures.document("simpledoc-invalid-schemaloc-file.xml"),
    );
    assert_eq!(file.unwrap_err().kind(), ErrorKind::BlockedExternalReference);
}

#[test]
fn test_trusted_schema_importing_untrusted_location_is_blocked() {
    let importer = TrustedResource::from_bytes(
        "https://example.com/schemas/importer.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:importer">
  <xs:import namespace="urn:elsewhere" schemaLocation="https://attacker.example/elsewhere.xsd"/>
</xs:schema>"#,
    );
    let result = SecureReaderFactory::default().build(&SchemaRegistry::new(vec![importer]));

    match result {
        Err(ValidationError::BlockedExternalReference { system_id, scheme, .. }) => {
            assert_eq!(system_id, "https://attacker.example/elsewhere.xsd");
            assert_eq!(scheme, "https");
        }
        Err(other) => panic!("expected BlockedExternalReference, got {}", other),
        Ok(_) => panic!("expected BlockedExternalReference, got a reader"),
    }
}

#[test]
fn test_trusted_schema_may_import_another_trusted_schema() {
    let fixtures = TestFixtures::new();
    let importer = TrustedResource::from_bytes(
        "https://example.com/schemas/importer.xsd",
        format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:irr="urn:example:irrelevant"
           targetNamespace="urn:importer" elementFormDefault="qualified">
  <xs:import namespace="urn:example:irrelevant" schemaLocation="{}"/>
  <xs:element name="wrapper">
    <xs:complexType>
      <xs:sequence>
        <xs:element ref="irr:unrelated"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
            IRRELEVANT_ID
        ),
    );
    let registry = SchemaRegistry::new(vec![importer, fixtures.irrelevant_schema()]);
    let input = InputSource::from_bytes(
        r#"<wrapper xmlns="urn:importer"><unrelated xmlns="urn:example:irrelevant">x</unrelated></wrapper>"#,
    );

    let result = validate_document(&ReaderConfig::default(), &registry, &input);
    assert!(result.is_ok(), "{:?}", result);
}

#[test]
fn test_malformed_trusted_schema_is_reported_at_build_time() {
    let broken = TrustedResource::from_bytes(SIMPLE_ID, "<xs:schema");
    let result = SecureReaderFactory::default().build(&SchemaRegistry::new(vec![broken]));

    match result {
        Err(ValidationError::MalformedTrustedSchema { canonical_id, .. }) => {
            assert_eq!(canonical_id, SIMPLE_ID)
        }
        Err(other) => panic!("expected MalformedTrustedSchema, got {}", other),
        Ok(_) => panic!("expected MalformedTrustedSchema, got a reader"),
    }
}

/// Resolver that records every request and never matches
struct RecordingResolver {
    seen: std::sync::Mutex<Vec<ResolutionRequest>>,
}

impl EntityResolver for RecordingResolver {
    fn resolve(&self, request: &ResolutionRequest) -> Resolution {
        self.seen.lock().unwrap().push(request.clone());
        Resolution::Unmatched
    }
}

#[test]
fn test_every_hint_reaches_the_resolver_first() {
    let fixtures = TestFixtures::new();
    let resolver = Arc::new(RecordingResolver {
        seen: std::sync::Mutex::new(Vec::new()),
    });
    let reader = SecureReaderFactory::default()
        .build_with_resolver(&SchemaRegistry::empty(), resolver.clone())
        .unwrap();

    let err = reader
        .parse(&fixtures.document("simpledoc-valid-schemaloc-https.xml"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BlockedExternalReference);

    let seen = resolver.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].system_id.as_deref(), Some(SIMPLE_ID));
}

#[test]
fn test_fresh_reader_per_document() {
    let fixtures = TestFixtures::new();
    let factory = SecureReaderFactory::default();
    let registry = fixtures.default_registry();

    for _ in 0..3 {
        let reader = factory.build(&registry).unwrap();
        reader
            .parse(&fixtures.document("simpledoc-valid-no-schemaloc.xml"))
            .unwrap();
    }
}

fn utf16le_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

fn utf16be_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

#[test]
fn test_utf16_document_validates() {
    let fixtures = TestFixtures::new();
    let text = r#"<?xml version="1.0" encoding="UTF-16"?>
<items>
  <item id="1">first</item>
  <item id="2">second</item>
</items>"#;

    for content in [utf16le_with_bom(text), utf16be_with_bom(text)] {
        let result = validate_document(
            &ReaderConfig::default(),
            &fixtures.default_registry(),
            &InputSource::from_bytes(content),
        );
        assert!(result.is_ok(), "{:?}", result);
    }
}

#[test]
fn test_utf16_document_content_is_still_validated() {
    let fixtures = TestFixtures::new();
    let text = r#"<?xml version="1.0" encoding="UTF-16"?>
<items>
  <item id="1">first</item>
  <entry>second</entry>
</items>"#;

    let err = validate_document(
        &ReaderConfig::default(),
        &fixtures.default_registry(),
        &InputSource::from_bytes(utf16le_with_bom(text)),
    )
    .unwrap_err();
    assert!(err.to_string().contains("cvc-complex-type.2.4.a"), "{err}");
    assert_eq!(err.diagnostics()[0].line, Some(4));
}

#[test]
fn test_utf16_document_with_unlisted_https_hint_is_blocked() {
    let fixtures = TestFixtures::new();
    let text = r#"<?xml version="1.0" encoding="UTF-16"?>
<items xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
       xsi:noNamespaceSchemaLocation="https://dependency-check.github.io/DependencyCheck/notfound.xsd">
  <item id="1">first</item>
</items>"#;

    let err = validate_document(
        &ReaderConfig::default(),
        &fixtures.default_registry(),
        &InputSource::from_bytes(utf16le_with_bom(text)),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BlockedExternalReference, "{err}");
    let message = err.to_string();
    assert!(message.contains("'https'"), "{message}");
    assert!(message.contains("accessExternalSchema"), "{message}");
}

#[test]
fn test_utf16_doctype_is_rejected() {
    let fixtures = TestFixtures::new();
    let text = r#"<?xml version="1.0" encoding="UTF-16"?>
<!DOCTYPE items [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<items><item id="1">&xxe;</item></items>"#;

    let err = validate_document(
        &ReaderConfig::default(),
        &fixtures.default_registry(),
        &InputSource::from_bytes(utf16be_with_bom(text)),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DoctypeDisallowed, "{err}");
}
