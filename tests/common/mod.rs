#![allow(dead_code)]

use std::path::PathBuf;

use xsd_guard::{InputSource, SchemaRegistry, TrustedResource};

pub const SIMPLE_ID: &str = "https://dependency-check.github.io/DependencyCheck/simple.xsd";
pub const IRRELEVANT_ID: &str = "https://dependency-check.github.io/DependencyCheck/irrelevant.xsd";

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn schema_validation_dir(&self) -> PathBuf {
        self.fixtures_dir.join("schema-validation")
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.schema_validation_dir().join(name)
    }

    pub fn simple_schema(&self) -> TrustedResource {
        TrustedResource::from_path(SIMPLE_ID, &self.file("simple.xsd")).unwrap()
    }

    pub fn irrelevant_schema(&self) -> TrustedResource {
        TrustedResource::from_path(IRRELEVANT_ID, &self.file("irrelevant.xsd")).unwrap()
    }

    /// simple.xsd and irrelevant.xsd, in that order
    pub fn default_registry(&self) -> SchemaRegistry {
        SchemaRegistry::new(vec![self.simple_schema(), self.irrelevant_schema()])
    }

    pub fn document(&self, name: &str) -> InputSource {
        InputSource::from_path(&self.file(name)).unwrap()
    }
}
