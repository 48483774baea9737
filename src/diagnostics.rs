//! Engine diagnostics
//!
//! libxml2 reports XML Schema validity failures with its own numeric codes. Each code in the
//! `XML_SCHEMAV_CVC_*` range corresponds to a validation rule of XML Schema Part 1, and
//! downstream consumers match on the rule identifier (`cvc-elt.1.a`, ...), so every captured
//! diagnostic is tagged with it. The engine's message text is kept verbatim.

use std::fmt;

use serde::Serialize;

/// `XML_FROM_PARSER`
pub const DOMAIN_PARSER: i32 = 1;
/// `XML_FROM_IO`
pub const DOMAIN_IO: i32 = 8;
/// `XML_FROM_SCHEMASP`
pub const DOMAIN_SCHEMAS_PARSER: i32 = 16;
/// `XML_FROM_SCHEMASV`
pub const DOMAIN_SCHEMAS_VALIDITY: i32 = 17;

/// `XML_SCHEMAV_ELEMENT_CONTENT`: one code for both unexpected and missing children.
const ELEMENT_CONTENT: i32 = 1871;

/// libxml2 `xmlParserErrors` validity codes and the rules they report on.
const VALIDITY_RULES: &[(i32, &str)] = &[
    (1824, "cvc-datatype-valid.1.2.1"),
    (1825, "cvc-datatype-valid.1.2.2"),
    (1826, "cvc-datatype-valid.1.2.3"),
    (1827, "cvc-type.3.1.1"),
    (1828, "cvc-type.3.1.2"),
    (1829, "cvc-facet-valid"),
    (1830, "cvc-length-valid"),
    (1831, "cvc-minLength-valid"),
    (1832, "cvc-maxLength-valid"),
    (1833, "cvc-minInclusive-valid"),
    (1834, "cvc-maxInclusive-valid"),
    (1835, "cvc-minExclusive-valid"),
    (1836, "cvc-maxExclusive-valid"),
    (1837, "cvc-totalDigits-valid"),
    (1838, "cvc-fractionDigits-valid"),
    (1839, "cvc-pattern-valid"),
    (1840, "cvc-enumeration-valid"),
    (1841, "cvc-complex-type.2.1"),
    (1842, "cvc-complex-type.2.2"),
    (1843, "cvc-complex-type.2.3"),
    (1844, "cvc-complex-type.2.4"),
    (1845, "cvc-elt.1.a"),
    (1846, "cvc-elt.2"),
    (1847, "cvc-elt.3.1"),
    (1848, "cvc-elt.3.2.1"),
    (1849, "cvc-elt.3.2.2"),
    (1850, "cvc-elt.4.1"),
    (1851, "cvc-elt.4.2"),
    (1852, "cvc-elt.4.3"),
    (1853, "cvc-elt.5.1.1"),
    (1854, "cvc-elt.5.1.2"),
    (1855, "cvc-elt.5.2.1"),
    (1856, "cvc-elt.5.2.2.1"),
    (1857, "cvc-elt.5.2.2.2.1"),
    (1858, "cvc-elt.5.2.2.2.2"),
    (1859, "cvc-elt.6"),
    (1860, "cvc-elt.7"),
    (1861, "cvc-attribute.1"),
    (1862, "cvc-attribute.2"),
    (1863, "cvc-attribute.3"),
    (1864, "cvc-attribute.4"),
    (1865, "cvc-complex-type.3.1"),
    (1866, "cvc-complex-type.3.2.1"),
    (1867, "cvc-complex-type.3.2.2"),
    (1868, "cvc-complex-type.4"),
    (1869, "cvc-complex-type.5.1"),
    (1870, "cvc-complex-type.5.2"),
    (1873, "cvc-complex-type.1"),
    (1874, "cvc-au"),
    (1875, "cvc-type.1"),
    (1876, "cvc-type.2"),
    (1877, "cvc-identity-constraint"),
    (1878, "cvc-wildcard"),
];

/// Severity of an engine diagnostic (`xmlErrorLevel`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Map an `xmlErrorLevel`; `XML_ERR_NONE` carries nothing worth keeping.
    pub fn from_level(level: i32) -> Option<Self> {
        match level {
            1 => Some(Severity::Warning),
            2 => Some(Severity::Error),
            3 => Some(Severity::Fatal),
            _ => None,
        }
    }
}

/// One structured error captured from libxml2
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// XML Schema validation rule identifier, when the code maps to one
    pub rule: Option<&'static str>,
    pub domain: i32,
    pub code: i32,
    pub severity: Severity,
    pub line: Option<u32>,
    /// System id of the resource being processed, when libxml2 knows it
    pub file: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(domain: i32, code: i32, severity: Severity, line: i32, message: &str) -> Self {
        let message = message.trim().to_string();
        let rule = if domain == DOMAIN_SCHEMAS_VALIDITY {
            validity_rule(code, &message)
        } else {
            None
        };

        Self {
            rule,
            domain,
            code,
            severity,
            line: u32::try_from(line).ok().filter(|l| *l > 0),
            file: None,
            message,
        }
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file.filter(|f| !f.is_empty());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = self.rule {
            write!(f, "{}: ", rule)?;
        }
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        f.write_str(&self.message)
    }
}

/// Rule identifier for a libxml2 schema validity code
pub fn validity_rule(code: i32, message: &str) -> Option<&'static str> {
    if code == ELEMENT_CONTENT {
        // 2.4.b is "content ended early", everything else is an unexpected child.
        return Some(if message.contains("Missing child element") {
            "cvc-complex-type.2.4.b"
        } else {
            "cvc-complex-type.2.4.a"
        });
    }

    VALIDITY_RULES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, rule)| *rule)
}
