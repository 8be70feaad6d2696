//! XML element abstraction consumed by the namespace cache.
//!
//! The patch engine owns real XML parsing; the cache only needs the
//! serialized form of an element and its prefix-to-URI map. [`XmlDocument`]
//! covers the common case of a document held as text, reading the namespace
//! declarations from the root start tag.

use std::borrow::Cow;
use std::collections::BTreeMap;

/// Prefix to namespace URI mapping, ordered by prefix.
pub type Namespaces = BTreeMap<String, String>;

/// What the namespace cache needs from an XML element.
pub trait XmlElement {
    /// Serialized markup of the element.
    fn to_xml_string(&self) -> Cow<'_, str>;

    /// Namespace declarations in scope, `None` being the default namespace.
    fn nsmap(&self) -> Vec<(Option<String>, String)>;
}

// == XML Document ==
/// An XML document kept as its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    source: String,
}

impl XmlDocument {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Attributes of the root element's start tag, in document order.
    fn root_attributes(&self) -> Vec<(String, String)> {
        match root_start_tag(&self.source) {
            Some(tag) => parse_attributes(tag),
            None => Vec::new(),
        }
    }
}

impl XmlElement for XmlDocument {
    fn to_xml_string(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.source)
    }

    fn nsmap(&self) -> Vec<(Option<String>, String)> {
        self.root_attributes()
            .into_iter()
            .filter_map(|(name, value)| {
                if name == "xmlns" {
                    Some((None, value))
                } else {
                    name.strip_prefix("xmlns:")
                        .map(|prefix| (Some(prefix.to_string()), value))
                }
            })
            .collect()
    }
}

/// Returns the inside of the first element start tag, skipping the XML
/// declaration, processing instructions, comments and DOCTYPE.
fn root_start_tag(source: &str) -> Option<&str> {
    let mut rest = source;
    loop {
        let open = rest.find('<')?;
        rest = &rest[open..];
        if rest.starts_with("<?") {
            rest = &rest[rest.find("?>")? + 2..];
        } else if rest.starts_with("<!--") {
            rest = &rest[rest.find("-->")? + 3..];
        } else if rest.starts_with("<!") {
            rest = &rest[rest.find('>')? + 1..];
        } else {
            let end = tag_end(rest)?;
            return Some(rest[1..end].trim_end_matches('/'));
        }
    }
}

/// Index of the `>` closing a tag that starts at `tag[0]`, ignoring any `>`
/// inside quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    // Skip the element name
    let mut rest = tag
        .find(char::is_whitespace)
        .map(|i| &tag[i..])
        .unwrap_or("");

    loop {
        rest = rest.trim_start();
        let Some(eq) = rest.find('=') else { break };
        let name = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();

        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(close) = rest[1..].find(quote) else { break };
        attributes.push((name, rest[1..close + 1].to_string()));
        rest = &rest[close + 2..];
    }
    attributes
}
