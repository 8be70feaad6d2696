//! XPath compilation.
//!
//! [`XPathCompiler`] is the seam through which the XPath cache obtains
//! compiled queries. [`PathCompiler`] handles the location-path subset used
//! to address OOXML parts: `/` and `//` separators, explicit axes,
//! `prefix:local` and wildcard name tests, `@attr`, `.`, `..`, `text()`,
//! `node()`, bracketed predicates and top-level `|` unions. Predicates are
//! kept verbatim for the evaluating engine.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::xml::Namespaces;

/// Produces compiled queries for the XPath cache.
pub trait XPathCompiler: Send + Sync {
    fn compile(&self, expression: &str, namespaces: &Namespaces) -> Result<CompiledXPath>;
}

/// Default compiler backed by [`CompiledXPath::compile`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PathCompiler;

impl XPathCompiler for PathCompiler {
    fn compile(&self, expression: &str, namespaces: &Namespaces) -> Result<CompiledXPath> {
        CompiledXPath::compile(expression, namespaces)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    SelfNode,
    Parent,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "attribute" => Axis::Attribute,
            "self" => Axis::SelfNode,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Qualified name with its prefix resolved to a namespace URI
    Name {
        namespace: Option<String>,
        local: String,
    },
    /// `*` or `prefix:*`
    Wildcard { namespace: Option<String> },
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

// == Compiled XPath ==
/// A parsed XPath with namespace prefixes resolved.
///
/// Serializes as its source expression and namespace bindings, and is
/// recompiled when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "XPathSource", try_from = "XPathSource")]
pub struct CompiledXPath {
    expression: String,
    namespaces: Namespaces,
    paths: Vec<LocationPath>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct XPathSource {
    expression: String,
    namespaces: Namespaces,
}

impl From<CompiledXPath> for XPathSource {
    fn from(compiled: CompiledXPath) -> Self {
        Self {
            expression: compiled.expression,
            namespaces: compiled.namespaces,
        }
    }
}

impl TryFrom<XPathSource> for CompiledXPath {
    type Error = CacheError;

    fn try_from(source: XPathSource) -> Result<Self> {
        CompiledXPath::compile(&source.expression, &source.namespaces)
    }
}

impl CompiledXPath {
    /// Parses `expression`, resolving prefixes against `namespaces`.
    pub fn compile(expression: &str, namespaces: &Namespaces) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(CacheError::Compile("empty expression".to_string()));
        }

        let paths = split_top_level(trimmed, '|')?
            .into_iter()
            .map(|branch| compile_path(branch.trim(), namespaces))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            expression: expression.to_string(),
            namespaces: namespaces.clone(),
            paths,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Union branches; a plain path has exactly one.
    pub fn paths(&self) -> &[LocationPath] {
        &self.paths
    }
}

/// Splits on `separator` outside brackets, parentheses and string literals.
fn split_top_level(input: &str, separator: char) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '(') => depth += 1,
            (None, ']') | (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Err(CacheError::Compile(format!("unbalanced '{}' in {}", c, input)));
                }
            }
            (None, c) if c == separator && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(CacheError::Compile(format!("unterminated string literal in {}", input)));
    }
    if depth != 0 {
        return Err(CacheError::Compile(format!("unbalanced brackets in {}", input)));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn compile_path(path: &str, namespaces: &Namespaces) -> Result<LocationPath> {
    if path.is_empty() {
        return Err(CacheError::Compile("empty union branch".to_string()));
    }

    let absolute = path.starts_with('/');
    let raw_steps = split_top_level(path, '/')?;

    // An absolute path yields a leading empty segment; `//` yields an empty
    // segment that marks the following step as descendant-or-self.
    let mut segments = raw_steps.into_iter().peekable();
    if absolute {
        segments.next();
    }
    if absolute && path == "/" {
        return Ok(LocationPath {
            absolute,
            steps: Vec::new(),
        });
    }

    let mut steps = Vec::new();
    let mut descendant = false;
    while let Some(segment) = segments.next() {
        let segment = segment.trim();
        if segment.is_empty() {
            if descendant || segments.peek().is_none() {
                return Err(CacheError::Compile(format!("empty step in {}", path)));
            }
            descendant = true;
            continue;
        }
        let mut step = compile_step(segment, namespaces)?;
        if descendant && step.axis == Axis::Child {
            step.axis = Axis::DescendantOrSelf;
        }
        descendant = false;
        steps.push(step);
    }

    if steps.is_empty() {
        return Err(CacheError::Compile(format!("no steps in {}", path)));
    }
    Ok(LocationPath { absolute, steps })
}

fn compile_step(segment: &str, namespaces: &Namespaces) -> Result<Step> {
    let (head, predicates) = split_predicates(segment)?;

    let (axis, test) = match head {
        "." => (Axis::SelfNode, NodeTest::Node),
        ".." => (Axis::Parent, NodeTest::Node),
        _ => {
            if let Some(attr) = head.strip_prefix('@') {
                (Axis::Attribute, compile_name_test(attr, namespaces)?)
            } else if let Some((axis_name, rest)) = head.split_once("::") {
                let axis = Axis::from_name(axis_name.trim()).ok_or_else(|| {
                    CacheError::Compile(format!("unknown axis '{}'", axis_name))
                })?;
                (axis, compile_name_test(rest.trim(), namespaces)?)
            } else {
                (Axis::Child, compile_name_test(head, namespaces)?)
            }
        }
    };

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

/// Separates `name[pred1][pred2]` into the name and predicate bodies.
fn split_predicates(segment: &str) -> Result<(&str, Vec<String>)> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, Vec::new()));
    };
    let head = segment[..open].trim();
    let mut predicates = Vec::new();
    let mut rest = &segment[open..];

    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(CacheError::Compile(format!(
                "unexpected '{}' after predicate in {}",
                rest, segment
            )));
        }
        let close = matching_bracket(rest).ok_or_else(|| {
            CacheError::Compile(format!("unbalanced predicate in {}", segment))
        })?;
        let body = rest[1..close].trim();
        if body.is_empty() {
            return Err(CacheError::Compile(format!("empty predicate in {}", segment)));
        }
        predicates.push(body.to_string());
        rest = rest[close + 1..].trim_start();
    }

    Ok((head, predicates))
}

/// Index of the `]` matching the `[` at position 0.
fn matching_bracket(input: &str) -> Option<usize> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn compile_name_test(name: &str, namespaces: &Namespaces) -> Result<NodeTest> {
    match name {
        "text()" => return Ok(NodeTest::Text),
        "node()" => return Ok(NodeTest::Node),
        "*" => return Ok(NodeTest::Wildcard { namespace: None }),
        _ => {}
    }

    match name.split_once(':') {
        Some((prefix, local)) => {
            let uri = namespaces.get(prefix).ok_or_else(|| {
                CacheError::Compile(format!("undefined namespace prefix '{}'", prefix))
            })?;
            if local == "*" {
                return Ok(NodeTest::Wildcard {
                    namespace: Some(uri.clone()),
                });
            }
            validate_ncname(local)?;
            Ok(NodeTest::Name {
                namespace: Some(uri.clone()),
                local: local.to_string(),
            })
        }
        None => {
            validate_ncname(name)?;
            Ok(NodeTest::Name {
                namespace: None,
                local: name.to_string(),
            })
        }
    }
}

fn validate_ncname(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(CacheError::Compile(format!("invalid name '{}'", name)))
    }
}
