//! Generic XML element tree with exact source spans.
//!
//! Every [`Element`] keeps a handle to the text it was parsed from plus the
//! byte ranges of its outer and inner markup. That is what makes the
//! extension sequence lossless: re-emitting an element writes back the
//! bytes that arrived on the wire, not a re-serialization of the tree.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::ProtocolError;
use crate::ns;

// ---------------------------------------------------------------------------
// Names and attributes
// ---------------------------------------------------------------------------

/// A namespace-qualified element name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    /// Resolved namespace URI (empty when the element has none).
    pub namespace: String,
    /// Local part of the name, without prefix.
    pub local: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Returns `true` if this name is `local` in namespace `namespace`.
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace == namespace && self.local == local
    }
}

/// Clark notation: `{namespace}local`.
impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// An attribute as written in the source: lexical name, unescaped value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified attribute name as written (`id`, `xml:lang`, `xmlns:p`).
    pub name: String,
    /// Value with entity references resolved.
    pub value: String,
}

impl Attribute {
    /// Creates an attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data, unescaped. Adjacent text and CDATA are merged.
    Text(String),
}

// ---------------------------------------------------------------------------
// Namespace scope
// ---------------------------------------------------------------------------

/// In-scope namespace bindings.
///
/// The decoder seeds one of these from the stream header so that stanzas
/// which rely on the header's `xmlns` declarations resolve correctly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    default: Option<String>,
    prefixes: Vec<(String, String)>,
}

impl Namespaces {
    /// A scope whose default namespace is `uri`.
    pub fn with_default(uri: impl Into<String>) -> Self {
        Self {
            default: Some(uri.into()),
            prefixes: Vec::new(),
        }
    }

    /// The default (unprefixed) namespace, if one is bound.
    pub fn default_namespace(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Binds `prefix` to `uri`, shadowing any earlier binding.
    pub fn bind(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.push((prefix.into(), uri.into()));
    }

    /// Resolves a prefix (`None` = default namespace) to its URI.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            None => Some(self.default.as_deref().unwrap_or("")),
            Some("xml") => Some(ns::XML),
            Some(p) => self
                .prefixes
                .iter()
                .rev()
                .find(|(bound, _)| bound == p)
                .map(|(_, uri)| uri.as_str()),
        }
    }

    /// Applies the `xmlns` / `xmlns:p` declarations found in `attributes`.
    pub(crate) fn declare(&mut self, attributes: &[Attribute]) {
        for attr in attributes {
            if attr.name == "xmlns" {
                self.default = Some(attr.value.clone());
            } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                self.bind(prefix, attr.value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// A fully materialized XML element.
#[derive(Debug, Clone)]
pub struct Element {
    name: QualifiedName,
    prefix: Option<String>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    source: Arc<str>,
    span: Range<usize>,
    inner: Range<usize>,
}

impl Element {
    /// Parses a standalone fragment containing exactly one root element.
    ///
    /// Unprefixed names resolve to no namespace unless the fragment declares
    /// one. Use [`Element::parse_in`] to inherit a scope.
    pub fn parse(markup: &str) -> Result<Self, ProtocolError> {
        Self::parse_in(markup, &Namespaces::default())
    }

    /// Parses a fragment, resolving names against an inherited scope.
    pub fn parse_in(
        markup: &str,
        scope: &Namespaces,
    ) -> Result<Self, ProtocolError> {
        TreeBuilder::new(Arc::from(markup), scope).build()
    }

    /// The resolved element name.
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Shorthand for `self.name().local`.
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Shorthand for `self.name().namespace`.
    pub fn namespace(&self) -> &str {
        &self.name.namespace
    }

    /// The lexical prefix the element was written with, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by its lexical name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// All children, elements and text, in document order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// The first child element named `local` in `namespace`.
    pub fn find(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name.is(namespace, local))
    }

    /// Concatenated direct text content, unescaped.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// The exact outer markup as it appeared in the source.
    pub fn raw(&self) -> &str {
        &self.source[self.span.clone()]
    }

    /// The exact markup between the start and end tags.
    ///
    /// Empty for self-closing elements.
    pub fn inner(&self) -> &str {
        &self.source[self.inner.clone()]
    }

    /// Consumes the element, yielding its attributes and child elements.
    ///
    /// Text directly under the element is dropped.
    pub(crate) fn into_parts(self) -> (Vec<Attribute>, Vec<Element>) {
        let children = self
            .children
            .into_iter()
            .filter_map(|node| match node {
                Node::Element(el) => Some(el),
                Node::Text(_) => None,
            })
            .collect();
        (self.attributes, children)
    }
}

/// Two elements are equal when they have the same structure and the same
/// raw markup, regardless of which buffer they were parsed from.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.prefix == other.prefix
            && self.attributes == other.attributes
            && self.children == other.children
            && self.raw() == other.raw()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

// ---------------------------------------------------------------------------
// Tree builder
// ---------------------------------------------------------------------------

/// An element whose end tag has not been seen yet.
struct OpenElement {
    name: QualifiedName,
    prefix: Option<String>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    start: usize,
    inner_start: usize,
}

struct TreeBuilder {
    source: Arc<str>,
    scopes: Vec<Namespaces>,
    stack: Vec<OpenElement>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn new(source: Arc<str>, scope: &Namespaces) -> Self {
        Self {
            source,
            scopes: vec![scope.clone()],
            stack: Vec::new(),
            root: None,
        }
    }

    fn build(mut self) -> Result<Element, ProtocolError> {
        let source = Arc::clone(&self.source);
        let mut reader = Reader::from_str(&source);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = true;

        loop {
            let event = reader.read_event().map_err(malformed)?;
            // After any markup event the reader sits just past its `>`.
            let end = reader.buffer_position() as usize;
            match event {
                Event::Start(tag) => {
                    let start = tag_start(&source, end)?;
                    let open = self.open(&tag, start, end)?;
                    self.stack.push(open);
                }
                Event::Empty(tag) => {
                    let start = tag_start(&source, end)?;
                    let open = self.open(&tag, start, end)?;
                    self.scopes.pop();
                    let element = self.finish(open, end, end);
                    self.attach(element)?;
                }
                Event::End(_) => {
                    let close_start = tag_start(&source, end)?;
                    let open = self.stack.pop().ok_or_else(|| {
                        ProtocolError::Malformed("unexpected end tag".into())
                    })?;
                    self.scopes.pop();
                    let element = self.finish(open, close_start, end);
                    self.attach(element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(malformed)?;
                    self.push_text(&text)?;
                }
                Event::CData(cdata) => {
                    let text = std::str::from_utf8(&cdata).map_err(|e| {
                        ProtocolError::Malformed(format!("invalid UTF-8: {e}"))
                    })?;
                    self.push_text(text)?;
                }
                Event::Eof => break,
                // Comments, processing instructions, declarations.
                _ => {}
            }
        }

        if let Some(open) = self.stack.last() {
            return Err(ProtocolError::Malformed(format!(
                "element <{}> is never closed",
                open.name.local
            )));
        }
        self.root.ok_or_else(|| {
            ProtocolError::Malformed("no element in input".into())
        })
    }

    /// Resolves a start tag and pushes its namespace scope.
    fn open(
        &mut self,
        tag: &BytesStart<'_>,
        start: usize,
        inner_start: usize,
    ) -> Result<OpenElement, ProtocolError> {
        let attributes = read_attributes(tag)?;
        let mut scope = self.scopes.last().cloned().unwrap_or_default();
        scope.declare(&attributes);

        let qname = tag.name();
        let prefix = match qname.prefix() {
            Some(p) => Some(utf8(p.as_ref())?.to_string()),
            None => None,
        };
        let local = utf8(qname.local_name().as_ref())?.to_string();
        let namespace = scope
            .resolve(prefix.as_deref())
            .ok_or_else(|| {
                ProtocolError::Malformed(format!(
                    "unbound prefix `{}` on <{local}>",
                    prefix.as_deref().unwrap_or_default()
                ))
            })?
            .to_string();
        self.scopes.push(scope);

        Ok(OpenElement {
            name: QualifiedName { namespace, local },
            prefix,
            attributes,
            children: Vec::new(),
            start,
            inner_start,
        })
    }

    fn finish(&self, open: OpenElement, inner_end: usize, end: usize) -> Element {
        Element {
            name: open.name,
            prefix: open.prefix,
            attributes: open.attributes,
            children: open.children,
            source: Arc::clone(&self.source),
            span: open.start..end,
            inner: open.inner_start..inner_end,
        }
    }

    fn attach(&mut self, element: Element) -> Result<(), ProtocolError> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(Node::Element(element));
            return Ok(());
        }
        if self.root.is_some() {
            return Err(ProtocolError::Malformed(
                "more than one root element".into(),
            ));
        }
        self.root = Some(element);
        Ok(())
    }

    fn push_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let Some(parent) = self.stack.last_mut() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(ProtocolError::Malformed(
                "character data outside the root element".into(),
            ));
        };
        if let Some(Node::Text(last)) = parent.children.last_mut() {
            last.push_str(text);
        } else {
            parent.children.push(Node::Text(text.to_string()));
        }
        Ok(())
    }
}

/// Reads a tag's attributes in document order, unescaping values.
pub(crate) fn read_attributes(
    tag: &BytesStart<'_>,
) -> Result<Vec<Attribute>, ProtocolError> {
    let mut attributes = Vec::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(malformed)?;
        let name = utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        attributes.push(Attribute { name, value });
    }
    Ok(attributes)
}

/// Finds the `<` opening the tag that ends at `end`.
///
/// A tag contains exactly one `<`: attribute values may hold `>` but never
/// a raw `<`.
pub(crate) fn tag_start(source: &str, end: usize) -> Result<usize, ProtocolError> {
    source[..end]
        .rfind('<')
        .ok_or_else(|| ProtocolError::Malformed("tag without `<`".into()))
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(bytes)
        .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {e}")))
}

pub(crate) fn malformed(err: impl fmt::Display) -> ProtocolError {
    ProtocolError::Malformed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_raw_and_inner_markup() {
        let markup = r#"<x xmlns="urn:a" k='v'><y/>hi<z>1</z></x>"#;
        let el = Element::parse(markup).unwrap();

        assert_eq!(el.raw(), markup);
        assert_eq!(el.inner(), "<y/>hi<z>1</z>");
        assert_eq!(el.namespace(), "urn:a");
        assert_eq!(el.attr("k"), Some("v"));

        let kids: Vec<_> = el.child_elements().map(|c| c.raw()).collect();
        assert_eq!(kids, vec!["<y/>", "<z>1</z>"]);
        assert_eq!(el.text(), "hi");
    }

    #[test]
    fn test_parse_self_closing_has_empty_inner() {
        let el = Element::parse(r#"<error code="400"/>"#).unwrap();
        assert_eq!(el.raw(), r#"<error code="400"/>"#);
        assert_eq!(el.inner(), "");
    }

    #[test]
    fn test_parse_inherits_default_namespace() {
        let scope = Namespaces::with_default(ns::JABBER_CLIENT);
        let el = Element::parse_in("<body>x</body>", &scope).unwrap();
        assert!(el.name().is(ns::JABBER_CLIENT, "body"));
    }

    #[test]
    fn test_parse_resolves_prefixes_from_ancestors() {
        let el = Element::parse(
            "<a xmlns:p='urn:p'><p:b><c/></p:b></a>",
        )
        .unwrap();
        let b = el.child_elements().next().unwrap();
        assert!(b.name().is("urn:p", "b"));
        assert_eq!(b.prefix(), Some("p"));
        // Unprefixed child of a prefixed element: no default namespace.
        let c = b.child_elements().next().unwrap();
        assert!(c.name().is("", "c"));
    }

    #[test]
    fn test_parse_xml_prefix_is_predefined() {
        let el = Element::parse("<a><xml:b/></a>").unwrap();
        let b = el.child_elements().next().unwrap();
        assert_eq!(b.namespace(), ns::XML);
    }

    #[test]
    fn test_parse_unbound_prefix_is_malformed() {
        let err = Element::parse("<a><q:b/></a>").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_parse_mismatched_end_tag_is_malformed() {
        let err = Element::parse("<a><b></a></b>").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_parse_unclosed_element_is_malformed() {
        let err = Element::parse("<a><b/>").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_parse_unescapes_text_and_attributes() {
        let el =
            Element::parse(r#"<a t="&lt;1&gt;">x &amp; <![CDATA[<y>]]></a>"#)
                .unwrap();
        assert_eq!(el.attr("t"), Some("<1>"));
        assert_eq!(el.text(), "x & <y>");
        // Raw markup keeps the escapes.
        assert!(el.raw().contains("&amp;"));
    }

    #[test]
    fn test_attribute_value_may_contain_gt() {
        let el = Element::parse("<a><b v='x>y'/></a>").unwrap();
        let b = el.child_elements().next().unwrap();
        assert_eq!(b.raw(), "<b v='x>y'/>");
    }

    #[test]
    fn test_elements_from_different_sources_compare_by_markup() {
        let a = Element::parse("<r><k/></r>").unwrap();
        let b = Element::parse("<k/>").unwrap();
        assert_eq!(a.child_elements().next().unwrap(), &b);
    }

    #[test]
    fn test_qualified_name_display_uses_clark_notation() {
        assert_eq!(QualifiedName::new("urn:a", "b").to_string(), "{urn:a}b");
        assert_eq!(QualifiedName::new("", "b").to_string(), "b");
    }
}
