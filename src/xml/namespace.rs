use std::collections::HashMap;

/// Namespace URI of ATOM (RFC 4287).
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Namespace URI of XHTML, used inside `type="xhtml"` text constructs.
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// The `xml:` prefix is bound to this URI in every document.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefix→URI bindings in effect at one point of a document.
///
/// The default namespace is stored under the empty prefix. An empty URI in a
/// declaration (`xmlns=""`) removes the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMap {
    bindings: HashMap<String, String>,
}

impl Default for NamespaceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceMap {
    pub fn new() -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("xml".to_string(), XML_NS.to_string());
        Self { bindings }
    }

    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        if uri.is_empty() {
            self.bindings.remove(&prefix);
        } else {
            self.bindings.insert(prefix, uri);
        }
    }

    /// URI bound to `prefix` (`""` for the default namespace).
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    /// Splits `prefix:local` and resolves the prefix. Unprefixed names take the
    /// default namespace.
    pub fn resolve_tag<'t>(&self, tag: &'t str) -> (Option<&str>, &'t str) {
        match tag.split_once(':') {
            Some((prefix, local)) => (self.resolve(prefix), local),
            None => (self.resolve(""), tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_prefix_always_bound() {
        let map = NamespaceMap::new();
        assert_eq!(map.resolve("xml"), Some(XML_NS));
        assert_eq!(map.resolve(""), None);
    }

    #[test]
    fn test_resolve_tag_prefixed_and_default() {
        let mut map = NamespaceMap::new();
        map.declare("", ATOM_NS);
        map.declare("x", XHTML_NS);

        assert_eq!(map.resolve_tag("entry"), (Some(ATOM_NS), "entry"));
        assert_eq!(map.resolve_tag("x:div"), (Some(XHTML_NS), "div"));
        assert_eq!(map.resolve_tag("y:div"), (None, "div"));
    }

    #[test]
    fn test_empty_uri_undeclares() {
        let mut map = NamespaceMap::new();
        map.declare("", ATOM_NS);
        map.declare("", "");
        assert_eq!(map.resolve(""), None);
    }
}
