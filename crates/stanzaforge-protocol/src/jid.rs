//! Addressing identities.
//!
//! Addresses look like `local@domain/resource`. The core treats them as
//! opaque strings: the only structure it relies on is the `/` separating
//! the bare identity from the resource.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Jid
// ---------------------------------------------------------------------------

/// A full address, possibly carrying a `/resource` suffix.
///
/// Newtype over `String` so an address can't be confused with an arbitrary
/// attribute value. `#[serde(transparent)]` keeps the JSON form a plain
/// string: `Jid::from("a@x/r")` serializes as `"a@x/r"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Wraps an address without validating it.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the address exactly as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the bare identity: everything before the first `/`.
    pub fn bare(&self) -> BareJid {
        BareJid::new(self.0.as_str())
    }

    /// Returns the resource part (after the first `/`), if any.
    pub fn resource(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, resource)| resource)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for Jid {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

// ---------------------------------------------------------------------------
// BareJid
// ---------------------------------------------------------------------------

/// An address with any `/resource` suffix removed.
///
/// This is the key the session hub uses: `a@x/res1` and `a@x/res2` both
/// collapse to `a@x`. Construction always strips the resource, so a
/// `BareJid` can never carry one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BareJid(String);

impl BareJid {
    /// Builds a bare identity from any address, dropping the resource.
    pub fn new(addr: &str) -> Self {
        let bare = match addr.split_once('/') {
            Some((bare, _)) => bare,
            None => addr,
        };
        Self(bare.to_string())
    }

    /// Returns the bare identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BareJid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Jid> for BareJid {
    fn from(jid: &Jid) -> Self {
        jid.bare()
    }
}

impl From<&str> for BareJid {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for BareJid {
    fn from(addr: String) -> Self {
        Self::new(&addr)
    }
}

impl From<BareJid> for String {
    fn from(bare: BareJid) -> Self {
        bare.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_strips_resource() {
        let jid = Jid::from("a@x/res1");
        assert_eq!(jid.bare().as_str(), "a@x");
        assert_eq!(jid.resource(), Some("res1"));
    }

    #[test]
    fn test_bare_without_resource_is_identity() {
        let jid = Jid::from("a@x");
        assert_eq!(jid.bare().as_str(), "a@x");
        assert_eq!(jid.resource(), None);
    }

    #[test]
    fn test_bare_splits_on_first_slash_only() {
        // Resources may themselves contain '/'.
        let jid = Jid::from("room@muc.x/nick/with/slashes");
        assert_eq!(jid.bare().as_str(), "room@muc.x");
        assert_eq!(jid.resource(), Some("nick/with/slashes"));
    }

    #[test]
    fn test_bare_jids_from_different_resources_are_equal() {
        let a = Jid::from("a@x/res1").bare();
        let b = Jid::from("a@x/res2").bare();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bare_jid_deserialize_strips_resource() {
        let bare: BareJid = serde_json::from_str("\"a@x/phone\"").unwrap();
        assert_eq!(bare.as_str(), "a@x");
        assert_eq!(serde_json::to_string(&bare).unwrap(), "\"a@x\"");
    }

    #[test]
    fn test_jid_serializes_as_plain_string() {
        let jid = Jid::from("u@h/r");
        assert_eq!(serde_json::to_string(&jid).unwrap(), "\"u@h/r\"");
    }
}
