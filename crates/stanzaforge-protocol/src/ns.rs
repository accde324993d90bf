//! Namespace URIs the core needs to recognize.

/// Client-to-server content namespace.
pub const JABBER_CLIENT: &str = "jabber:client";
/// Server-to-server content namespace.
pub const JABBER_SERVER: &str = "jabber:server";
/// Stream framing namespace (`<stream:stream>`, `<stream:error>`).
pub const STREAM: &str = "http://etherx.jabber.org/streams";
/// Stream error conditions.
pub const STREAM_ERRORS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
/// Stanza error conditions.
pub const STANZA_ERRORS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// The predefined `xml:` prefix.
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Returns `true` for the namespaces message/presence/iq live in.
pub fn is_content(uri: &str) -> bool {
    uri == JABBER_CLIENT || uri == JABBER_SERVER
}
