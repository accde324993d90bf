//! The stanza model: typed top-level units with an open extension tail.
//!
//! Each variant pulls a handful of well-known children into named fields.
//! Everything else lands in `extensions`, in document order and with its
//! raw markup intact, so content this crate knows nothing about (room
//! invitations, push payloads, vendor namespaces) survives a decode and
//! re-encode byte for byte.
//!
//! A well-known child is extracted at most once. If the wire repeats it
//! (two `<subject>`s, say), only the first fills the field; the rest fall
//! through to `extensions`.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::element::{Attribute, Element, QualifiedName};
use crate::{Jid, ProtocolError, ns};

// ---------------------------------------------------------------------------
// Common header
// ---------------------------------------------------------------------------

/// Root attributes shared by message, presence and iq.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StanzaHeader {
    /// Correlation token. Caller-assigned; uniqueness is not enforced here.
    pub id: Option<String>,
    /// Sender address.
    pub from: Option<Jid>,
    /// Recipient address.
    pub to: Option<Jid>,
    /// `xml:lang`.
    pub lang: Option<String>,
    /// Every other root attribute, including `xmlns` declarations, in
    /// document order.
    pub attributes: Vec<Attribute>,
}

impl StanzaHeader {
    /// Splits root attributes into header fields and the raw `type` value.
    fn from_attributes(attributes: Vec<Attribute>) -> (Self, Option<String>) {
        let mut header = Self::default();
        let mut kind = None;
        for attr in attributes {
            match attr.name.as_str() {
                "id" => header.id = Some(attr.value),
                "from" => header.from = Some(Jid::from(attr.value)),
                "to" => header.to = Some(Jid::from(attr.value)),
                "type" => kind = Some(attr.value),
                "xml:lang" => header.lang = Some(attr.value),
                _ => header.attributes.push(attr),
            }
        }
        (header, kind)
    }

    fn start_tag<'a>(&'a self, name: &'a str, kind: Option<&'a str>) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        if let Some(id) = &self.id {
            start.push_attribute(("id", id.as_str()));
        }
        if let Some(kind) = kind {
            start.push_attribute(("type", kind));
        }
        if let Some(from) = &self.from {
            start.push_attribute(("from", from.as_str()));
        }
        if let Some(to) = &self.to {
            start.push_attribute(("to", to.as_str()));
        }
        if let Some(lang) = &self.lang {
            start.push_attribute(("xml:lang", lang.as_str()));
        }
        for attr in &self.attributes {
            start.push_attribute((attr.name.as_str(), attr.value.as_str()));
        }
        start
    }
}

// ---------------------------------------------------------------------------
// Type enumerations
// ---------------------------------------------------------------------------

/// `type` of a message. Open-ended: unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Normal,
    Chat,
    Groupchat,
    Headline,
    Error,
    Other(String),
}

impl MessageType {
    /// The wire value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Normal => "normal",
            Self::Chat => "chat",
            Self::Groupchat => "groupchat",
            Self::Headline => "headline",
            Self::Error => "error",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        match value {
            "normal" => Self::Normal,
            "chat" => Self::Chat,
            "groupchat" => Self::Groupchat,
            "headline" => Self::Headline,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

/// `type` of a presence. An absent `type` means available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceType {
    Unavailable,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Probe,
    Error,
}

impl PresenceType {
    /// The wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Subscribe => "subscribe",
            Self::Subscribed => "subscribed",
            Self::Unsubscribe => "unsubscribe",
            Self::Unsubscribed => "unsubscribed",
            Self::Probe => "probe",
            Self::Error => "error",
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "unavailable" => Self::Unavailable,
            "subscribe" => Self::Subscribe,
            "subscribed" => Self::Subscribed,
            "unsubscribe" => Self::Unsubscribe,
            "unsubscribed" => Self::Unsubscribed,
            "probe" => Self::Probe,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

/// Availability sub-state carried in `<show>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Show {
    Away,
    Chat,
    Dnd,
    Xa,
}

impl Show {
    /// The wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Chat => "chat",
            Self::Dnd => "dnd",
            Self::Xa => "xa",
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "away" => Self::Away,
            "chat" => Self::Chat,
            "dnd" => Self::Dnd,
            "xa" => Self::Xa,
            _ => return None,
        })
    }
}

/// `type` of an info/query. Required on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

impl IqType {
    /// The wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }

    /// `true` for `result` and `error`, the two response types.
    pub fn is_response(self) -> bool {
        matches!(self, Self::Result | Self::Error)
    }

    fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "get" => Self::Get,
            "set" => Self::Set,
            "result" => Self::Result,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// A `<message/>` stanza.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub header: StanzaHeader,
    pub kind: Option<MessageType>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub thread: Option<String>,
    pub extensions: Vec<Element>,
}

impl Message {
    /// A `chat` message carrying `body`.
    pub fn chat(to: impl Into<Jid>, body: impl Into<String>) -> Self {
        Self {
            header: StanzaHeader {
                to: Some(to.into()),
                ..StanzaHeader::default()
            },
            kind: Some(MessageType::Chat),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    fn from_element(element: Element) -> Result<Self, ProtocolError> {
        let content_ns = element.namespace().to_string();
        let (attributes, children) = element.into_parts();
        let (header, kind) = StanzaHeader::from_attributes(attributes);
        let mut message = Self {
            header,
            kind: kind.as_deref().map(MessageType::from),
            ..Self::default()
        };

        for child in children {
            if child.namespace() == content_ns {
                let slot = match child.local_name() {
                    "subject" => Some(&mut message.subject),
                    "body" => Some(&mut message.body),
                    "thread" => Some(&mut message.thread),
                    _ => None,
                };
                if let Some(slot) = slot {
                    if slot.is_none() {
                        *slot = Some(child.text());
                        continue;
                    }
                }
            }
            message.extensions.push(child);
        }
        Ok(message)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ProtocolError> {
        let kind = self.kind.as_ref().map(MessageType::as_str);
        emit(writer, Event::Start(self.header.start_tag("message", kind)))?;
        write_text_child(writer, "subject", self.subject.as_deref())?;
        write_text_child(writer, "body", self.body.as_deref())?;
        write_text_child(writer, "thread", self.thread.as_deref())?;
        write_extensions(writer, &self.extensions)?;
        emit(writer, Event::End(BytesEnd::new("message")))
    }
}

/// A `<presence/>` stanza.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presence {
    pub header: StanzaHeader,
    pub kind: Option<PresenceType>,
    pub show: Option<Show>,
    pub status: Option<String>,
    pub priority: Option<i8>,
    pub extensions: Vec<Element>,
}

impl Presence {
    fn from_element(element: Element) -> Result<Self, ProtocolError> {
        let content_ns = element.namespace().to_string();
        let (attributes, children) = element.into_parts();
        let (header, kind) = StanzaHeader::from_attributes(attributes);
        let kind = match kind {
            Some(raw) => Some(PresenceType::from_wire(&raw).ok_or_else(|| {
                ProtocolError::field("presence", "type", &raw, "unknown presence type")
            })?),
            None => None,
        };
        let mut presence = Self {
            header,
            kind,
            ..Self::default()
        };

        for child in children {
            if child.namespace() == content_ns {
                match child.local_name() {
                    "show" if presence.show.is_none() => {
                        let text = child.text();
                        let show = Show::from_wire(text.trim()).ok_or_else(|| {
                            ProtocolError::field("presence", "show", &text, "unknown show value")
                        })?;
                        presence.show = Some(show);
                        continue;
                    }
                    "status" if presence.status.is_none() => {
                        presence.status = Some(child.text());
                        continue;
                    }
                    "priority" if presence.priority.is_none() => {
                        let text = child.text();
                        let priority = text.trim().parse::<i8>().map_err(|e| {
                            ProtocolError::field("presence", "priority", &text, e.to_string())
                        })?;
                        presence.priority = Some(priority);
                        continue;
                    }
                    _ => {}
                }
            }
            presence.extensions.push(child);
        }
        Ok(presence)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ProtocolError> {
        let kind = self.kind.map(PresenceType::as_str);
        emit(writer, Event::Start(self.header.start_tag("presence", kind)))?;
        write_text_child(writer, "show", self.show.map(Show::as_str))?;
        write_text_child(writer, "status", self.status.as_deref())?;
        let priority = self.priority.map(|p| p.to_string());
        write_text_child(writer, "priority", priority.as_deref())?;
        write_extensions(writer, &self.extensions)?;
        emit(writer, Event::End(BytesEnd::new("presence")))
    }
}

/// An `<iq/>` (info/query) stanza.
///
/// IQ has no well-known children: the query payload and any `<error/>`
/// live in `extensions`.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    pub header: StanzaHeader,
    pub kind: IqType,
    pub extensions: Vec<Element>,
}

impl Iq {
    /// An IQ of the given type with no id and no payload.
    pub fn new(kind: IqType) -> Self {
        Self {
            header: StanzaHeader::default(),
            kind,
            extensions: Vec::new(),
        }
    }

    /// Appends `payload` to the extension sequence.
    pub fn with_payload(mut self, payload: Element) -> Self {
        self.extensions.push(payload);
        self
    }

    /// The first child element, conventionally the query.
    pub fn payload(&self) -> Option<&Element> {
        self.extensions.first()
    }

    fn from_element(element: Element) -> Result<Self, ProtocolError> {
        let (attributes, children) = element.into_parts();
        let (header, kind) = StanzaHeader::from_attributes(attributes);
        let raw = kind.unwrap_or_default();
        let kind = IqType::from_wire(&raw).ok_or_else(|| {
            let reason = if raw.is_empty() { "missing" } else { "unknown iq type" };
            ProtocolError::field("iq", "type", &raw, reason)
        })?;
        Ok(Self {
            header,
            kind,
            extensions: children,
        })
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ProtocolError> {
        let start = self.header.start_tag("iq", Some(self.kind.as_str()));
        emit(writer, Event::Start(start))?;
        write_extensions(writer, &self.extensions)?;
        emit(writer, Event::End(BytesEnd::new("iq")))
    }
}

/// A stream-level `<stream:error/>`. Always followed by stream closure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamError {
    /// Prefix the element was written with (usually `stream`).
    pub prefix: Option<String>,
    /// Defined condition, e.g. `conflict`, `host-unknown`.
    pub condition: Option<String>,
    /// Human-readable `<text/>`.
    pub text: Option<String>,
    pub extensions: Vec<Element>,
}

impl StreamError {
    fn from_element(element: Element) -> Result<Self, ProtocolError> {
        let prefix = element.prefix().map(str::to_string);
        let (_, children) = element.into_parts();
        let mut error = Self {
            prefix,
            ..Self::default()
        };
        for child in children {
            if child.namespace() == ns::STREAM_ERRORS {
                if child.local_name() == "text" {
                    if error.text.is_none() {
                        error.text = Some(child.text());
                        continue;
                    }
                } else if error.condition.is_none() {
                    error.condition = Some(child.local_name().to_string());
                    continue;
                }
            }
            error.extensions.push(child);
        }
        Ok(error)
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), ProtocolError> {
        let name = format!("{}:error", self.prefix.as_deref().unwrap_or("stream"));
        emit(writer, Event::Start(BytesStart::new(name.as_str())))?;
        if let Some(condition) = &self.condition {
            let start = BytesStart::new(condition.as_str())
                .with_attributes([("xmlns", ns::STREAM_ERRORS)]);
            emit(writer, Event::Empty(start))?;
        }
        if let Some(text) = &self.text {
            let start = BytesStart::new("text").with_attributes([("xmlns", ns::STREAM_ERRORS)]);
            emit(writer, Event::Start(start))?;
            emit(writer, Event::Text(BytesText::new(text)))?;
            emit(writer, Event::End(BytesEnd::new("text")))?;
        }
        write_extensions(writer, &self.extensions)?;
        emit(writer, Event::End(BytesEnd::new(name.as_str())))
    }
}

// ---------------------------------------------------------------------------
// Stanza
// ---------------------------------------------------------------------------

/// One top-level protocol unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Stanza {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
    StreamError(StreamError),
}

impl Stanza {
    /// Returns `true` if `name` maps to a stanza variant.
    pub fn recognizes(name: &QualifiedName) -> bool {
        (ns::is_content(&name.namespace)
            && matches!(name.local.as_str(), "message" | "presence" | "iq"))
            || name.is(ns::STREAM, "error")
    }

    /// Classifies a parsed element.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownElement`] if the root is not a stanza.
    /// - [`ProtocolError::Field`] if a recognized value does not parse.
    pub fn from_element(element: Element) -> Result<Self, ProtocolError> {
        let name = element.name();
        if ns::is_content(&name.namespace) {
            match name.local.as_str() {
                "message" => return Message::from_element(element).map(Self::Message),
                "presence" => return Presence::from_element(element).map(Self::Presence),
                "iq" => return Iq::from_element(element).map(Self::Iq),
                _ => {}
            }
        } else if name.is(ns::STREAM, "error") {
            return StreamError::from_element(element).map(Self::StreamError);
        }
        Err(ProtocolError::UnknownElement(element.name().to_string()))
    }

    /// The root element's local name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Presence(_) => "presence",
            Self::Iq(_) => "iq",
            Self::StreamError(_) => "error",
        }
    }

    /// The common header. Stream errors have none.
    pub fn header(&self) -> Option<&StanzaHeader> {
        match self {
            Self::Message(m) => Some(&m.header),
            Self::Presence(p) => Some(&p.header),
            Self::Iq(iq) => Some(&iq.header),
            Self::StreamError(_) => None,
        }
    }

    /// Mutable access to the common header.
    pub fn header_mut(&mut self) -> Option<&mut StanzaHeader> {
        match self {
            Self::Message(m) => Some(&mut m.header),
            Self::Presence(p) => Some(&mut p.header),
            Self::Iq(iq) => Some(&mut iq.header),
            Self::StreamError(_) => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.header().and_then(|h| h.id.as_deref())
    }

    /// The `from` address.
    pub fn sender(&self) -> Option<&Jid> {
        self.header().and_then(|h| h.from.as_ref())
    }

    /// The `to` address.
    pub fn recipient(&self) -> Option<&Jid> {
        self.header().and_then(|h| h.to.as_ref())
    }

    /// The extension sequence.
    pub fn extensions(&self) -> &[Element] {
        match self {
            Self::Message(m) => &m.extensions,
            Self::Presence(p) => &p.extensions,
            Self::Iq(iq) => &iq.extensions,
            Self::StreamError(e) => &e.extensions,
        }
    }

    /// Renders the stanza as XML.
    ///
    /// Named sub-parts come first, then each extension's raw markup
    /// verbatim. The root carries no `xmlns` of its own unless one was
    /// decoded onto it; it inherits the stream's content namespace.
    pub fn to_xml(&self) -> Result<String, ProtocolError> {
        let mut writer = Writer::new(Vec::new());
        match self {
            Self::Message(m) => m.write(&mut writer)?,
            Self::Presence(p) => p.write(&mut writer)?,
            Self::Iq(iq) => iq.write(&mut writer)?,
            Self::StreamError(e) => e.write(&mut writer)?,
        }
        String::from_utf8(writer.into_inner()).map_err(encode)
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<Presence> for Stanza {
    fn from(presence: Presence) -> Self {
        Self::Presence(presence)
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Self::Iq(iq)
    }
}

impl From<StreamError> for Stanza {
    fn from(error: StreamError) -> Self {
        Self::StreamError(error)
    }
}

// ---------------------------------------------------------------------------
// Writing helpers
// ---------------------------------------------------------------------------

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ProtocolError> {
    writer.write_event(event).map_err(encode)
}

fn write_text_child(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: Option<&str>,
) -> Result<(), ProtocolError> {
    let Some(value) = value else {
        return Ok(());
    };
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

/// Writes each extension's source markup unchanged.
fn write_extensions(
    writer: &mut Writer<Vec<u8>>,
    extensions: &[Element],
) -> Result<(), ProtocolError> {
    for extension in extensions {
        emit(writer, Event::Text(BytesText::from_escaped(extension.raw())))?;
    }
    Ok(())
}

fn encode(err: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Encode(err.to_string())
}
