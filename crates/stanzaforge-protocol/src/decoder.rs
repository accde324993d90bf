//! Pull-based decoding of an inbound XML stream.
//!
//! [`StreamDecoder`] reads bytes from a [`Connection`], buffers them until
//! a complete top-level element is available, and hands back one
//! [`Frame`] per call to [`StreamDecoder::next`]. The outer
//! `<stream:stream>` open tag is consumed as a [`StreamHeader`] and never
//! surfaces as a frame; its closing tag ends the stream. A header arriving
//! mid-stream (a restart after TLS or authentication) replaces the first.
//!
//! # States
//!
//! ```text
//!            complete element         recv() = None (nothing pending)
//!   Idle ───────────────────▶ Idle ───────────────────────────────▶ Ended
//!    │  partial bytes buffered  ▲          closing stream tag ─────▶ Ended
//!    ▼                          │
//!  InElement ───────────────────┘
//!    │ malformed input / recv() = None / transport error
//!    ▼
//!  Closed  (every later next() returns StreamClosed)
//! ```

use std::sync::Arc;

use futures_util::Stream;
use quick_xml::Reader;
use quick_xml::errors::{Error as XmlError, SyntaxError};
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use stanzaforge_transport::{Connection, TransportError};

use crate::element::{malformed, read_attributes, utf8};
use crate::{Element, Jid, Namespaces, ProtocolError, Stanza, ns};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with a top-level element that is not a stanza.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownElementPolicy {
    /// Yield it as [`Frame::Raw`].
    #[default]
    Raw,
    /// Drop it and keep reading.
    Skip,
    /// Return [`ProtocolError::UnknownElement`]. The stream stays usable.
    Reject,
}

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Handling of non-stanza top-level elements.
    pub unknown_elements: UnknownElementPolicy,
    /// Namespace for unprefixed names when no stream header declares one.
    pub default_namespace: String,
    /// Upper bound on bytes buffered for a single incomplete element.
    pub max_stanza_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            unknown_elements: UnknownElementPolicy::Raw,
            default_namespace: ns::JABBER_CLIENT.to_string(),
            max_stanza_bytes: 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Frames and header
// ---------------------------------------------------------------------------

/// One decoded top-level element.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A message, presence, iq, or stream error.
    Stanza(Stanza),
    /// Anything else, kept as an element tree.
    Raw(Element),
}

impl Frame {
    /// Returns the stanza, or `None` for a raw element.
    pub fn into_stanza(self) -> Option<Stanza> {
        match self {
            Self::Stanza(stanza) => Some(stanza),
            Self::Raw(_) => None,
        }
    }
}

/// Attributes of the `<stream:stream>` open tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    pub id: Option<String>,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub version: Option<String>,
    pub lang: Option<String>,
    /// Qualified tag name as written, e.g. `stream:stream`.
    tag: String,
}

impl StreamHeader {
    /// The open tag's name as written in the stream.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

// ---------------------------------------------------------------------------
// StreamDecoder
// ---------------------------------------------------------------------------

/// Where the decoder is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Between elements.
    Idle,
    /// Part of an element is buffered.
    InElement,
    /// The peer ended the stream cleanly.
    Ended,
    /// A fatal error occurred.
    Closed,
}

/// Result of scanning the buffer for the next unit of work.
enum Scan {
    Header {
        header: StreamHeader,
        scope: Namespaces,
        end: usize,
    },
    Element {
        start: usize,
        end: usize,
    },
    Close {
        end: usize,
    },
    /// No complete unit yet. `consumed` leading bytes were skippable.
    NeedMore {
        consumed: usize,
    },
}

/// Scan position carried across reads of an incomplete element.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    /// End of the last complete event in `buf`.
    offset: usize,
    depth: usize,
    element_start: usize,
}

impl Cursor {
    /// Shifts the cursor after `n` leading bytes left the buffer.
    fn drained(self, n: usize) -> Self {
        Self {
            offset: self.offset - n,
            depth: self.depth,
            element_start: self.element_start.saturating_sub(n),
        }
    }
}

/// Decodes frames from a connection, one top-level element at a time.
pub struct StreamDecoder<C> {
    conn: Arc<C>,
    buf: Vec<u8>,
    cursor: Cursor,
    state: DecoderState,
    header: Option<StreamHeader>,
    scope: Namespaces,
    config: DecoderConfig,
}

impl<C> StreamDecoder<C>
where
    C: Connection<Error = TransportError>,
{
    /// Creates a decoder with the default configuration.
    pub fn new(conn: Arc<C>) -> Self {
        Self::with_config(conn, DecoderConfig::default())
    }

    /// Creates a decoder with the given configuration.
    pub fn with_config(conn: Arc<C>, config: DecoderConfig) -> Self {
        Self {
            conn,
            buf: Vec::new(),
            cursor: Cursor::default(),
            state: DecoderState::Idle,
            header: None,
            scope: Namespaces::with_default(config.default_namespace.clone()),
            config,
        }
    }

    /// Current position in the stream.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The most recent stream header, once one has been read.
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// The connection this decoder reads from.
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// Returns the next frame.
    ///
    /// `Ok(None)` means the stream ended cleanly, either because the peer
    /// closed the byte stream between elements or sent the closing stream
    /// tag. Fatal errors (see [`ProtocolError::is_fatal`]) close the
    /// decoder; later calls return [`ProtocolError::StreamClosed`].
    pub async fn next(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            match self.state {
                DecoderState::Closed => return Err(ProtocolError::StreamClosed),
                DecoderState::Ended => return Ok(None),
                DecoderState::Idle | DecoderState::InElement => {}
            }

            let scan = match self.scan() {
                Ok(scan) => scan,
                Err(err) => return Err(self.fail(err)),
            };

            match scan {
                Scan::Header { header, scope, end } => {
                    self.buf.drain(..end);
                    self.cursor = Cursor::default();
                    tracing::debug!(
                        id = ?header.id,
                        from = ?header.from,
                        "stream header received"
                    );
                    self.scope = scope;
                    self.header = Some(header);
                    self.state = DecoderState::Idle;
                }
                Scan::Element { start, end } => {
                    let raw: Vec<u8> = self.buf.drain(..end).skip(start).collect();
                    self.cursor = Cursor::default();
                    self.state = DecoderState::Idle;
                    match self.decode(&raw) {
                        Ok(Some(frame)) => return Ok(Some(frame)),
                        Ok(None) => continue,
                        Err(err) if err.is_fatal() => return Err(self.fail(err)),
                        Err(err) => return Err(err),
                    }
                }
                Scan::Close { end } => {
                    self.buf.drain(..end);
                    self.cursor = Cursor::default();
                    self.state = DecoderState::Ended;
                    tracing::debug!(conn = %self.conn.id(), "stream closed by peer");
                    return Ok(None);
                }
                Scan::NeedMore { consumed } => {
                    self.buf.drain(..consumed);
                    self.cursor = self.cursor.drained(consumed);
                    let pending = self.cursor.depth > 0
                        || self.buf[self.cursor.offset..]
                            .iter()
                            .any(|b| !b.is_ascii_whitespace());
                    self.state = if pending {
                        DecoderState::InElement
                    } else {
                        DecoderState::Idle
                    };

                    if self.buf.len() > self.config.max_stanza_bytes {
                        let err = ProtocolError::Malformed(format!(
                            "element exceeds {} bytes",
                            self.config.max_stanza_bytes
                        ));
                        return Err(self.fail(err));
                    }

                    match self.conn.recv().await {
                        Ok(Some(chunk)) => self.buf.extend_from_slice(&chunk),
                        Ok(None) if pending => {
                            let err = ProtocolError::Malformed(
                                "stream ended inside an element".into(),
                            );
                            return Err(self.fail(err));
                        }
                        Ok(None) => {
                            self.state = DecoderState::Ended;
                            tracing::debug!(conn = %self.conn.id(), "end of input");
                            return Ok(None);
                        }
                        Err(err) => return Err(self.fail(err.into())),
                    }
                }
            }
        }
    }

    /// Turns the decoder into a stream of frames.
    ///
    /// The stream ends after a clean end of input or after yielding a
    /// fatal error. Non-fatal errors are yielded and decoding continues.
    pub fn into_stream(self) -> impl Stream<Item = Result<Frame, ProtocolError>> {
        futures_util::stream::unfold(Some(self), |decoder| async move {
            let mut decoder = decoder?;
            match decoder.next().await {
                Ok(Some(frame)) => Some((Ok(frame), Some(decoder))),
                Ok(None) => None,
                Err(err) => {
                    let fatal = err.is_fatal();
                    Some((Err(err), if fatal { None } else { Some(decoder) }))
                }
            }
        })
    }

    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        tracing::warn!(conn = %self.conn.id(), error = %err, "stream decoder closed");
        self.state = DecoderState::Closed;
        self.buf.clear();
        self.cursor = Cursor::default();
        err
    }

    /// Finds the next header, element, or closing tag in the buffer.
    ///
    /// Resumes after the last complete event of the previous call, so
    /// events already seen are not tokenized again.
    fn scan(&mut self) -> Result<Scan, ProtocolError> {
        let data = self.buf.as_slice();
        let base = self.cursor.offset;
        let mut reader = Reader::from_reader(&data[base..]);
        reader.config_mut().trim_text(false);
        // Balance is checked when the element itself is parsed.
        reader.config_mut().check_end_names = false;

        let mut depth = self.cursor.depth;
        let mut element_start = self.cursor.element_start;
        let mut resume = base;
        let mut consumed = if depth == 0 { base } else { 0 };

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(XmlError::Syntax(SyntaxError::InvalidBangMarkup))
                    if !data.ends_with(b"<!") =>
                {
                    return Err(ProtocolError::Malformed(
                        "invalid `<!` markup".into(),
                    ));
                }
                // Unterminated tag, comment, or CDATA: wait for more bytes.
                // A chunk boundary can also split `<!` from what follows.
                Err(XmlError::Syntax(_)) => {
                    self.cursor = Cursor {
                        offset: resume,
                        depth,
                        element_start,
                    };
                    return Ok(Scan::NeedMore { consumed });
                }
                Err(err) => return Err(malformed(err)),
            };
            let end = base + reader.buffer_position() as usize;

            match event {
                Event::Start(tag) => {
                    if depth == 0 {
                        element_start = markup_start(data, end)?;
                        // A second header is a stream restart and replaces the first.
                        if tag.local_name().as_ref() == b"stream" {
                            let (header, scope) = self.read_header(&tag)?;
                            return Ok(Scan::Header { header, scope, end });
                        }
                    }
                    depth += 1;
                }
                Event::Empty(_) if depth == 0 => {
                    let start = markup_start(data, end)?;
                    return Ok(Scan::Element { start, end });
                }
                Event::End(tag) => {
                    if depth == 0 {
                        let name = tag.name();
                        return match &self.header {
                            Some(header) if name.as_ref() == header.tag.as_bytes() => {
                                Ok(Scan::Close { end })
                            }
                            _ => Err(ProtocolError::Malformed(format!(
                                "unexpected closing tag </{}>",
                                String::from_utf8_lossy(name.as_ref())
                            ))),
                        };
                    }
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Scan::Element {
                            start: element_start,
                            end,
                        });
                    }
                }
                Event::Text(text) if depth == 0 => check_keepalive(&text)?,
                Event::CData(_) if depth == 0 => {
                    return Err(ProtocolError::Malformed(
                        "CDATA outside any element".into(),
                    ));
                }
                Event::Eof => {
                    if depth == 0 {
                        consumed = end;
                    }
                    self.cursor = Cursor {
                        offset: end,
                        depth,
                        element_start,
                    };
                    return Ok(Scan::NeedMore { consumed });
                }
                _ => {}
            }

            resume = end;
            if depth == 0 {
                consumed = end;
            }
        }
    }

    fn read_header(
        &self,
        tag: &BytesStart<'_>,
    ) -> Result<(StreamHeader, Namespaces), ProtocolError> {
        let attributes = read_attributes(tag)?;
        let mut scope = Namespaces::with_default(self.config.default_namespace.clone());
        scope.declare(&attributes);

        let mut header = StreamHeader {
            tag: utf8(tag.name().as_ref())?.to_string(),
            ..StreamHeader::default()
        };
        for attr in attributes {
            match attr.name.as_str() {
                "id" => header.id = Some(attr.value),
                "from" => header.from = Some(Jid::from(attr.value)),
                "to" => header.to = Some(Jid::from(attr.value)),
                "version" => header.version = Some(attr.value),
                "xml:lang" => header.lang = Some(attr.value),
                _ => {}
            }
        }
        Ok((header, scope))
    }

    fn decode(&self, raw: &[u8]) -> Result<Option<Frame>, ProtocolError> {
        let text = utf8(raw)?;
        let element = Element::parse_in(text, &self.scope)?;

        if Stanza::recognizes(element.name()) {
            return Stanza::from_element(element).map(|stanza| Some(Frame::Stanza(stanza)));
        }

        match self.config.unknown_elements {
            UnknownElementPolicy::Raw => Ok(Some(Frame::Raw(element))),
            UnknownElementPolicy::Skip => {
                tracing::debug!(name = %element.name(), "skipping top-level element");
                Ok(None)
            }
            UnknownElementPolicy::Reject => {
                Err(ProtocolError::UnknownElement(element.name().to_string()))
            }
        }
    }
}

/// Accepts character data between top-level elements only when it is
/// XML whitespace.
fn check_keepalive(text: &[u8]) -> Result<(), ProtocolError> {
    if text.iter().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
        return Ok(());
    }
    match std::str::from_utf8(text) {
        Err(_) => Err(ProtocolError::Malformed(
            "invalid UTF-8 between elements".into(),
        )),
        Ok(_) => Err(ProtocolError::Malformed(
            "character data outside any element".into(),
        )),
    }
}

/// Offset of the `<` opening the markup that ends at `end`.
fn markup_start(data: &[u8], end: usize) -> Result<usize, ProtocolError> {
    data[..end]
        .iter()
        .rposition(|&b| b == b'<')
        .ok_or_else(|| ProtocolError::Malformed("markup without `<`".into()))
}
