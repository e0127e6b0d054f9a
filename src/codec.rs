//! Framing codec for the length-counted text protocol.
//!
//! A frame is a type token followed by three fields. Every field is a decimal
//! byte length, a single space, and exactly that many bytes of content, so
//! content may contain spaces or newlines. Tokens are separated by single
//! spaces and frames may be separated by ASCII whitespace.
//!
//! ```text
//! BCT 4 temp 2 -- 9 two words
//! ^^^ ^ ^^^^ ^ ^^ ^ ^^^^^^^^^
//! |   | |    | |  | `- text (9 bytes)
//! |   | |    | |  `- length of text
//! |   | |    `-`- receiver absent (sentinel)
//! |   `-`- sender
//! `- type
//! ```
//!
//! Missing fields are written according to the configured [`NullMarker`].
//! The legacy sentinel `2 --` cannot be told apart from the genuine
//! two-byte text `--`; [`NullMarker::NegativeLength`] writes `-1` instead and
//! treats `2 --` as content. Both modes accept `-1` on input.
//!
//! # Error Handling
//!
//! Frames with an unknown type token are still length-delimited, so they are
//! consumed, logged and dropped without affecting the stream. An unknown token
//! that is not followed by well-formed fields is discarded on its own and
//! scanning resumes at the next token. A stray `<len> <content>` pair left over
//! after a frame is discarded whole. Malformed fields after a known type
//! token are a [`FramingError`], after which the stream cannot be
//! resynchronised.

use std::ops::Range;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::message::{Message, MessageType};

pub mod error;

pub use error::{CodecError, FramingError};

/// Content written for a missing field in [`NullMarker::Sentinel`] mode.
pub const NULL_SENTINEL: &str = "--";

/// Length token written for a missing field in [`NullMarker::NegativeLength`]
/// mode.
const NEGATIVE_NULL: &[u8] = b"-1";

/// Longest unknown type token kept while waiting for its separator. Longer
/// words cannot name a message type and are discarded.
pub const MAX_TYPE_TOKEN: usize = 8;

/// Longest decimal length prefix accepted.
const MAX_LENGTH_DIGITS: usize = 10;

/// Minimum configurable field length in bytes.
///
/// Field lengths passed to [`MessageCodec::new`] are clamped to at least this
/// value.
pub const MIN_FIELD_LENGTH: usize = 64;

/// Maximum configurable field length in bytes (16 MiB).
pub const MAX_FIELD_LENGTH: usize = 16 * 1024 * 1024;

/// Field length used by [`MessageCodec::default`].
pub const DEFAULT_MAX_FIELD_LENGTH: usize = 64 * 1024;

pub(crate) fn clamp_field_length(value: usize) -> usize {
    value.clamp(MIN_FIELD_LENGTH, MAX_FIELD_LENGTH)
}

/// Encoding used for absent fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NullMarker {
    /// Write `2 --`; read `2 --` as absent. Compatible with existing clients.
    #[default]
    Sentinel,
    /// Write `-1`; read `2 --` as the literal text `--`.
    NegativeLength,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum FieldSpan {
    #[default]
    Null,
    Bytes(Range<usize>),
}

/// Byte layout of one complete frame found by [`MessageCodec::scan`].
#[derive(Debug)]
struct FrameLayout {
    /// Offset of the first byte of the type token.
    start: usize,
    /// Offset one past the last byte of the frame.
    end: usize,
    type_token: Range<usize>,
    kind: Option<MessageType>,
    fields: [FieldSpan; 3],
}

/// Outcome of scanning the buffered bytes for the next frame.
#[derive(Debug)]
enum Scan {
    /// More bytes are needed.
    Incomplete,
    Frame(FrameLayout),
    /// An unrecognised token that does not start a length-delimited frame.
    /// Everything before `end` can be discarded.
    Junk { end: usize },
}

/// Encoder and decoder for [`Message`] frames.
#[derive(Clone, Debug)]
pub struct MessageCodec {
    null_marker: NullMarker,
    max_field_length: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            null_marker: NullMarker::Sentinel,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
        }
    }
}

fn invalid_length(field: usize, token: &[u8]) -> FramingError {
    FramingError::InvalidLength {
        field,
        token: String::from_utf8_lossy(token).into_owned(),
    }
}

impl MessageCodec {
    /// Construct a codec accepting fields of at most `max_field_length` bytes.
    #[must_use]
    pub fn new(max_field_length: usize) -> Self {
        Self {
            max_field_length: clamp_field_length(max_field_length),
            ..Self::default()
        }
    }

    /// Select how absent fields are written and read.
    #[must_use]
    pub fn with_null_marker(mut self, null_marker: NullMarker) -> Self {
        self.null_marker = null_marker;
        self
    }

    #[must_use]
    pub fn null_marker(&self) -> NullMarker { self.null_marker }

    #[must_use]
    pub fn max_field_length(&self) -> usize { self.max_field_length }

    /// Length in bytes up to the end of the first complete, recognised frame
    /// in `src`, without consuming anything. Unknown frames and stray tokens
    /// before it are included in the length.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the buffered bytes cannot start a valid
    /// frame.
    pub fn frame_len(&self, src: &[u8]) -> Result<Option<usize>, FramingError> {
        let mut from = 0;
        loop {
            match self.scan(src, from)? {
                Scan::Incomplete => return Ok(None),
                Scan::Frame(layout) if layout.kind.is_some() => return Ok(Some(layout.end)),
                Scan::Frame(FrameLayout { end, .. }) | Scan::Junk { end } => from = end,
            }
        }
    }

    fn scan(&self, src: &[u8], from: usize) -> Result<Scan, FramingError> {
        let Some(start) = src[from..]
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|offset| from + offset)
        else {
            return Ok(Scan::Incomplete);
        };
        if src[start..].starts_with(NEGATIVE_NULL) {
            return Ok(Scan::Junk {
                end: start + NEGATIVE_NULL.len(),
            });
        }
        let window = &src[start..src.len().min(start + MAX_TYPE_TOKEN + 1)];
        let Some(type_len) = window.iter().position(u8::is_ascii_whitespace) else {
            if window.len() <= MAX_TYPE_TOKEN {
                return Ok(Scan::Incomplete);
            }
            // No message type is this long; drop the whole word.
            let end = src[start..]
                .iter()
                .position(u8::is_ascii_whitespace)
                .map_or(src.len(), |len| start + len);
            return Ok(Scan::Junk { end });
        };
        let type_token = start..start + type_len;
        let kind = MessageType::from_code(&src[type_token.clone()]);
        let found = src[type_token.end];
        if found != b' ' {
            return match kind {
                Some(_) => Err(FramingError::MissingSeparator {
                    offset: type_len,
                    found,
                }),
                None => Ok(Scan::Junk {
                    end: type_token.end,
                }),
            };
        }
        if kind.is_none()
            && let Some(stray) = self.stray_field(src, type_token.clone())
        {
            return Ok(stray);
        }

        match (self.scan_fields(src, start, type_token.end + 1), kind) {
            (Ok(Some((fields, end))), _) => Ok(Scan::Frame(FrameLayout {
                start,
                end,
                type_token,
                kind,
                fields,
            })),
            (Ok(None), _) => Ok(Scan::Incomplete),
            (Err(_), None) => Ok(Scan::Junk {
                end: type_token.end,
            }),
            (Err(err), Some(_)) => Err(err),
        }
    }

    /// A bare `<len> <content>` pair outside any frame, such as a surplus
    /// field after a complete frame. The pair is discarded as a unit so its
    /// content cannot merge with the next frame's type token.
    fn stray_field(&self, src: &[u8], token: Range<usize>) -> Option<Scan> {
        let digits = &src[token.clone()];
        if digits.len() > MAX_LENGTH_DIGITS || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let len = std::str::from_utf8(digits).ok()?.parse::<usize>().ok()?;
        if len > self.max_field_length {
            return None;
        }
        let end = token.end + 1 + len;
        Some(if src.len() < end {
            Scan::Incomplete
        } else {
            Scan::Junk { end }
        })
    }

    fn scan_fields(
        &self,
        src: &[u8],
        start: usize,
        mut pos: usize,
    ) -> Result<Option<([FieldSpan; 3], usize)>, FramingError> {
        let mut fields: [FieldSpan; 3] = Default::default();
        for (index, slot) in fields.iter_mut().enumerate() {
            if index > 0 {
                match src.get(pos) {
                    None => return Ok(None),
                    Some(b' ') => pos += 1,
                    Some(&found) => {
                        return Err(FramingError::MissingSeparator {
                            offset: pos - start,
                            found,
                        });
                    }
                }
            }
            let Some((span, next)) = self.scan_field(src, pos, index)? else {
                return Ok(None);
            };
            *slot = span;
            pos = next;
        }
        Ok(Some((fields, pos)))
    }

    fn scan_field(
        &self,
        src: &[u8],
        pos: usize,
        index: usize,
    ) -> Result<Option<(FieldSpan, usize)>, FramingError> {
        let rest = &src[pos..];
        if rest.first() == Some(&b'-') {
            return match rest.get(1) {
                None => Ok(None),
                Some(b'1') => Ok(Some((FieldSpan::Null, pos + NEGATIVE_NULL.len()))),
                Some(_) => Err(invalid_length(index, &rest[..2])),
            };
        }

        let window = &rest[..rest.len().min(MAX_LENGTH_DIGITS + 1)];
        let Some(digits) = window.iter().position(|b| !b.is_ascii_digit()) else {
            if rest.len() > MAX_LENGTH_DIGITS {
                return Err(invalid_length(index, window));
            }
            return Ok(None);
        };
        if digits == 0 || window[digits] != b' ' {
            return Err(invalid_length(index, &window[..=digits]));
        }
        let len = std::str::from_utf8(&window[..digits])
            .ok()
            .and_then(|token| token.parse::<usize>().ok())
            .ok_or_else(|| invalid_length(index, &window[..digits]))?;
        if len > self.max_field_length {
            return Err(FramingError::OversizedField {
                field: index,
                len,
                max: self.max_field_length,
            });
        }

        let content = pos + digits + 1..pos + digits + 1 + len;
        if src.len() < content.end {
            return Ok(None);
        }
        let end = content.end;
        let span = if self.null_marker == NullMarker::Sentinel
            && &src[content.clone()] == NULL_SENTINEL.as_bytes()
        {
            FieldSpan::Null
        } else {
            FieldSpan::Bytes(content)
        };
        Ok(Some((span, end)))
    }

    /// Serialise `message` onto the end of `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedField`] if a field is longer than the
    /// configured maximum; `dst` is left untouched in that case.
    pub fn encode_into(&self, message: &Message, dst: &mut BytesMut) -> Result<(), FramingError> {
        let fields = message.fields();
        let mut total = MAX_TYPE_TOKEN;
        for (field, value) in fields.iter().enumerate() {
            let len = value.map_or(0, str::len);
            if len > self.max_field_length {
                return Err(FramingError::OversizedField {
                    field,
                    len,
                    max: self.max_field_length,
                });
            }
            total += len + MAX_LENGTH_DIGITS + 2;
        }

        dst.reserve(total);
        dst.put_slice(message.kind().code().as_bytes());
        for value in fields {
            dst.put_u8(b' ');
            match (value, self.null_marker) {
                (Some(value), marker) => {
                    if marker == NullMarker::Sentinel && value == NULL_SENTINEL {
                        debug!(kind = %message.kind(), "literal sentinel text will decode as absent");
                    }
                    dst.put_slice(value.len().to_string().as_bytes());
                    dst.put_u8(b' ');
                    dst.put_slice(value.as_bytes());
                }
                (None, NullMarker::Sentinel) => {
                    dst.put_slice(b"2 ");
                    dst.put_slice(NULL_SENTINEL.as_bytes());
                }
                (None, NullMarker::NegativeLength) => dst.put_slice(NEGATIVE_NULL),
            }
        }
        Ok(())
    }
}

fn field_string(frame: &[u8], span: &FieldSpan, field: usize) -> Result<Option<String>, FramingError> {
    match span {
        FieldSpan::Null => Ok(None),
        FieldSpan::Bytes(range) => std::str::from_utf8(&frame[range.clone()])
            .map(|s| Some(s.to_owned()))
            .map_err(|_| FramingError::InvalidUtf8 { field }),
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let layout = match self.scan(src, 0)? {
                Scan::Incomplete => {
                    let blank = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
                    src.advance(blank);
                    return Ok(None);
                }
                Scan::Junk { end } => {
                    let junk = src.split_to(end);
                    warn!(
                        token = %String::from_utf8_lossy(junk.trim_ascii_start()),
                        "discarding unrecognised token"
                    );
                    continue;
                }
                Scan::Frame(layout) => layout,
            };
            let frame = src.split_to(layout.end);
            let Some(kind) = layout.kind else {
                warn!(
                    code = %String::from_utf8_lossy(&frame[layout.type_token.clone()]),
                    len = layout.end - layout.start,
                    "dropping frame with unknown message type"
                );
                continue;
            };
            let [sender, receiver, text] = &layout.fields;
            return Ok(Some(Message::from_wire(
                kind,
                field_string(&frame, sender, 0)?,
                field_string(&frame, receiver, 1)?,
                field_string(&frame, text, 2)?,
            )));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(FramingError::Truncated { have: src.len() }.into()),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(&item, dst).map_err(CodecError::from)
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(item, dst).map_err(CodecError::from)
    }
}
