//! # Order-Preserving Key Encoding
//!
//! This module provides the byte-comparable key encoding for LarchDB's
//! B-link trees. A [`Key`] is a mutable byte buffer holding a sequence of
//! typed *segments*; the encoding guarantees that comparing two encoded
//! keys with a single `memcmp` produces the same ordering as comparing
//! the decoded segment tuples.
//!
//! ## Design Goals
//!
//! 1. **Byte-comparable**: lexicographic order of encoded bytes equals
//!    logical tuple order
//! 2. **Terminator-safe**: the segment terminator byte `0x00` never
//!    occurs inside encoded segment content
//! 3. **Invertible**: every segment decodes back to its original value
//! 4. **Sentinel-bounded**: the BEFORE key sorts below every real key,
//!    the AFTER key above
//!
//! ## Wire Layout
//!
//! ```text
//! key        := sentinel | (segment TERMINATOR)*
//! segment    := prefix payload
//! TERMINATOR := 0x00
//! ```
//!
//! Each segment starts with a type prefix byte that also fixes the
//! ordering between classes:
//!
//! ```text
//! 0x00       segment terminator (never inside content)
//! 0x01       BEFORE sentinel (whole-key form only)
//! 0x02       NULL
//! 0x03-0x04  booleans (false < true)
//! 0x10-0x12  integers (negative < zero < positive)
//! 0x20       32-bit floats
//! 0x28       64-bit floats
//! 0x30       text
//! 0xFF       AFTER sentinel (whole-key form only)
//! ```
//!
//! ## Integer Encoding
//!
//! Sign-split with a biased length byte so that magnitude ordering falls
//! out of the byte comparison:
//!
//! ```text
//! zero:      [0x11]
//! positive:  [0x12, 0x08 + len, magnitude big-endian]
//! negative:  [0x10, 0x08 + (9 - len), !magnitude big-endian]
//! ```
//!
//! A longer positive magnitude is a larger value, so its length byte
//! sorts later; negatives bias the length byte the other way and store
//! the complement, which reverses the order exactly as required.
//!
//! ## Float Encoding
//!
//! IEEE 754 bit manipulation preserves ordering: negative values
//! complement all bits, positive values flip the sign bit. NaN sorts
//! above positive infinity, -0.0 just below +0.0.
//!
//! ## Payload Escape
//!
//! All payload bytes pass through an escape that removes `0x00` and
//! `0x01` from encoded content:
//!
//! ```text
//! 0x00 -> 0x01 0x20
//! 0x01 -> 0x01 0x21
//! ```
//!
//! The map is strictly increasing and prefix-free, so it preserves
//! lexicographic order. Because content never contains `0x00`, the
//! terminator sorts strictly below every content byte, which gives the
//! prefix property: `{a}` sorts immediately before `{a,...}`.
//!
//! The byte `0x01` after a terminated prefix doubles as the *sub-key
//! nudge*: it sorts above the bare prefix but below every deeper real
//! key (whose first segment byte is a type prefix >= 0x02). The filter
//! traversal machinery builds seek targets from exactly this property.
//!
//! ## Concurrency
//!
//! A `Key` is owned by one thread at a time. Publishing a key across
//! threads goes through [`KeyState`], an immutable snapshot usable as an
//! ordered map key.

use std::fmt;

use eyre::Result;
use smallvec::SmallVec;

use crate::error::LarchError;

/// Type prefix bytes. The numeric order of these constants is the
/// cross-class sort order of encoded segments.
pub mod prefix {
    pub const TERMINATOR: u8 = 0x00;
    pub const BEFORE: u8 = 0x01;
    pub const NULL: u8 = 0x02;
    pub const BOOL_FALSE: u8 = 0x03;
    pub const BOOL_TRUE: u8 = 0x04;
    pub const INT_NEG: u8 = 0x10;
    pub const INT_ZERO: u8 = 0x11;
    pub const INT_POS: u8 = 0x12;
    pub const FLOAT32: u8 = 0x20;
    pub const FLOAT64: u8 = 0x28;
    pub const TEXT: u8 = 0x30;
    pub const AFTER: u8 = 0xFF;
}

const ESCAPE: u8 = 0x01;
const ESCAPED_ZERO: u8 = 0x20;
const ESCAPED_ONE: u8 = 0x21;

/// Nudge byte appended to a terminated prefix to produce a seek target
/// that sorts between the prefix key and its deeper extensions.
pub(crate) const SUBKEY_NUDGE: u8 = 0x01;

/// Nudge byte appended to a terminator-less segment edge to produce a
/// seek target above every key sharing that exact segment.
pub(crate) const SEGMENT_NUDGE_HIGH: u8 = 0xFF;

const F32_SIGN: u32 = 1 << 31;
const F64_SIGN: u64 = 1 << 63;

/// One typed key segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl Segment {
    /// Appends the encoded form (without terminator) to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Segment::Null => out.push(prefix::NULL),
            Segment::Bool(false) => out.push(prefix::BOOL_FALSE),
            Segment::Bool(true) => out.push(prefix::BOOL_TRUE),
            Segment::Int(0) => out.push(prefix::INT_ZERO),
            Segment::Int(v) if *v > 0 => {
                let mag = *v as u64;
                let len = magnitude_len(mag);
                out.push(prefix::INT_POS);
                out.push(0x08 + len as u8);
                for &b in &mag.to_be_bytes()[8 - len..] {
                    push_escaped(out, b);
                }
            }
            Segment::Int(v) => {
                let mag = v.unsigned_abs();
                let len = magnitude_len(mag);
                out.push(prefix::INT_NEG);
                out.push(0x08 + (9 - len) as u8);
                for &b in &mag.to_be_bytes()[8 - len..] {
                    push_escaped(out, !b);
                }
            }
            Segment::Float(v) => {
                let bits = v.to_bits();
                let enc = if bits & F32_SIGN != 0 {
                    !bits
                } else {
                    bits | F32_SIGN
                };
                out.push(prefix::FLOAT32);
                for &b in &enc.to_be_bytes() {
                    push_escaped(out, b);
                }
            }
            Segment::Double(v) => {
                let bits = v.to_bits();
                let enc = if bits & F64_SIGN != 0 {
                    !bits
                } else {
                    bits | F64_SIGN
                };
                out.push(prefix::FLOAT64);
                for &b in &enc.to_be_bytes() {
                    push_escaped(out, b);
                }
            }
            Segment::Text(s) => {
                out.push(prefix::TEXT);
                for &b in s.as_bytes() {
                    push_escaped(out, b);
                }
            }
        }
    }

    /// Encodes into a fresh buffer (without terminator).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        self.encode_into(&mut out);
        out
    }

    /// Decodes one segment from its full (terminator-less) encoded form.
    pub fn decode(bytes: &[u8]) -> Result<Segment> {
        let (&first, payload) = bytes
            .split_first()
            .ok_or(LarchError::Underflow("empty segment"))?;
        match first {
            prefix::NULL => Ok(Segment::Null),
            prefix::BOOL_FALSE => Ok(Segment::Bool(false)),
            prefix::BOOL_TRUE => Ok(Segment::Bool(true)),
            prefix::INT_ZERO => Ok(Segment::Int(0)),
            prefix::INT_POS => {
                let (&biased, rest) = payload
                    .split_first()
                    .ok_or(LarchError::Underflow("truncated integer segment"))?;
                let len = biased.wrapping_sub(0x08) as usize;
                let mag = unescape(rest)?;
                if !(1..=8).contains(&len) || mag.len() != len {
                    return Err(LarchError::Underflow("malformed integer segment").into());
                }
                let value = mag.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                if value > i64::MAX as u64 {
                    return Err(LarchError::Underflow("integer magnitude out of range").into());
                }
                Ok(Segment::Int(value as i64))
            }
            prefix::INT_NEG => {
                let (&biased, rest) = payload
                    .split_first()
                    .ok_or(LarchError::Underflow("truncated integer segment"))?;
                let stored = biased.wrapping_sub(0x08) as usize;
                let mag = unescape(rest)?;
                if !(1..=8).contains(&stored) || mag.len() != 9 - stored {
                    return Err(LarchError::Underflow("malformed integer segment").into());
                }
                let value = mag.iter().fold(0u64, |acc, &b| (acc << 8) | !b as u64);
                if value > i64::MIN.unsigned_abs() {
                    return Err(LarchError::Underflow("integer magnitude out of range").into());
                }
                Ok(Segment::Int((value as i128).wrapping_neg() as i64))
            }
            prefix::FLOAT32 => {
                let raw = unescape(payload)?;
                let enc = u32::from_be_bytes(
                    raw.as_slice()
                        .try_into()
                        .map_err(|_| LarchError::Underflow("truncated float segment"))?,
                );
                let bits = if enc & F32_SIGN != 0 {
                    enc ^ F32_SIGN
                } else {
                    !enc
                };
                Ok(Segment::Float(f32::from_bits(bits)))
            }
            prefix::FLOAT64 => {
                let raw = unescape(payload)?;
                let enc = u64::from_be_bytes(
                    raw.as_slice()
                        .try_into()
                        .map_err(|_| LarchError::Underflow("truncated double segment"))?,
                );
                let bits = if enc & F64_SIGN != 0 {
                    enc ^ F64_SIGN
                } else {
                    !enc
                };
                Ok(Segment::Double(f64::from_bits(bits)))
            }
            prefix::TEXT => {
                let raw = unescape(payload)?;
                let s = String::from_utf8(raw.to_vec())
                    .map_err(|_| LarchError::Underflow("segment is not valid UTF-8"))?;
                Ok(Segment::Text(s))
            }
            other => Err(LarchError::TypeMismatch {
                expected: "segment",
                found: kind_of_prefix(other),
            }
            .into()),
        }
    }

    /// Stable name of the segment's type, used in error reports and the
    /// filter text form.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Segment::Null => "null",
            Segment::Bool(_) => "bool",
            Segment::Int(_) => "int",
            Segment::Float(_) => "float",
            Segment::Double(_) => "double",
            Segment::Text(_) => "text",
        }
    }
}

fn kind_of_prefix(p: u8) -> &'static str {
    match p {
        prefix::NULL => "null",
        prefix::BOOL_FALSE | prefix::BOOL_TRUE => "bool",
        prefix::INT_NEG | prefix::INT_ZERO | prefix::INT_POS => "int",
        prefix::FLOAT32 => "float",
        prefix::FLOAT64 => "double",
        prefix::TEXT => "text",
        prefix::BEFORE | prefix::AFTER => "sentinel",
        _ => "unknown",
    }
}

fn magnitude_len(mag: u64) -> usize {
    ((64 - mag.leading_zeros() as usize) + 7) / 8
}

fn push_escaped(out: &mut Vec<u8>, b: u8) {
    match b {
        0x00 => {
            out.push(ESCAPE);
            out.push(ESCAPED_ZERO);
        }
        0x01 => {
            out.push(ESCAPE);
            out.push(ESCAPED_ONE);
        }
        other => out.push(other),
    }
}

fn unescape(payload: &[u8]) -> Result<SmallVec<[u8; 16]>> {
    let mut out = SmallVec::new();
    let mut iter = payload.iter();
    while let Some(&b) = iter.next() {
        if b == ESCAPE {
            match iter.next() {
                Some(&ESCAPED_ZERO) => out.push(0x00),
                Some(&ESCAPED_ONE) => out.push(0x01),
                _ => return Err(LarchError::Underflow("truncated escape sequence").into()),
            }
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

impl From<i64> for Segment {
    fn from(v: i64) -> Self {
        Segment::Int(v)
    }
}

impl From<i32> for Segment {
    fn from(v: i32) -> Self {
        Segment::Int(v as i64)
    }
}

impl From<f32> for Segment {
    fn from(v: f32) -> Self {
        Segment::Float(v)
    }
}

impl From<f64> for Segment {
    fn from(v: f64) -> Self {
        Segment::Double(v)
    }
}

impl From<bool> for Segment {
    fn from(v: bool) -> Self {
        Segment::Bool(v)
    }
}

impl From<&str> for Segment {
    fn from(v: &str) -> Self {
        Segment::Text(v.to_string())
    }
}

impl From<String> for Segment {
    fn from(v: String) -> Self {
        Segment::Text(v)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Null => write!(f, "null"),
            Segment::Bool(v) => write!(f, "{v}"),
            Segment::Int(v) => write!(f, "{v}"),
            Segment::Float(v) => write!(f, "(float){v}"),
            Segment::Double(v) => {
                let s = format!("{v}");
                if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
                    write!(f, "{s}")
                } else {
                    write!(f, "{s}.0")
                }
            }
            Segment::Text(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        '\0' => write!(f, "\\0")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

/// A mutable, order-preserving encoded key: a sequence of typed segments
/// over one byte buffer, or one of the two sentinels.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    bytes: Vec<u8>,
}

impl Key {
    /// An empty key with no segments.
    pub fn new() -> Key {
        Key { bytes: Vec::new() }
    }

    /// The sentinel that sorts strictly below every real key.
    pub fn before() -> Key {
        Key {
            bytes: vec![prefix::BEFORE],
        }
    }

    /// The sentinel that sorts strictly above every real key.
    pub fn after() -> Key {
        Key {
            bytes: vec![prefix::AFTER],
        }
    }

    pub fn is_before(&self) -> bool {
        self.bytes == [prefix::BEFORE]
    }

    pub fn is_after(&self) -> bool {
        self.bytes == [prefix::AFTER]
    }

    pub fn is_sentinel(&self) -> bool {
        self.is_before() || self.is_after()
    }

    /// Number of complete segments.
    pub fn depth(&self) -> usize {
        self.bytes
            .iter()
            .filter(|&&b| b == prefix::TERMINATOR)
            .count()
    }

    /// Encoded form, including segment terminators.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoded_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends one segment.
    ///
    /// # Panics
    ///
    /// Panics when called on a sentinel key; clear it first.
    pub fn append(&mut self, value: impl Into<Segment>) -> &mut Key {
        assert!(!self.is_sentinel(), "cannot append to a sentinel key");
        value.into().encode_into(&mut self.bytes);
        self.bytes.push(prefix::TERMINATOR);
        self
    }

    /// Replaces the last segment.
    ///
    /// # Panics
    ///
    /// Panics when the key has no segments.
    pub fn to(&mut self, value: impl Into<Segment>) -> &mut Key {
        self.cut(1);
        self.append(value)
    }

    /// Drops the last `n` segments.
    ///
    /// # Panics
    ///
    /// Panics when `n` exceeds the key depth.
    pub fn cut(&mut self, n: usize) -> &mut Key {
        let depth = self.depth();
        assert!(n <= depth, "cannot cut {n} segments from depth {depth}");
        self.truncate_to_depth(depth - n);
        self
    }

    /// Removes all segments (and any sentinel state).
    pub fn clear(&mut self) -> &mut Key {
        self.bytes.clear();
        self
    }

    /// A decode cursor positioned at the first segment.
    pub fn cursor(&self) -> KeyCursor<'_> {
        KeyCursor { key: self, pos: 0 }
    }

    /// A decode cursor positioned at segment `index`.
    pub fn index_to(&self, index: usize) -> Result<KeyCursor<'_>> {
        let mut pos = 0usize;
        for _ in 0..index {
            match self.bytes[pos..]
                .iter()
                .position(|&b| b == prefix::TERMINATOR)
            {
                Some(t) => pos += t + 1,
                None => {
                    return Err(LarchError::Underflow("segment index past end of key").into());
                }
            }
        }
        Ok(KeyCursor { key: self, pos })
    }

    /// Immutable snapshot for cross-thread publication and map keys.
    pub fn state(&self) -> KeyState {
        KeyState(self.bytes.clone().into_boxed_slice())
    }

    /// Encoded bytes of segment `d`, without the terminator.
    pub(crate) fn segment_bytes(&self, d: usize) -> Option<&[u8]> {
        let mut start = 0usize;
        let mut index = 0usize;
        for (i, &b) in self.bytes.iter().enumerate() {
            if b == prefix::TERMINATOR {
                if index == d {
                    return Some(&self.bytes[start..i]);
                }
                start = i + 1;
                index += 1;
            }
        }
        None
    }

    /// Keeps the first `d` complete segments, dropping the rest
    /// (including any seek-form tail).
    pub(crate) fn truncate_to_depth(&mut self, d: usize) {
        if d == 0 {
            self.bytes.clear();
            return;
        }
        let mut seen = 0usize;
        for i in 0..self.bytes.len() {
            if self.bytes[i] == prefix::TERMINATOR {
                seen += 1;
                if seen == d {
                    self.bytes.truncate(i + 1);
                    return;
                }
            }
        }
    }

    /// Appends raw encoded bytes without a terminator (seek-form tail).
    pub(crate) fn push_encoded(&mut self, enc: &[u8]) {
        self.bytes.extend_from_slice(enc);
    }

    pub(crate) fn push_raw(&mut self, b: u8) {
        self.bytes.push(b);
    }

    pub(crate) fn set_after(&mut self) {
        self.bytes.clear();
        self.bytes.push(prefix::AFTER);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_before() {
            return write!(f, "{{{{before}}}}");
        }
        if self.is_after() {
            return write!(f, "{{{{after}}}}");
        }
        write!(f, "{{")?;
        let mut first = true;
        for chunk in self.bytes.split(|&b| b == prefix::TERMINATOR) {
            if chunk.is_empty() {
                continue;
            }
            if !first {
                write!(f, ",")?;
            }
            first = false;
            // Seek-form keys carry a trailing nudge byte; render the
            // segment it was derived from.
            match Segment::decode(chunk) {
                Ok(seg) => write!(f, "{seg}")?,
                Err(_) => match chunk
                    .split_last()
                    .filter(|(&last, _)| last == SUBKEY_NUDGE || last == SEGMENT_NUDGE_HIGH)
                    .and_then(|(_, head)| Segment::decode(head).ok())
                {
                    Some(seg) => write!(f, "{seg}")?,
                    None => write!(f, "#{chunk:02x?}")?,
                },
            }
        }
        write!(f, "}}")
    }
}

/// A decode cursor over a key's segments.
#[derive(Debug, Clone)]
pub struct KeyCursor<'a> {
    key: &'a Key,
    pos: usize,
}

impl<'a> KeyCursor<'a> {
    pub fn has_next(&self) -> bool {
        self.pos < self.key.bytes.len()
    }

    /// Repositions at the first segment.
    pub fn reset(&mut self) -> &mut Self {
        self.pos = 0;
        self
    }

    fn peek_segment(&self) -> Result<(&'a [u8], usize)> {
        let bytes = &self.key.bytes;
        if self.pos >= bytes.len() {
            return Err(LarchError::Underflow("decode past end of key").into());
        }
        match bytes[self.pos..]
            .iter()
            .position(|&b| b == prefix::TERMINATOR)
        {
            Some(t) => Ok((&bytes[self.pos..self.pos + t], self.pos + t + 1)),
            None => Ok((&bytes[self.pos..], bytes.len())),
        }
    }

    /// Decodes the next segment, whatever its type.
    pub fn decode(&mut self) -> Result<Segment> {
        let (chunk, next) = self.peek_segment()?;
        let seg = Segment::decode(chunk)?;
        self.pos = next;
        Ok(seg)
    }

    fn decode_expecting(&mut self, expected: &'static str) -> Result<Segment> {
        let (chunk, next) = self.peek_segment()?;
        let seg = Segment::decode(chunk)?;
        if seg.kind_name() != expected {
            return Err(LarchError::TypeMismatch {
                expected,
                found: seg.kind_name(),
            }
            .into());
        }
        self.pos = next;
        Ok(seg)
    }

    pub fn decode_int(&mut self) -> Result<i64> {
        match self.decode_expecting("int")? {
            Segment::Int(v) => Ok(v),
            _ => unreachable!(),
        }
    }

    pub fn decode_bool(&mut self) -> Result<bool> {
        match self.decode_expecting("bool")? {
            Segment::Bool(v) => Ok(v),
            _ => unreachable!(),
        }
    }

    pub fn decode_float(&mut self) -> Result<f32> {
        match self.decode_expecting("float")? {
            Segment::Float(v) => Ok(v),
            _ => unreachable!(),
        }
    }

    pub fn decode_double(&mut self) -> Result<f64> {
        match self.decode_expecting("double")? {
            Segment::Double(v) => Ok(v),
            _ => unreachable!(),
        }
    }

    pub fn decode_text(&mut self) -> Result<String> {
        match self.decode_expecting("text")? {
            Segment::Text(v) => Ok(v),
            _ => unreachable!(),
        }
    }
}

/// Immutable snapshot of a key's encoded form. Hashable and ordered, so
/// it works as a map key and can be published across threads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyState(Box<[u8]>);

impl KeyState {
    pub fn new(key: &Key) -> KeyState {
        key.state()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_key(&self) -> Key {
        Key {
            bytes: self.0.to_vec(),
        }
    }
}

impl From<&Key> for KeyState {
    fn from(key: &Key) -> KeyState {
        key.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(seg: impl Into<Segment>) -> Vec<u8> {
        seg.into().encode()
    }

    fn assert_ordered(a: impl Into<Segment>, b: impl Into<Segment>) {
        let (a, b) = (a.into(), b.into());
        let (ea, eb) = (a.encode(), b.encode());
        assert!(ea < eb, "expected {a} < {b}, got {ea:02x?} vs {eb:02x?}");
    }

    #[test]
    fn integers_preserve_order() {
        let values: [i64; 12] = [
            i64::MIN,
            -4_000_000_000,
            -65_536,
            -300,
            -2,
            -1,
            0,
            1,
            255,
            256,
            4_000_000_000,
            i64::MAX,
        ];
        for pair in values.windows(2) {
            assert_ordered(pair[0], pair[1]);
        }
    }

    #[test]
    fn integers_round_trip() {
        for v in [i64::MIN, -1_000_000, -256, -1, 0, 1, 127, 65_535, i64::MAX] {
            assert_eq!(Segment::decode(&enc(v)).unwrap(), Segment::Int(v));
        }
    }

    #[test]
    fn doubles_preserve_order() {
        let values = [
            f64::NEG_INFINITY,
            -1.0e100,
            -1.5,
            -0.0,
            0.0,
            1.0e-300,
            1.3,
            2.0,
            f64::INFINITY,
        ];
        for pair in values.windows(2) {
            assert_ordered(pair[0], pair[1]);
        }
        assert_ordered(f64::INFINITY, f64::NAN);
    }

    #[test]
    fn floats_round_trip() {
        for v in [-1.3f32, 0.0, 1.3, f32::MIN, f32::MAX] {
            assert_eq!(Segment::decode(&enc(v)).unwrap(), Segment::Float(v));
        }
        for v in [-1.3f64, 0.0, 1.3, f64::MIN_POSITIVE] {
            assert_eq!(Segment::decode(&enc(v)).unwrap(), Segment::Double(v));
        }
    }

    #[test]
    fn text_preserves_order_with_escape_bytes() {
        let values = ["", "\0", "\0a", "\u{1}", "a", "ab", "b", "z", "z\0"];
        for pair in values.windows(2) {
            assert_ordered(pair[0], pair[1]);
        }
    }

    #[test]
    fn text_round_trips_embedded_controls() {
        for s in ["", "plain", "nul\0inside", "\u{1}\u{1}", "ünïcodé"] {
            assert_eq!(
                Segment::decode(&enc(s)).unwrap(),
                Segment::Text(s.to_string())
            );
        }
    }

    #[test]
    fn encoded_content_never_contains_terminator() {
        let segments: Vec<Segment> = vec![
            Segment::Int(256),
            Segment::Int(-256),
            Segment::Int(i64::MIN),
            Segment::Double(0.0),
            Segment::Float(-0.0),
            Segment::Text("nul\0and\u{1}".into()),
        ];
        for seg in segments {
            assert!(
                !seg.encode().contains(&prefix::TERMINATOR),
                "terminator leaked into {seg:?}"
            );
        }
    }

    #[test]
    fn class_order_is_null_bool_int_float_double_text() {
        assert_ordered(Segment::Null, false);
        assert_ordered(false, true);
        assert_ordered(true, i64::MIN);
        assert_ordered(i64::MAX, Segment::Float(f32::NEG_INFINITY));
        assert_ordered(Segment::Float(f32::INFINITY), f64::NEG_INFINITY);
        assert_ordered(f64::INFINITY, "");
    }

    #[test]
    fn sentinels_bound_all_real_keys() {
        let mut low = Key::new();
        low.append(Segment::Null);
        let mut high = Key::new();
        high.append("zzz").append(i64::MAX);
        assert!(Key::before() < low);
        assert!(high < Key::after());
        assert!(Key::before() < Key::after());
    }

    #[test]
    fn composed_keys_compare_by_tuple_order() {
        let mut a = Key::new();
        a.append(42).append("hello");
        let mut b = Key::new();
        b.append(42).append("world");
        let mut c = Key::new();
        c.append(43);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn shallower_prefix_sorts_first() {
        let mut a = Key::new();
        a.append("a");
        let mut ab = Key::new();
        ab.append("a").append("b");
        assert!(a < ab);
    }

    #[test]
    fn depth_tracks_append_and_cut() {
        let mut key = Key::new();
        assert_eq!(key.depth(), 0);
        key.append("atlantic").append(1.3f32).append("x");
        assert_eq!(key.depth(), 3);
        key.cut(2);
        assert_eq!(key.depth(), 1);
        key.cut(1);
        assert_eq!(key.depth(), 0);
    }

    #[test]
    #[should_panic(expected = "cannot cut")]
    fn cut_past_start_panics() {
        Key::new().append(1).cut(2);
    }

    #[test]
    fn to_replaces_last_segment() {
        let mut key = Key::new();
        key.append("a").append("x");
        key.to("y");
        assert_eq!(key.depth(), 2);
        let mut cursor = key.index_to(1).unwrap();
        assert_eq!(cursor.decode_text().unwrap(), "y");
    }

    #[test]
    fn cursor_decodes_in_sequence() {
        let mut key = Key::new();
        key.append("atlantic").append(1.3f32).append(125).append(true);
        let mut cursor = key.cursor();
        assert_eq!(cursor.decode_text().unwrap(), "atlantic");
        assert_eq!(cursor.decode_float().unwrap(), 1.3);
        assert_eq!(cursor.decode_int().unwrap(), 125);
        assert!(cursor.decode_bool().unwrap());
        assert!(!cursor.has_next());
    }

    #[test]
    fn decode_wrong_type_is_mismatch_and_leaves_cursor() {
        let mut key = Key::new();
        key.append("text");
        let mut cursor = key.cursor();
        let err = cursor.decode_int().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LarchError>(),
            Some(LarchError::TypeMismatch {
                expected: "int",
                found: "text"
            })
        ));
        // The failed read did not consume the segment.
        assert_eq!(cursor.decode_text().unwrap(), "text");
    }

    #[test]
    fn decode_past_end_is_underflow() {
        let mut key = Key::new();
        key.append(1);
        let mut cursor = key.cursor();
        cursor.decode_int().unwrap();
        let err = cursor.decode_int().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LarchError>(),
            Some(LarchError::Underflow(_))
        ));
    }

    #[test]
    fn index_to_positions_cursor() {
        let mut key = Key::new();
        key.append("a").append("b").append("c");
        let mut cursor = key.index_to(2).unwrap();
        assert_eq!(cursor.decode_text().unwrap(), "c");
        assert!(key.index_to(4).is_err());
    }

    #[test]
    fn key_state_snapshot_is_stable_and_ordered() {
        let mut key = Key::new();
        key.append("a").append(1);
        let state = key.state();
        key.to(2);
        let state2 = key.state();
        assert!(state < state2);
        assert_eq!(state2.to_key(), key);
    }

    #[test]
    fn display_renders_segments() {
        let mut key = Key::new();
        key.append("atlantic").append(1.3f32).append("x").append(200);
        assert_eq!(key.to_string(), "{\"atlantic\",(float)1.3,\"x\",200}");
        assert_eq!(Key::before().to_string(), "{{before}}");
        assert_eq!(Key::after().to_string(), "{{after}}");
    }
}
