//! # Key Filters
//!
//! A [`KeyFilter`] is a compiled, immutable selection predicate over
//! encoded keys, plus a navigation oracle that lets an ordered cursor
//! skip directly to the next key that could match.
//!
//! ## Model
//!
//! A filter is an ordered list of [`Term`]s, one per key depth, plus a
//! depth window `[min_depth, max_depth]`:
//!
//! ```text
//! {"atlantic",(float)1.3,"x":"z",{100:150,200:250,[300:350)},*<}
//!   term 0     term 1     term 2        term 3            tail
//! ```
//!
//! Depth `i` of a key is tested against term `i`; depths beyond the term
//! vector are governed by the wildcard tail up to `max_depth`. Terms are
//! a tagged enumeration (no dynamic dispatch):
//!
//! - `All` — the wildcard `*`, admits any segment
//! - `Simple` — admits exactly one value
//! - `Range` — admits a contiguous value range, either bound may be open
//!   or exclusive
//! - `Or` — a sorted, disjoint union of simple/range children
//!
//! ## Selection vs. Traversal
//!
//! `selected` answers "does this key match". `traverse` is the partner
//! operation for cursor scans: given a key that does NOT match, it
//! rewrites the key into a *seek target* so that one more cursor probe
//! (strictly-greater for forward scans, strictly-less for backward)
//! lands on the next key that could match. The scan protocol:
//!
//! ```text
//! key = BEFORE
//! while let Some(k) = store.next_greater(key) {
//!     key = k;
//!     if filter.selected(&key)          { visit(key) }
//!     else if !filter.traverse(&mut key, true) { break }
//! }
//! ```
//!
//! Repeated selected/traverse over an ordered store visits exactly the
//! selected keys, each once, in order, and terminates.
//!
//! ## Seek Targets
//!
//! Traversal exploits two properties of the key encoding: the terminator
//! `0x00` sorts below every content byte, and real segments start at
//! byte `0x02`. A terminator-less segment edge `prefix·enc(v)` therefore
//! sits exactly between the keys below `{prefix,v}` and the keys at or
//! under it, and the nudge bytes `0x01`/`0xFF` shift a target just past
//! a segment's own subtree in either direction. Four target shapes
//! cover every bound:
//!
//! ```text
//! forward,  inclusive v:  prefix · enc(v)           (next probe lands on v)
//! forward,  exclusive v:  prefix · enc(v) · 0x01    (skips v's whole subtree)
//! backward, inclusive v:  prefix · enc(v) · 0xFF    (lands on v's deepest key)
//! backward, exclusive v:  prefix · enc(v)           (lands below v entirely)
//! ```
//!
//! ## Immutability
//!
//! Filters are immutable and cheaply shareable; `append` and `limit`
//! return new filters sharing the term storage. A filter is never
//! locked.

pub mod parser;

use std::fmt;
use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

use crate::encoding::key::{SEGMENT_NUDGE_HIGH, SUBKEY_NUDGE};
use crate::encoding::{Key, Segment};
use crate::error::LarchError;

/// One bound of a range term.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    value: Segment,
    encoded: Vec<u8>,
    inclusive: bool,
}

impl RangeBound {
    fn new(value: Segment, inclusive: bool) -> RangeBound {
        let encoded = value.encode();
        RangeBound {
            value,
            encoded,
            inclusive,
        }
    }

    pub fn value(&self) -> &Segment {
        &self.value
    }

    pub fn inclusive(&self) -> bool {
        self.inclusive
    }
}

/// A depth-scoped predicate over one key segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// The wildcard `*`; admits any segment.
    All,
    /// Admits exactly one value.
    Simple { value: Segment, encoded: Vec<u8> },
    /// Admits a contiguous range; an absent bound is open.
    Range {
        lo: Option<RangeBound>,
        hi: Option<RangeBound>,
    },
    /// Admits the union of disjoint children, sorted ascending.
    Or(Vec<Term>),
}

/// A seek target edge produced during traversal: the encoded bound value
/// plus whether the bound itself is admitted.
#[derive(Debug, Clone)]
struct SeekEdge {
    encoded: SmallVec<[u8; 24]>,
    inclusive: bool,
}

enum Locate {
    Match,
    Seek(SeekEdge),
    Exhausted,
}

impl Term {
    /// A term admitting exactly `value`.
    pub fn simple(value: impl Into<Segment>) -> Term {
        let value = value.into();
        let encoded = value.encode();
        Term::Simple { value, encoded }
    }

    /// An inclusive-inclusive range term.
    pub fn range(lo: impl Into<Segment>, hi: impl Into<Segment>) -> Term {
        Term::range_with(Some(lo.into()), Some(hi.into()), true, true)
    }

    /// A range term with explicit bounds; `None` leaves that side open.
    pub fn range_with(
        lo: Option<Segment>,
        hi: Option<Segment>,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) -> Term {
        Term::Range {
            lo: lo.map(|v| RangeBound::new(v, lo_inclusive)),
            hi: hi.map(|v| RangeBound::new(v, hi_inclusive)),
        }
    }

    /// An OR term over simple/range children. Children are sorted by
    /// lower bound; overlapping or nested children are rejected.
    pub fn or(mut children: Vec<Term>) -> Result<Term> {
        if children.is_empty() {
            return Err(
                LarchError::IllegalArgument("or-term requires at least one child".into()).into(),
            );
        }
        for child in &children {
            if matches!(child, Term::All | Term::Or(_)) {
                return Err(LarchError::IllegalArgument(
                    "or-term children must be simple values or ranges".into(),
                )
                .into());
            }
        }
        children.sort_by(|a, b| {
            let (ea, ia) = a.lower_edge();
            let (eb, ib) = b.lower_edge();
            ea.cmp(&eb).then(ib.cmp(&ia))
        });
        for pair in children.windows(2) {
            let (hi, hi_incl) = pair[0].upper_edge();
            let (lo, lo_incl) = pair[1].lower_edge();
            let disjoint = match (hi, lo) {
                (Some(h), Some(l)) => h < l || (h == l && !(hi_incl && lo_incl)),
                _ => false,
            };
            if !disjoint {
                return Err(
                    LarchError::IllegalArgument("or-term children must be disjoint".into()).into(),
                );
            }
        }
        Ok(Term::Or(children))
    }

    /// Lower edge as (encoded value, inclusive); `None` = open below.
    fn lower_edge(&self) -> (Option<&[u8]>, bool) {
        match self {
            Term::Simple { encoded, .. } => (Some(encoded.as_slice()), true),
            Term::Range { lo, .. } => match lo {
                Some(b) => (Some(b.encoded.as_slice()), b.inclusive),
                None => (None, true),
            },
            Term::Or(children) => children.first().map_or((None, true), |c| c.lower_edge()),
            Term::All => (None, true),
        }
    }

    fn upper_edge(&self) -> (Option<&[u8]>, bool) {
        match self {
            Term::Simple { encoded, .. } => (Some(encoded.as_slice()), true),
            Term::Range { hi, .. } => match hi {
                Some(b) => (Some(b.encoded.as_slice()), b.inclusive),
                None => (None, true),
            },
            Term::Or(children) => children.last().map_or((None, true), |c| c.upper_edge()),
            Term::All => (None, true),
        }
    }

    /// Whether the segment sorts below every admitted value.
    fn below(&self, seg: &[u8]) -> bool {
        match self.lower_edge() {
            (Some(lo), inclusive) => seg < lo || (seg == lo && !inclusive),
            (None, _) => false,
        }
    }

    /// Whether the segment sorts above every admitted value.
    fn above(&self, seg: &[u8]) -> bool {
        match self.upper_edge() {
            (Some(hi), inclusive) => seg > hi || (seg == hi && !inclusive),
            (None, _) => false,
        }
    }

    /// Whether the term admits the encoded segment.
    pub(crate) fn admits(&self, seg: &[u8]) -> bool {
        match self {
            Term::All => true,
            Term::Simple { encoded, .. } => seg == encoded.as_slice(),
            Term::Range { .. } => !self.below(seg) && !self.above(seg),
            Term::Or(children) => children.iter().any(|c| c.admits(seg)),
        }
    }

    /// Positions a rejected segment: match, seek to an admitted edge at
    /// or beyond the segment (in scan direction), or exhausted.
    fn locate(&self, seg: &[u8], forward: bool) -> Locate {
        match self {
            Term::All => Locate::Match,
            Term::Simple { .. } | Term::Range { .. } => {
                if self.admits(seg) {
                    return Locate::Match;
                }
                let (past, upcoming) = if forward {
                    (self.above(seg), self.lower_edge())
                } else {
                    (self.below(seg), self.upper_edge())
                };
                if past {
                    Locate::Exhausted
                } else {
                    match upcoming {
                        (Some(edge), inclusive) => Locate::Seek(SeekEdge {
                            encoded: SmallVec::from_slice(edge),
                            inclusive,
                        }),
                        // Open bound on the approach side admits the
                        // segment, so admits() would have matched.
                        (None, _) => Locate::Match,
                    }
                }
            }
            Term::Or(children) => {
                let mut iter: Box<dyn Iterator<Item = &Term>> = if forward {
                    Box::new(children.iter())
                } else {
                    Box::new(children.iter().rev())
                };
                iter.find_map(|c| match c.locate(seg, forward) {
                    Locate::Exhausted => None,
                    other => Some(other),
                })
                .unwrap_or(Locate::Exhausted)
            }
        }
    }

    /// The nearest admitted edge strictly beyond `seg` in the scan
    /// direction, or `None` when the term has nothing further.
    fn advance(&self, seg: &[u8], forward: bool) -> Option<SeekEdge> {
        match self {
            Term::All => Some(SeekEdge {
                encoded: SmallVec::from_slice(seg),
                inclusive: false,
            }),
            Term::Simple { encoded, .. } => {
                let ahead = if forward {
                    seg < encoded.as_slice()
                } else {
                    seg > encoded.as_slice()
                };
                ahead.then(|| SeekEdge {
                    encoded: SmallVec::from_slice(encoded),
                    inclusive: true,
                })
            }
            Term::Range { .. } => {
                let (behind, ahead_edge, limit_edge) = if forward {
                    (self.below(seg), self.lower_edge(), self.upper_edge())
                } else {
                    (self.above(seg), self.upper_edge(), self.lower_edge())
                };
                if behind {
                    let (edge, inclusive) = ahead_edge;
                    return Some(SeekEdge {
                        encoded: SmallVec::from_slice(edge.expect("behind implies closed bound")),
                        inclusive,
                    });
                }
                let past_limit = if forward {
                    self.above(seg)
                } else {
                    self.below(seg)
                };
                if past_limit {
                    return None;
                }
                // Inside the range: nudge strictly past the current
                // segment, unless it already sits on the closed limit.
                match limit_edge {
                    (Some(limit), _) if seg == limit => None,
                    _ => Some(SeekEdge {
                        encoded: SmallVec::from_slice(seg),
                        inclusive: false,
                    }),
                }
            }
            Term::Or(children) => {
                let mut iter: Box<dyn Iterator<Item = &Term>> = if forward {
                    Box::new(children.iter())
                } else {
                    Box::new(children.iter().rev())
                };
                iter.find_map(|c| c.advance(seg, forward))
            }
        }
    }

    /// The outermost admitted edge (lowest for forward, highest for
    /// backward), or `None` when that side is unbounded.
    fn outer_edge(&self, forward: bool) -> Option<SeekEdge> {
        let (edge, inclusive) = if forward {
            self.lower_edge()
        } else {
            self.upper_edge()
        };
        edge.map(|e| SeekEdge {
            encoded: SmallVec::from_slice(e),
            inclusive,
        })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::All => write!(f, "*"),
            Term::Simple { value, .. } => write!(f, "{value}"),
            Term::Range { lo, hi } => {
                let lo_excl = lo.as_ref().is_some_and(|b| !b.inclusive);
                let hi_excl = hi.as_ref().is_some_and(|b| !b.inclusive);
                if lo_excl || hi_excl {
                    write!(f, "{}", if lo_excl { '(' } else { '[' })?;
                }
                if let Some(b) = lo {
                    write!(f, "{}", b.value)?;
                }
                write!(f, ":")?;
                if let Some(b) = hi {
                    write!(f, "{}", b.value)?;
                }
                if lo_excl || hi_excl {
                    write!(f, "{}", if hi_excl { ')' } else { ']' })?;
                }
                Ok(())
            }
            Term::Or(children) => {
                write!(f, "{{")?;
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

static ALL: Term = Term::All;

/// A compiled multi-level key selection predicate with forward/backward
/// navigation. Immutable; mutators return new filters.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    terms: Arc<[Term]>,
    min_depth: usize,
    max_depth: usize,
}

impl Default for KeyFilter {
    fn default() -> Self {
        KeyFilter::new()
    }
}

impl KeyFilter {
    /// An empty filter. Matches nothing until terms are appended or a
    /// depth window is set.
    pub fn new() -> KeyFilter {
        KeyFilter {
            terms: Arc::from(Vec::new()),
            min_depth: 0,
            max_depth: 0,
        }
    }

    /// A filter selecting exactly the given key: one simple term per
    /// segment, depth window pinned to the key's depth.
    pub fn from_key(key: &Key) -> KeyFilter {
        let mut terms = Vec::with_capacity(key.depth());
        let mut cursor = key.cursor();
        while cursor.has_next() {
            let seg = cursor.decode().expect("well-formed key");
            terms.push(Term::simple(seg));
        }
        let depth = terms.len();
        KeyFilter::from_parts(terms, depth, depth)
    }

    /// Parses the text form; see the module docs for the grammar. The
    /// error carries the byte offset of the first invalid character.
    pub fn parse(input: &str) -> Result<KeyFilter> {
        parser::parse(input)
    }

    pub(crate) fn from_parts(terms: Vec<Term>, min_depth: usize, max_depth: usize) -> KeyFilter {
        assert!(min_depth <= max_depth, "min_depth must not exceed max_depth");
        KeyFilter {
            terms: terms.into(),
            min_depth,
            max_depth,
        }
    }

    /// A new filter with `term` appended. When the depth window ended at
    /// the previous term count, it extends to cover the new term.
    pub fn append(&self, term: Term) -> KeyFilter {
        let mut terms = self.terms.to_vec();
        terms.push(term);
        let len = terms.len();
        let min_depth = if self.min_depth == len - 1 {
            len
        } else {
            self.min_depth
        };
        let max_depth = if self.max_depth == len - 1 {
            len
        } else {
            self.max_depth
        };
        KeyFilter::from_parts(terms, min_depth, max_depth)
    }

    /// Appends several terms in order.
    pub fn append_terms(&self, new_terms: &[Term]) -> KeyFilter {
        new_terms
            .iter()
            .fold(self.clone(), |f, t| f.append(t.clone()))
    }

    /// A new filter with the given depth window, sharing this filter's
    /// terms.
    pub fn limit(&self, min_depth: usize, max_depth: usize) -> KeyFilter {
        assert!(min_depth <= max_depth, "min_depth must not exceed max_depth");
        KeyFilter {
            terms: Arc::clone(&self.terms),
            min_depth,
            max_depth,
        }
    }

    pub fn min_depth(&self) -> usize {
        self.min_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The term governing depth `d`: an explicit term, or the wildcard
    /// tail beyond the term vector.
    fn term_at(&self, d: usize) -> &Term {
        self.terms.get(d).unwrap_or(&ALL)
    }

    /// Whether the key matches: every present depth admitted by its
    /// term and the key depth inside the window. Never errs.
    pub fn selected(&self, key: &Key) -> bool {
        if key.is_sentinel() {
            return false;
        }
        let depth = key.depth();
        if depth < self.min_depth || depth > self.max_depth {
            return false;
        }
        (0..depth).all(|d| {
            key.segment_bytes(d)
                .is_some_and(|seg| self.term_at(d).admits(seg))
        })
    }

    /// Rewrites a non-selected key into the next seek target in scan
    /// order, or returns `false` when the filter's domain is exhausted
    /// in that direction. See the module docs for the scan protocol.
    pub fn traverse(&self, key: &mut Key, forward: bool) -> bool {
        if self.max_depth == 0 {
            return false;
        }
        if key.is_before() || key.is_empty() {
            return forward && self.seek_first(key);
        }
        if key.is_after() {
            return !forward && self.seek_last(key);
        }
        let depth = key.depth();
        let mut d = 0usize;
        loop {
            if d >= self.max_depth {
                // Everything under this prefix is too deep.
                return if forward {
                    self.carry(key, self.max_depth - 1, true)
                } else {
                    // Land on the allowed prefix itself: its subtree
                    // sorts just above it.
                    key.truncate_to_depth(self.max_depth);
                    key.push_raw(SUBKEY_NUDGE);
                    true
                };
            }
            if d >= depth {
                // Every present segment matched; the key is too shallow.
                return if forward {
                    self.descend(key, d)
                } else if d == 0 {
                    false
                } else {
                    self.carry(key, d - 1, false)
                };
            }
            let term = self.term_at(d);
            let seg = key.segment_bytes(d).expect("depth checked");
            match term.locate(seg, forward) {
                Locate::Match => d += 1,
                Locate::Seek(edge) => {
                    apply_seek(key, d, &edge, forward);
                    return true;
                }
                Locate::Exhausted => {
                    return if d == 0 {
                        false
                    } else {
                        self.carry(key, d - 1, forward)
                    };
                }
            }
        }
    }

    /// Bubbles a carry up from depth `d`: find the nearest depth whose
    /// term still has admitted values beyond the current segment.
    fn carry(&self, key: &mut Key, mut d: usize, forward: bool) -> bool {
        loop {
            let edge = {
                let seg = key.segment_bytes(d).expect("carry below key depth");
                self.term_at(d).advance(seg, forward)
            };
            match edge {
                Some(edge) => {
                    apply_seek(key, d, &edge, forward);
                    return true;
                }
                None if d == 0 => return false,
                None => d -= 1,
            }
        }
    }

    /// Extends a fully-matching but too-shallow key toward `min_depth`.
    fn descend(&self, key: &mut Key, d: usize) -> bool {
        if d >= self.max_depth {
            return if d == 0 { false } else { self.carry(key, d - 1, true) };
        }
        match self.term_at(d).outer_edge(true) {
            Some(edge) => {
                apply_seek(key, d, &edge, true);
                true
            }
            // Open below: every deeper key under this prefix qualifies,
            // and they all sort just after the key as it stands.
            None => true,
        }
    }

    fn seek_first(&self, key: &mut Key) -> bool {
        key.clear();
        match self.term_at(0).outer_edge(true) {
            Some(edge) => {
                apply_seek(key, 0, &edge, true);
                true
            }
            None => true,
        }
    }

    fn seek_last(&self, key: &mut Key) -> bool {
        match self.term_at(0).outer_edge(false) {
            Some(edge) => {
                key.clear();
                apply_seek(key, 0, &edge, false);
                true
            }
            None => {
                key.set_after();
                true
            }
        }
    }
}

fn apply_seek(key: &mut Key, depth: usize, edge: &SeekEdge, forward: bool) {
    key.truncate_to_depth(depth);
    key.push_encoded(&edge.encoded);
    if forward {
        if !edge.inclusive {
            key.push_raw(SUBKEY_NUDGE);
        }
    } else if edge.inclusive {
        key.push_raw(SEGMENT_NUDGE_HIGH);
    }
}

impl PartialEq for KeyFilter {
    /// Semantic equality: same depth window and the same effective term
    /// at every governed depth (explicit trailing wildcards equal the
    /// implied tail).
    fn eq(&self, other: &KeyFilter) -> bool {
        if self.min_depth != other.min_depth || self.max_depth != other.max_depth {
            return false;
        }
        // Terms beyond max_depth are never consulted.
        let len = self
            .terms
            .len()
            .max(other.terms.len())
            .min(self.max_depth);
        (0..len).all(|d| self.term_at(d) == other.term_at(d))
    }
}

impl fmt::Display for KeyFilter {
    /// Canonical text form; `parse` round-trips it. Wildcards pad out to
    /// `max_depth` with a trailing `<` when the window is narrower or
    /// wider than the term vector, a single unmarked `*` tail denotes an
    /// unbounded window, and `>` marks `min_depth` when it differs from
    /// the printed position count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.terms.len();
        let (positions, limited, open_tail) = if self.max_depth == usize::MAX {
            // Trailing explicit wildcards are implied by the open tail.
            let trimmed = self.terms.iter().rev().skip_while(|t| matches!(t, Term::All)).count();
            (trimmed, false, true)
        } else if self.max_depth != len {
            (self.max_depth, true, false)
        } else {
            let all_tail = len > 0 && matches!(self.terms[len - 1], Term::All);
            (len, all_tail, false)
        };
        let total = positions + open_tail as usize;
        write!(f, "{{")?;
        for i in 0..positions {
            if i > 0 {
                write!(f, ",")?;
            }
            if self.min_depth >= 1 && self.min_depth != total && i + 1 == self.min_depth {
                write!(f, ">")?;
            }
            write!(f, "{}", self.term_at(i))?;
            if limited && i + 1 == positions {
                write!(f, "<")?;
            }
        }
        if open_tail {
            if positions > 0 {
                write!(f, ",")?;
            }
            write!(f, "*")?;
        }
        write!(f, "}}")
    }
}
