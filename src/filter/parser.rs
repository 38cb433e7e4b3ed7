//! # Key Filter Text Form
//!
//! Hand-rolled recursive-descent parser for the filter grammar:
//!
//! ```text
//! filter   := '{' '}' | '{' position (',' position)* '}'
//! position := '>'? term '<'?                  ('<' only on the last)
//! term     := '*' | or | range | value
//! or       := '{' term (',' term)* '}'
//! range    := value? ':' value?
//!           | ('[' | '(') value? ':' value? (']' | ')')
//! value    := string | number | cast | 'true' | 'false' | 'null'
//! cast     := '(' ident ')' value              (int, long, float, double, string)
//! string   := '"' (char | escape)* '"'         (\" \\ \n \t \r \0)
//! number   := '-'? digits ('.' digits)? (('e'|'E') ('+'|'-')? digits)?
//! ```
//!
//! Whitespace is allowed between tokens. Bare ranges default to
//! inclusive bounds; brackets make exclusivity explicit. A `>` marks the
//! minimum depth at the following term's position; a trailing `<` pins
//! the maximum depth at the final position, while an unmarked trailing
//! `*` leaves it unbounded.
//!
//! Errors are reported as [`LarchError::FilterSyntax`] carrying the byte
//! offset of the first invalid character, which the management surface
//! translates to its offset-or-minus-one convention.

use eyre::Result;

use super::{KeyFilter, Term};
use crate::encoding::Segment;
use crate::error::LarchError;

pub(crate) fn parse(input: &str) -> Result<KeyFilter> {
    let mut p = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    let filter = p.parse_filter()?;
    p.skip_ws();
    if p.pos != p.bytes.len() {
        return p.fail(p.pos, "trailing characters after filter");
    }
    Ok(filter)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn fail<T>(&self, offset: usize, message: &str) -> Result<T> {
        Err(LarchError::FilterSyntax {
            offset,
            message: message.to_string(),
        }
        .into())
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.bump();
        }
    }

    fn parse_filter(&mut self) -> Result<KeyFilter> {
        self.skip_ws();
        if !self.eat(b'{') {
            return self.fail(self.pos, "filter must start with '{'");
        }
        self.skip_ws();
        if self.eat(b'}') {
            return Ok(KeyFilter::from_parts(Vec::new(), 0, 0));
        }
        let mut terms = Vec::new();
        let mut min_marker = None;
        let mut limited = false;
        loop {
            self.skip_ws();
            if self.eat(b'>') {
                min_marker = Some(terms.len() + 1);
                self.skip_ws();
            }
            terms.push(self.parse_term()?);
            self.skip_ws();
            if self.eat(b'<') {
                limited = true;
                self.skip_ws();
                if !self.eat(b'}') {
                    return self.fail(self.pos, "depth limit '<' must end the filter");
                }
                break;
            }
            if self.eat(b',') {
                continue;
            }
            if self.eat(b'}') {
                break;
            }
            return self.fail(self.pos, "expected ',', '<' or '}'");
        }
        let positions = terms.len();
        let max_depth = if limited {
            positions
        } else if matches!(terms.last(), Some(Term::All)) {
            usize::MAX
        } else {
            positions
        };
        let min_depth = min_marker.unwrap_or(positions);
        if min_depth > max_depth {
            return self.fail(self.pos, "minimum depth marker exceeds maximum depth");
        }
        Ok(KeyFilter::from_parts(terms, min_depth, max_depth))
    }

    fn parse_term(&mut self) -> Result<Term> {
        self.skip_ws();
        match self.peek() {
            Some(b'*') => {
                self.bump();
                Ok(Term::All)
            }
            Some(b'{') => {
                let start = self.pos;
                self.bump();
                let mut children = Vec::new();
                loop {
                    children.push(self.parse_term()?);
                    self.skip_ws();
                    if self.eat(b',') {
                        continue;
                    }
                    if self.eat(b'}') {
                        break;
                    }
                    return self.fail(self.pos, "expected ',' or '}' in or-term");
                }
                match Term::or(children) {
                    Ok(term) => Ok(term),
                    Err(e) => self.fail(start, &e.to_string()),
                }
            }
            Some(open @ (b'[' | b'(')) => {
                // A '(' opens a bracketed range only when it is not a
                // type cast like (float)1.3.
                if open == b'(' && self.looks_like_cast() {
                    self.parse_value_then_maybe_range()
                } else {
                    self.parse_bracketed_range(open)
                }
            }
            Some(b':') => {
                self.bump();
                self.skip_ws();
                let hi = if self.at_term_end() {
                    None
                } else {
                    Some(self.parse_value()?)
                };
                Ok(Term::range_with(None, hi, true, true))
            }
            Some(_) => self.parse_value_then_maybe_range(),
            None => self.fail(self.pos, "unexpected end of filter"),
        }
    }

    fn parse_bracketed_range(&mut self, open: u8) -> Result<Term> {
        let lo_inclusive = open == b'[';
        self.bump();
        self.skip_ws();
        let lo = if self.peek() == Some(b':') {
            None
        } else {
            Some(self.parse_value()?)
        };
        self.skip_ws();
        if !self.eat(b':') {
            return self.fail(self.pos, "expected ':' in range");
        }
        self.skip_ws();
        let hi = if matches!(self.peek(), Some(b']' | b')')) {
            None
        } else {
            Some(self.parse_value()?)
        };
        self.skip_ws();
        let hi_inclusive = match self.peek() {
            Some(b']') => true,
            Some(b')') => false,
            _ => return self.fail(self.pos, "expected ']' or ')' closing range"),
        };
        self.bump();
        Ok(Term::range_with(lo, hi, lo_inclusive, hi_inclusive))
    }

    fn parse_value_then_maybe_range(&mut self) -> Result<Term> {
        let value = self.parse_value()?;
        self.skip_ws();
        if self.eat(b':') {
            self.skip_ws();
            let hi = if self.at_term_end() {
                None
            } else {
                Some(self.parse_value()?)
            };
            Ok(Term::range_with(Some(value), hi, true, true))
        } else {
            Ok(Term::simple(value))
        }
    }

    fn at_term_end(&self) -> bool {
        matches!(self.peek(), None | Some(b',' | b'}' | b'<' | b']' | b')'))
    }

    fn looks_like_cast(&self) -> bool {
        debug_assert_eq!(self.peek(), Some(b'('));
        let mut i = self.pos + 1;
        while i < self.bytes.len() && self.bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        i > self.pos + 1 && self.bytes.get(i) == Some(&b')')
    }

    fn parse_value(&mut self) -> Result<Segment> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => Ok(Segment::Text(self.parse_string()?)),
            Some(b'(') => self.parse_cast(),
            Some(b't') => self.parse_keyword("true", Segment::Bool(true)),
            Some(b'f') => self.parse_keyword("false", Segment::Bool(false)),
            Some(b'n') => self.parse_keyword("null", Segment::Null),
            Some(b'-') | Some(b'0'..=b'9') => self.parse_number(NumericCast::None),
            Some(_) => self.fail(self.pos, "expected a literal value"),
            None => self.fail(self.pos, "unexpected end of filter"),
        }
    }

    fn parse_keyword(&mut self, word: &str, value: Segment) -> Result<Segment> {
        let start = self.pos;
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(value)
        } else {
            self.fail(start, "expected a literal value")
        }
    }

    fn parse_cast(&mut self) -> Result<Segment> {
        let start = self.pos;
        self.bump();
        let ident_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.bump();
        }
        let ident = &self.bytes[ident_start..self.pos];
        if !self.eat(b')') {
            return self.fail(self.pos, "expected ')' closing type cast");
        }
        self.skip_ws();
        match ident {
            b"int" | b"long" => self.parse_number(NumericCast::Int),
            b"float" => self.parse_number(NumericCast::Float),
            b"double" => self.parse_number(NumericCast::Double),
            b"string" => Ok(Segment::Text(self.parse_string()?)),
            _ => self.fail(start + 1, "unknown type cast"),
        }
    }

    fn parse_number(&mut self, cast: NumericCast) -> Result<Segment> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        let mut fractional = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.bump(),
                b'.' | b'e' | b'E' => {
                    fractional = true;
                    self.bump();
                    if matches!(self.peek(), Some(b'+' | b'-')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("numeric characters are ASCII");
        match cast {
            NumericCast::Int => match text.parse::<i64>() {
                Ok(v) => Ok(Segment::Int(v)),
                Err(_) => self.fail(start, "invalid integer literal"),
            },
            NumericCast::Float => match text.parse::<f32>() {
                Ok(v) => Ok(Segment::Float(v)),
                Err(_) => self.fail(start, "invalid float literal"),
            },
            NumericCast::Double => match text.parse::<f64>() {
                Ok(v) => Ok(Segment::Double(v)),
                Err(_) => self.fail(start, "invalid double literal"),
            },
            NumericCast::None => {
                if fractional {
                    match text.parse::<f64>() {
                        Ok(v) => Ok(Segment::Double(v)),
                        Err(_) => self.fail(start, "invalid numeric literal"),
                    }
                } else {
                    match text.parse::<i64>() {
                        Ok(v) => Ok(Segment::Int(v)),
                        Err(_) => self.fail(start, "invalid integer literal"),
                    }
                }
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let start = self.pos;
        if !self.eat(b'"') {
            return self.fail(self.pos, "expected '\"'");
        }
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return self.fail(start, "unterminated string"),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    let escaped = match self.peek() {
                        Some(b'"') => b'"',
                        Some(b'\\') => b'\\',
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'r') => b'\r',
                        Some(b'0') => b'\0',
                        _ => return self.fail(self.pos, "invalid string escape"),
                    };
                    out.push(escaped);
                    self.bump();
                }
                Some(b) => {
                    out.push(b);
                    self.bump();
                }
            }
        }
        String::from_utf8(out).map_or_else(
            |_| self.fail(start, "string is not valid UTF-8"),
            Ok,
        )
    }
}

#[derive(Clone, Copy)]
enum NumericCast {
    None,
    Int,
    Float,
    Double,
}
