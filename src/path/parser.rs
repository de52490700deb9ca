//! Path expression parser
//!
//! Grammar (informal):
//!
//! ```text
//! path     := ['$'] ['.'] segment (('.' field) | bracket)*
//! segment  := field | bracket
//! field    := [^.\[]+
//! bracket  := '[' ( '*' | digits | quoted | '?(@.' subpath '==' literal ')' ) ']'
//! literal  := quoted | number | 'true' | 'false' | 'null'
//! ```
//!
//! The filter accepts exactly one equality predicate. `&&`, `||` and
//! comparison operators other than `==` are rejected.

use super::{PathError, Segment};
use serde_json::Value;

pub(super) fn parse(source: &str) -> Result<Vec<Segment>, PathError> {
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
    };
    parser.parse_path()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn parse_path(&mut self) -> Result<Vec<Segment>, PathError> {
        let mut segments = Vec::new();

        if self.peek() == Some('$') {
            self.pos += 1;
        }
        if self.peek() == Some('.') {
            self.pos += 1;
        }

        let mut expect_field = true;
        while let Some(c) = self.peek() {
            match c {
                '[' => {
                    segments.push(self.parse_bracket()?);
                    expect_field = false;
                }
                '.' => {
                    if expect_field {
                        return Err(self.error("empty field name"));
                    }
                    self.pos += 1;
                    expect_field = true;
                    if self.peek().is_none() {
                        return Err(self.error("path ends with '.'"));
                    }
                }
                ']' => return Err(self.error("unexpected ']'")),
                _ => {
                    if !expect_field {
                        return Err(self.error("expected '.' or '[' between segments"));
                    }
                    segments.push(Segment::Field(self.parse_identifier()));
                    expect_field = false;
                }
            }
        }

        Ok(segments)
    }

    fn parse_identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' || c == ']' {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_bracket(&mut self) -> Result<Segment, PathError> {
        self.expect('[')?;
        self.skip_whitespace();

        let segment = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Segment::Wildcard
            }
            Some('\'') | Some('"') => Segment::Field(self.parse_quoted()?),
            Some('?') => self.parse_filter()?,
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| self.error("array index out of range"))?;
                Segment::Index(index)
            }
            _ => return Err(self.error("expected '*', index, quoted key or filter")),
        };

        self.skip_whitespace();
        self.expect(']')?;
        Ok(segment)
    }

    fn parse_filter(&mut self) -> Result<Segment, PathError> {
        self.expect('?')?;
        self.expect('(')?;
        self.skip_whitespace();
        self.expect('@')?;
        self.expect('.')?;

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '=' || c == '!' || c == '<' || c == '>' || c == ')' || c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
        let field: String = self.chars[start..self.pos].iter().collect();
        if field.is_empty() || field.split('.').any(|part| part.is_empty()) {
            return Err(self.error("filter field must be a dotted name"));
        }

        self.skip_whitespace();
        if !(self.peek() == Some('=') && self.peek_at(1) == Some('=')) {
            return Err(self.error("filter supports only a single '==' predicate"));
        }
        self.pos += 2;
        self.skip_whitespace();

        let literal = self.parse_literal()?;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(self.error("filter supports only a single '==' predicate"));
        }
        self.pos += 1;

        Ok(Segment::Filter {
            field: field.split('.').map(|s| s.to_string()).collect(),
            literal,
        })
    }

    fn parse_literal(&mut self) -> Result<Value, PathError> {
        match self.peek() {
            Some('\'') | Some('"') => Ok(Value::String(self.parse_quoted()?)),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == ')' || c.is_whitespace() {
                        break;
                    }
                    self.pos += 1;
                }
                let token: String = self.chars[start..self.pos].iter().collect();
                match token.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => serde_json::from_str::<serde_json::Number>(&token)
                        .map(Value::Number)
                        .map_err(|_| self.error("filter literal must be quoted, numeric or boolean")),
                }
            }
            None => Err(self.error("missing filter literal")),
        }
    }

    fn parse_quoted(&mut self) -> Result<String, PathError> {
        let quote = self.peek().ok_or_else(|| self.error("expected quote"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated string")),
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), PathError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: &str) -> PathError {
        PathError {
            position: self.pos,
            message: message.to_string(),
        }
    }
}
