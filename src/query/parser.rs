//! Query parser
//!
//! ```text
//! query     := and_expr ( OR and_expr )*
//! and_expr  := predicate ( AND predicate )*
//! predicate := field op values
//! field     := name | 'labels' '[' key ']'
//! op        := '=' | '!=' | '~='
//! values    := value ( ',' value )*      (single value for '~=')
//! value     := quoted | bare ['*']
//! ```
//!
//! `AND`/`OR` are case-insensitive keywords. There is no parenthetical
//! grouping.

use super::QueryError;
use super::ast::{Expr, Field, Matcher, Pattern, Predicate};
use regex::Regex;

pub(super) fn parse(source: &str) -> Result<Expr, QueryError> {
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
    };
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(parser.error("empty query"));
    }
    let expr = parser.parse_or()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("expected AND or OR"));
    }
    Ok(expr)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat_keyword("OR") {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let mut terms = vec![self.parse_predicate()?];
        while self.eat_keyword("AND") {
            terms.push(self.parse_predicate()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_predicate(&mut self) -> Result<Expr, QueryError> {
        self.skip_whitespace();
        let field = self.parse_field()?;
        self.skip_whitespace();

        let matcher = match (self.peek(), self.peek_at(1)) {
            (Some('!'), Some('=')) => {
                self.pos += 2;
                Matcher::NotEquals(self.parse_patterns()?)
            }
            (Some('~'), Some('=')) => {
                self.pos += 2;
                self.skip_whitespace();
                let start = self.pos;
                let (pattern, _) = self.parse_value(false)?;
                let regex = Regex::new(&pattern).map_err(|e| QueryError::Syntax {
                    position: start,
                    message: format!("invalid regex: {}", e),
                })?;
                Matcher::Regex(regex)
            }
            (Some('='), _) => {
                self.pos += 1;
                Matcher::Equals(self.parse_patterns()?)
            }
            _ => return Err(self.error("expected '=', '!=' or '~='")),
        };

        Ok(Expr::Predicate(Predicate { field, matcher }))
    }

    fn parse_field(&mut self) -> Result<Field, QueryError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        if name.is_empty() {
            return Err(self.error("expected field name"));
        }

        if name.eq_ignore_ascii_case("labels") || name.eq_ignore_ascii_case("label") {
            if self.peek() != Some('[') {
                return Err(self.error("expected '[' after labels"));
            }
            self.pos += 1;
            let key = match self.peek() {
                Some('"') | Some('\'') => self.parse_quoted()?,
                _ => {
                    let key_start = self.pos;
                    while self.peek().is_some_and(|c| c != ']') {
                        self.pos += 1;
                    }
                    self.chars[key_start..self.pos]
                        .iter()
                        .collect::<String>()
                        .trim()
                        .to_string()
                }
            };
            if self.peek() != Some(']') {
                return Err(self.error("expected ']'"));
            }
            self.pos += 1;
            if key.is_empty() {
                return Err(QueryError::Syntax {
                    position: start,
                    message: "empty label key".to_string(),
                });
            }
            return Ok(Field::Label(key));
        }

        Field::from_name(&name).ok_or_else(|| QueryError::Syntax {
            position: start,
            message: format!(
                "unknown field '{}' (expected kind, namespace, name, owner, status, cluster, drift or labels[key])",
                name
            ),
        })
    }

    fn parse_patterns(&mut self) -> Result<Vec<Pattern>, QueryError> {
        self.skip_whitespace();
        let mut patterns = Vec::new();
        loop {
            let (value, quoted) = self.parse_value(true)?;
            let pattern = if self.peek() == Some('*') {
                self.pos += 1;
                Pattern::Prefix(value)
            } else if !quoted && value.ends_with('*') {
                Pattern::Prefix(value.trim_end_matches('*').to_string())
            } else {
                Pattern::Exact(value)
            };
            patterns.push(pattern);

            if self.peek() == Some(',') {
                self.pos += 1;
                continue;
            }
            return Ok(patterns);
        }
    }

    /// Read a quoted string or a bare word; returns the text and whether it was quoted
    fn parse_value(&mut self, stop_at_comma: bool) -> Result<(String, bool), QueryError> {
        match self.peek() {
            Some('"') | Some('\'') => Ok((self.parse_quoted()?, true)),
            Some(c) if !c.is_whitespace() => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || (stop_at_comma && c == ',') {
                        break;
                    }
                    self.pos += 1;
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                if value.is_empty() {
                    return Err(self.error("expected value"));
                }
                Ok((value, false))
            }
            _ => Err(self.error("expected value")),
        }
    }

    fn parse_quoted(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        let quote = self.peek().ok_or_else(|| self.error("expected quote"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(QueryError::Syntax {
                        position: start,
                        message: "unterminated string".to_string(),
                    });
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(c) = self.peek() {
                        out.push(c);
                        self.pos += 1;
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

    /// Consume `keyword` if it is the next whole word
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let save = self.pos;
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let boundary = self.peek().is_none_or(|c| c.is_whitespace());
        if boundary && word.eq_ignore_ascii_case(keyword) {
            true
        } else {
            self.pos = save;
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: &str) -> QueryError {
        QueryError::Syntax {
            position: self.pos,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_binds_tighter() {
        let expr = parse("kind=Pod OR owner=Flux AND namespace=prod").unwrap();
        match expr {
            Expr::Or(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(terms[1], Expr::And(_)));
            }
            other => panic!("expected OR, got {:?}", other),
        }
    }

    #[test]
    fn test_lowercase_keywords_and_spacing() {
        let expr = parse("owner = Flux and namespace != kube-system").unwrap();
        assert_eq!(expr.to_string(), "owner=Flux AND namespace!=kube-system");
    }

    #[test]
    fn test_lists_prefixes_and_labels() {
        let expr = parse(r#"owner=Flux,ArgoCD AND labels[app.kubernetes.io/name]=redis* AND name="a b""#)
            .unwrap();
        assert_eq!(
            expr.to_string(),
            r#"owner=Flux,ArgoCD AND labels[app.kubernetes.io/name]=redis* AND name="a b""#
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = parse("kind=Pod AND").unwrap_err();
        assert!(matches!(err, QueryError::Syntax { .. }));

        match parse("colour=red").unwrap_err() {
            QueryError::Syntax { position, .. } => assert_eq!(position, 0),
            other => panic!("unexpected {:?}", other),
        }

        assert!(parse("name~=[unclosed").is_err());
        assert!(parse("kind Pod").is_err());
        assert!(parse("").is_err());
        assert!(parse("kind=Pod XOR name=a").is_err());
        assert!(parse("labels[]=x").is_err());
    }
}
