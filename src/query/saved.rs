//! Saved queries
//!
//! A saved query is referenced as `@name` where a predicate may start: at
//! the beginning of the query or right after `AND`/`OR`. An `@` anywhere
//! else, as in `name=user@example`, is part of a value.
//! Expansion is textual: `@gitops AND kind=Deployment` becomes the saved
//! text spliced in place. Because there is no grouping, a saved query that
//! contains `OR` keeps its own precedence only when it is the whole query
//! or when it is combined with `OR`.

use super::QueryError;
use std::collections::BTreeMap;

/// Named query texts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedQueries {
    queries: BTreeMap<String, String>,
}

impl SavedQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries available without any configuration
    pub fn with_builtins() -> Self {
        let mut saved = Self::new();
        saved.insert("gitops", "owner=Flux,ArgoCD,ConfigHub");
        saved.insert("unmanaged", "owner=Unknown");
        saved.insert("helm", "owner=Helm");
        saved.insert("native", "owner=Native");
        saved.insert("drifted", "drift=drifted");
        saved.insert("not-ready", "status=NotReady");
        saved
    }

    pub fn insert(&mut self, name: impl Into<String>, query: impl Into<String>) {
        self.queries.insert(name.into(), query.into());
    }

    /// Add `other`, overriding entries with the same name
    pub fn merge(&mut self, other: &BTreeMap<String, String>) {
        for (name, query) in other {
            self.queries.insert(name.clone(), query.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.queries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Replace every predicate-position `@name` outside quotes with its saved text
    ///
    /// A query consisting solely of a saved name (without `@`) also expands.
    pub fn expand(&self, text: &str) -> Result<String, QueryError> {
        let trimmed = text.trim();
        if let Some(query) = self.get(trimmed) {
            return self.expand_inner(query, &mut vec![trimmed.to_string()]);
        }
        self.expand_inner(text, &mut Vec::new())
    }

    fn expand_inner(&self, text: &str, stack: &mut Vec<String>) -> Result<String, QueryError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match quote {
                Some(q) => {
                    out.push(c);
                    if c == '\\' {
                        if let Some(&next) = chars.get(i + 1) {
                            out.push(next);
                            i += 1;
                        }
                    } else if c == q {
                        quote = None;
                    }
                    i += 1;
                }
                None if c == '"' || c == '\'' => {
                    quote = Some(c);
                    out.push(c);
                    i += 1;
                }
                None if c == '@' && at_predicate_start(&out) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_name_char(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    if name.is_empty() {
                        return Err(QueryError::Syntax {
                            position: i,
                            message: "expected saved query name after '@'".to_string(),
                        });
                    }
                    if stack.contains(&name) {
                        let mut chain = stack.clone();
                        chain.push(name);
                        return Err(QueryError::SavedQueryCycle(chain.join(" -> ")));
                    }
                    let body = self
                        .get(&name)
                        .ok_or_else(|| QueryError::UnknownSavedQuery(name.clone()))?;

                    stack.push(name);
                    let expanded = self.expand_inner(body, stack)?;
                    stack.pop();

                    out.push_str(expanded.trim());
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        Ok(out)
    }
}

/// Nothing but whitespace, or a trailing `AND`/`OR` keyword, precedes this point
fn at_predicate_start(before: &str) -> bool {
    let before = before.trim_end();
    let last_word = before
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default();
    before.is_empty()
        || last_word.eq_ignore_ascii_case("and")
        || last_word.eq_ignore_ascii_case("or")
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_expansion() {
        let saved = SavedQueries::with_builtins();
        assert_eq!(
            saved.expand("@gitops AND kind=Deployment").unwrap(),
            "owner=Flux,ArgoCD,ConfigHub AND kind=Deployment"
        );
        assert_eq!(saved.expand("unmanaged").unwrap(), "owner=Unknown");
    }

    #[test]
    fn test_at_inside_quotes_is_literal() {
        let saved = SavedQueries::with_builtins();
        assert_eq!(
            saved.expand(r#"name="@gitops""#).unwrap(),
            r#"name="@gitops""#
        );
    }

    #[test]
    fn test_at_inside_value_is_literal() {
        let saved = SavedQueries::with_builtins();
        assert_eq!(
            saved.expand("name=user@example").unwrap(),
            "name=user@example"
        );
        assert_eq!(
            saved.expand("name=a@b or @helm").unwrap(),
            "name=a@b or owner=Helm"
        );
        assert_eq!(
            saved.expand("kind=Pod AND  @native").unwrap(),
            "kind=Pod AND  owner=Native"
        );
    }

    #[test]
    fn test_nested_and_unknown() {
        let mut saved = SavedQueries::new();
        saved.insert("prod", "namespace=prod*");
        saved.insert("prod-flux", "@prod AND owner=Flux");
        assert_eq!(
            saved.expand("@prod-flux").unwrap(),
            "namespace=prod* AND owner=Flux"
        );
        assert_eq!(
            saved.expand("@missing").unwrap_err(),
            QueryError::UnknownSavedQuery("missing".to_string())
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut saved = SavedQueries::new();
        saved.insert("a", "@b");
        saved.insert("b", "@a");
        match saved.expand("@a").unwrap_err() {
            QueryError::SavedQueryCycle(chain) => assert_eq!(chain, "a -> b -> a"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
