//! Case-insensitive, multi-valued HTTP header map.
//!
//! Header names are compared without regard to ASCII case, but the casing a name was
//! first written with is kept for display and for the wire. Iteration is ordered by the
//! lower-cased name, and yields one `(name, value)` pair per value.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use crate::Error;

/// Well-known header names used by the engine.
pub mod names {
    /// `Host`
    pub const HOST: &str = "Host";
    /// `Content-Length`
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// `Content-Type`
    pub const CONTENT_TYPE: &str = "Content-Type";
}

/// Returns true if `c` may appear in a header name (an RFC 2616 token).
///
/// Any CHAR except CTLs or separators.
pub fn is_token_char(c: char) -> bool {
    match c {
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?'
        | '=' | '{' | '}' | ' ' | '\t' => false,
        c => ('\x21'..'\x7f').contains(&c),
    }
}

/// Returns true if `name` is a non-empty token.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_token_char)
}

/// Returns true if `value` is a valid field value: any octet except CTLs, though
/// space and tab are allowed.
pub fn is_valid_value(value: &str) -> bool {
    value
        .chars()
        .all(|c| c == ' ' || c == '\t' || (('\x21'..='\u{ff}').contains(&c) && c != '\x7f'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<String>,
}

/// A case-insensitive map from header names to one or more values.
#[derive(Clone, Default)]
pub struct HeaderMap {
    entries: BTreeMap<String, Entry>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(name: &str, value: &str) -> Result<(), Error> {
        if !is_valid_name(name) {
            return Err(Error::InvalidHeaderName(name.into()));
        }
        if !is_valid_value(value) {
            return Err(Error::InvalidHeaderValue {
                name: name.into(),
                value: value.into(),
            });
        }
        Ok(())
    }

    /// Set `name` to the single value `value`, replacing any previous values.
    ///
    /// The new casing of `name` replaces the old one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        let value = value.into();
        Self::validate(&name, &value)?;
        self.entries.insert(
            name.to_ascii_lowercase(),
            Entry {
                name,
                values: vec![value],
            },
        );
        Ok(())
    }

    /// Add `value` to the values for `name`, after any existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        let value = value.into();
        Self::validate(&name, &value)?;
        match self.entries.entry(name.to_ascii_lowercase()) {
            btree_map::Entry::Occupied(mut entry) => entry.get_mut().values.push(value),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(Entry {
                    name,
                    values: vec![value],
                });
            }
        }
        Ok(())
    }

    /// The single value for `name`, if there is one.
    ///
    /// Fails if the header has more than one value.
    pub fn get(&self, name: &str) -> Result<Option<&str>, Error> {
        match self.entries.get(&name.to_ascii_lowercase()) {
            None => Ok(None),
            Some(entry) if entry.values.len() > 1 => Err(Error::MultipleValues(entry.name.clone())),
            Some(entry) => Ok(entry.values.first().map(String::as_str)),
        }
    }

    /// All values for `name`, in insertion order. Empty if the header is absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|entry| entry.values.as_slice())
            .unwrap_or_default()
    }

    /// Whether any value is present for `name`.
    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove `name`, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|entry| entry.values)
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a map by appending each `(name, value)` pair in order.
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name, value)?;
        }
        Ok(map)
    }

    /// Iterate over `(name, value)` pairs, one per value, ordered by lower-cased name.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            entries: self.entries.values(),
            current: None,
        }
    }
}

impl PartialEq for HeaderMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.values == b.values)
    }
}

impl Eq for HeaderMap {}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.values().map(|e| (&e.name, &e.values)))
            .finish()
    }
}

/// Iterator over the `(name, value)` pairs of a [`HeaderMap`].
#[derive(Debug)]
pub struct Iter<'a> {
    entries: btree_map::Values<'a, String, Entry>,
    current: Option<(&'a str, std::slice::Iter<'a, String>)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((name, values)) = &mut self.current {
                if let Some(value) = values.next() {
                    return Some((*name, value.as_str()));
                }
            }
            let entry = self.entries.next()?;
            self.current = Some((entry.name.as_str(), entry.values.iter()));
        }
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for HeaderMap {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .into_values()
            .flat_map(|entry| {
                let name = entry.name;
                entry.values.into_iter().map(move |v| (name.clone(), v))
            })
            .collect::<Vec<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain").unwrap();

        assert_eq!(headers.get("content-type").unwrap(), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE").unwrap(), Some("text/plain"));
        assert_eq!(headers.get_all("content-type"), ["text/plain"]);
        assert!(headers.contains_key("cOnTeNt-TyPe"));
    }

    #[test]
    fn append_keeps_order_and_first_casing() {
        let mut headers = HeaderMap::new();
        headers.append("Accept", "text/html").unwrap();
        headers.append("accept", "application/json").unwrap();

        assert_eq!(headers.get_all("ACCEPT"), ["text/html", "application/json"]);
        assert!(matches!(
            headers.get("accept"),
            Err(Error::MultipleValues(name)) if name == "Accept"
        ));

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(
            pairs,
            vec![("Accept", "text/html"), ("Accept", "application/json")]
        );
    }

    #[test]
    fn insert_replaces() {
        let mut headers = HeaderMap::new();
        headers.append("host", "a").unwrap();
        headers.append("host", "b").unwrap();
        headers.insert("Host", "c").unwrap();

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec![("Host", "c")]);
    }

    #[test]
    fn iteration_is_sorted_by_lowercase_name() {
        let headers = HeaderMap::from_pairs(vec![
            ("X-Zed", "1"),
            ("accept", "2"),
            ("Host", "3"),
        ])
        .unwrap();

        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["accept", "Host", "X-Zed"]);
    }

    #[test]
    fn equality_ignores_name_case() {
        let a = HeaderMap::from_pairs(vec![("Content-Length", "5")]).unwrap();
        let b = HeaderMap::from_pairs(vec![("content-length", "5")]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_invalid_names_and_values() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            headers.insert("Bad Name", "x"),
            Err(Error::InvalidHeaderName(_))
        ));
        assert!(matches!(
            headers.insert("", "x"),
            Err(Error::InvalidHeaderName(_))
        ));
        assert!(matches!(
            headers.insert("X-Test", "line\r\nbreak"),
            Err(Error::InvalidHeaderValue { .. })
        ));
        assert!(headers.insert("X-Test", "tab\tand space").is_ok());
        assert!(headers.insert("X-Latin", "caf\u{e9}").is_ok());
        assert!(headers.insert("X-Wide", "\u{263a}").is_err());
    }

    #[test]
    fn remove_returns_values() {
        let mut headers = HeaderMap::from_pairs(vec![("A", "1"), ("a", "2")]).unwrap();
        assert_eq!(headers.remove("A"), Some(vec!["1".into(), "2".into()]));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("A"), None);
    }
}
