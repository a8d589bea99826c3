//! Query language for the search box.
//!
//! Whitespace-separated tokens, case-insensitive prefixes:
//!
//! - `tag:<name>` includes files tagged `<name>`
//! - `-tag:<name>` or `NOT tag:<name>` excludes them
//! - anything else is free text
//!
//! A tag name runs until the next tag prefix or the end of the input, so
//! `tag:summer trip 2023` filters on the tag `summer trip 2023`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub name: String,
    pub excluded: bool,
}

impl TagFilter {
    pub fn include(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded: false,
        }
    }

    pub fn exclude(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded: true,
        }
    }
}

/// A search string split into free text and tag filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Remaining words joined by single spaces.
    pub text: String,
    /// Filters in the order they appeared.
    pub filters: Vec<TagFilter>,
}

impl ParsedQuery {
    pub fn included(&self) -> Vec<String> {
        self.filters
            .iter()
            .filter(|f| !f.excluded)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn excluded(&self) -> Vec<String> {
        self.filters
            .iter()
            .filter(|f| f.excluded)
            .map(|f| f.name.clone())
            .collect()
    }

    /// True for input that is only an exclusion being typed, `-` or `NOT`.
    pub fn is_unfinished_exclusion(&self) -> bool {
        self.filters.is_empty() && (self.text == "-" || self.text.eq_ignore_ascii_case("not"))
    }
}

/// Strips `prefix` from the start of `s`, ignoring ASCII case.
pub(crate) fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

/// Splits `query` into free text and tag filters in one left-to-right pass.
///
/// Tag prefixes with nothing after them (`tag:` at the end) produce no
/// filter. A `-` or `NOT` that does not start a tag prefix is an ordinary
/// word, so `Artist - Title` keeps its dash.
pub fn parse(query: &str) -> ParsedQuery {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let mut words: Vec<&str> = Vec::new();
    let mut filters = Vec::new();
    let mut current: Option<(bool, Vec<&str>)> = None;

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];

        let started = if let Some(rest) = strip_prefix_ci(token, "tag:") {
            Some((false, rest))
        } else if let Some(rest) = strip_prefix_ci(token, "-tag:") {
            Some((true, rest))
        } else if token.eq_ignore_ascii_case("not") {
            match tokens.get(i + 1).and_then(|next| strip_prefix_ci(next, "tag:")) {
                Some(rest) => {
                    i += 1;
                    Some((true, rest))
                }
                None => None,
            }
        } else {
            None
        };

        match started {
            Some((excluded, rest)) => {
                flush(&mut current, &mut filters);
                let mut parts = Vec::new();
                if !rest.is_empty() {
                    parts.push(rest);
                }
                current = Some((excluded, parts));
            }
            None => match current.as_mut() {
                Some((_, parts)) => parts.push(token),
                None => words.push(token),
            },
        }

        i += 1;
    }
    flush(&mut current, &mut filters);

    ParsedQuery {
        text: words.join(" "),
        filters,
    }
}

fn flush(current: &mut Option<(bool, Vec<&str>)>, filters: &mut Vec<TagFilter>) {
    if let Some((excluded, parts)) = current.take() {
        if !parts.is_empty() {
            filters.push(TagFilter {
                name: parts.join(" "),
                excluded,
            });
        }
    }
}
