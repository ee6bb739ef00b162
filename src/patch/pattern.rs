//! Glob-style name patterns.
//!
//! A pattern list is a `;`-separated string such as `"MyApp.*Options;MyApp.Service::Run"`.
//! Every segment is matched against the whole name, case-sensitively; `*` stands for any run of
//! characters (including none) and every other character matches itself. A name matches the
//! list if it matches any segment.

use std::fmt;

use log::debug;
use regex::Regex;

use crate::model::MemberRef;

/// Separator between the patterns of a list
pub const PATTERN_SEPARATOR: char = ';';

/// The pattern that accepts every name
pub const MATCH_ALL: &str = "*";

#[derive(Clone, Debug)]
enum Matcher {
    Regex(Regex),
    // Used if the combined expression outgrows the regex size limit
    Glob(Vec<String>),
}

/// A compiled pattern list.
///
/// # Examples
///
/// ```rust
/// use dotpatch::patch::NamePredicate;
///
/// let predicate = NamePredicate::compile(Some("MyApp.*Options; MyApp.Legacy"));
/// assert!(predicate.matches("MyApp.FooOptions"));
/// assert!(predicate.matches("MyApp.Legacy"));
/// assert!(!predicate.matches("MyApp.Bar"));
///
/// // An absent or blank list accepts everything
/// assert!(NamePredicate::compile(None).matches("Anything"));
/// assert!(NamePredicate::compile(Some(" ; ")).is_match_all());
/// ```
#[derive(Clone, Debug)]
pub struct NamePredicate {
    patterns: Vec<String>,
    matcher: Matcher,
}

impl NamePredicate {
    /// Compile a pattern list. Never fails: segments are trimmed, empty segments dropped, and a
    /// list without any segment left becomes [`MATCH_ALL`].
    #[must_use]
    pub fn compile(patterns: Option<&str>) -> NamePredicate {
        let mut segments: Vec<String> = patterns
            .unwrap_or_default()
            .split(PATTERN_SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            segments.push(MATCH_ALL.to_string());
        }

        let alternatives: Vec<String> = segments.iter().map(|segment| glob_to_regex(segment)).collect();
        let expression = format!("^(?:{})$", alternatives.join("|"));

        let matcher = match Regex::new(&expression) {
            Ok(regex) => Matcher::Regex(regex),
            Err(error) => {
                debug!(
                    "Matching {} patterns one by one - {}",
                    segments.len(),
                    error
                );
                Matcher::Glob(segments.clone())
            }
        };

        NamePredicate {
            patterns: segments,
            matcher,
        }
    }

    /// A predicate that accepts every name
    #[must_use]
    pub fn match_all() -> NamePredicate {
        Self::compile(None)
    }

    /// True if `name` matches at least one pattern
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(regex) => regex.is_match(name),
            Matcher::Glob(globs) => globs.iter().any(|glob| glob_matches(glob, name)),
        }
    }

    /// Match a member by its `Type::Member` name
    #[must_use]
    pub fn matches_member(&self, member: &MemberRef<'_>) -> bool {
        self.matches(&member.qualified_name())
    }

    /// True if some pattern consists of `*` only, and so accepts every name
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.chars().all(|c| c == '*'))
    }

    /// The effective patterns, after trimming and defaulting
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for NamePredicate {
    fn default() -> Self {
        Self::match_all()
    }
}

impl fmt::Display for NamePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.patterns.join(";"))
    }
}

fn glob_to_regex(glob: &str) -> String {
    glob.split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

/// Match `name` against a single glob without building an expression
fn glob_matches(glob: &str, name: &str) -> bool {
    let mut pieces = glob.split('*');
    let Some(first) = pieces.next() else {
        return name.is_empty();
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };

    let pieces: Vec<&str> = pieces.collect();
    let Some((last, middle)) = pieces.split_last() else {
        // No `*` at all
        return rest.is_empty();
    };

    for piece in middle {
        match rest.find(piece) {
            Some(position) => rest = &rest[position + piece.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}
