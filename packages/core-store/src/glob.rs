//! Shell-style pattern matching over path segments.
//!
//! Two flavours share one segment matcher:
//!
//! - [`SegmentMatcher`] matches a single name with `*`, `?`, `[seq]` and
//!   `[!seq]`, the same rules `fnmatch` uses (case-sensitive, dotfiles
//!   included).
//! - [`GlobPattern`] is a left-anchored, multi-segment pattern for
//!   `glob`/`rglob`, where a `**` segment stands for zero or more
//!   directories.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

lazy_static! {
    static ref DRIVE_PREFIX: Regex = Regex::new(r"^[A-Za-z]:(/|$)").unwrap();
}

/// True if `raw` (already `/`-normalized) starts with a drive such as `C:`.
pub(crate) fn has_drive_prefix(raw: &str) -> bool {
    DRIVE_PREFIX.is_match(raw)
}

fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Translate an fnmatch pattern into an anchored regular expression.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    // Unterminated class is a literal bracket
                    out.push_str(r"\[");
                    continue;
                }

                let mut body = &chars[i..j];
                i = j + 1;
                let negated = body.first() == Some(&'!');
                if negated {
                    body = &body[1..];
                }
                let class = class_body(body);
                if class.is_empty() {
                    // only reversed ranges: nothing matches, or anything if negated
                    out.push_str(if negated { "." } else { r"[^\s\S]" });
                    continue;
                }
                out.push('[');
                if negated {
                    out.push('^');
                }
                out.push_str(&class);
                out.push(']');
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }

    out.push('$');
    out
}

/// Regex class contents for a bracket expression. Reversed ranges such as
/// `z-a` are dropped.
fn class_body(body: &[char]) -> String {
    fn push_escaped(out: &mut String, c: char) {
        if matches!(c, '\\' | '[' | ']' | '&' | '~' | '^' | '-') {
            out.push('\\');
        }
        out.push(c);
    }

    let mut out = String::new();
    let mut k = 0;
    while k < body.len() {
        if k + 2 < body.len() && body[k + 1] == '-' {
            let (lo, hi) = (body[k], body[k + 2]);
            k += 3;
            if lo <= hi {
                push_escaped(&mut out, lo);
                out.push('-');
                push_escaped(&mut out, hi);
            }
            continue;
        }
        push_escaped(&mut out, body[k]);
        k += 1;
    }
    out
}

/// Matches one path segment against a shell pattern.
#[derive(Debug, Clone)]
pub enum SegmentMatcher {
    Literal(String),
    Wildcard(Regex),
}

impl SegmentMatcher {
    /// Compile a single-segment pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        if !has_magic(pattern) {
            return Ok(SegmentMatcher::Literal(pattern.to_string()));
        }
        Regex::new(&translate(pattern))
            .map(SegmentMatcher::Wildcard)
            .map_err(|e| Error::validation(format!("bad pattern '{}': {}", pattern, e)))
    }

    pub fn is_match(&self, name: &str) -> bool {
        match self {
            SegmentMatcher::Literal(lit) => lit == name,
            SegmentMatcher::Wildcard(re) => re.is_match(name),
        }
    }
}

#[derive(Debug, Clone)]
enum GlobSegment {
    /// `**`: zero or more directories.
    AnyDepth,
    One(SegmentMatcher),
}

/// A parsed `glob`/`rglob` pattern.
///
/// Patterns are always relative to the location they are applied to.
/// Absolute, drive-rooted and `..`-bearing patterns are rejected up front,
/// so no adapter can be asked to look outside its root.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    segments: Vec<GlobSegment>,
}

impl GlobPattern {
    /// Parse a glob pattern.
    ///
    /// ```rust
    /// use storeloc_core::GlobPattern;
    ///
    /// let pattern = GlobPattern::parse("a/*.txt").unwrap();
    /// assert!(pattern.matches(&["a", "1.txt"], false));
    /// assert!(GlobPattern::parse("/etc/*").is_err());
    /// ```
    pub fn parse(pattern: &str) -> Result<Self> {
        let normalized = pattern.replace('\\', "/");
        if normalized.is_empty() {
            return Err(Error::validation("empty glob pattern"));
        }
        if normalized.starts_with('/') || has_drive_prefix(&normalized) {
            return Err(Error::validation(format!(
                "non-relative glob pattern: {}",
                pattern
            )));
        }

        let mut segments = Vec::new();
        for part in normalized.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(Error::validation(format!(
                        "glob pattern may not contain '..': {}",
                        pattern
                    )))
                }
                "**" => {
                    // Consecutive `**` collapse to one
                    if !matches!(segments.last(), Some(GlobSegment::AnyDepth)) {
                        segments.push(GlobSegment::AnyDepth);
                    }
                }
                _ => segments.push(GlobSegment::One(SegmentMatcher::new(part)?)),
            }
        }

        if segments.is_empty() {
            return Err(Error::validation(format!(
                "glob pattern matches nothing: {}",
                pattern
            )));
        }

        Ok(GlobPattern {
            raw: normalized,
            segments,
        })
    }

    /// Parse `pattern` as a recursive glob, equivalent to `**/pattern`.
    pub fn recursive(pattern: &str) -> Result<Self> {
        let mut parsed = Self::parse(pattern)?;
        if !matches!(parsed.segments.first(), Some(GlobSegment::AnyDepth)) {
            parsed.segments.insert(0, GlobSegment::AnyDepth);
            parsed.raw = format!("**/{}", parsed.raw);
        }
        Ok(parsed)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if the pattern contains a `**` segment.
    pub fn is_recursive(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, GlobSegment::AnyDepth))
    }

    /// Deepest relative path that could match, or `None` when unbounded.
    pub fn max_depth(&self) -> Option<usize> {
        if self.is_recursive() {
            None
        } else {
            Some(self.segments.len())
        }
    }

    /// Match a path relative to the glob base.
    ///
    /// A pattern that ends in `**` only matches directories.
    pub fn matches<S: AsRef<str>>(&self, relative: &[S], is_dir: bool) -> bool {
        if relative.is_empty() {
            return false;
        }
        if matches!(self.segments.last(), Some(GlobSegment::AnyDepth)) && !is_dir {
            return false;
        }
        self.match_from(0, relative, 0)
    }

    fn match_from<S: AsRef<str>>(&self, pi: usize, relative: &[S], si: usize) -> bool {
        let Some(segment) = self.segments.get(pi) else {
            return si == relative.len();
        };
        match segment {
            GlobSegment::AnyDepth => {
                (si..=relative.len()).any(|next| self.match_from(pi + 1, relative, next))
            }
            GlobSegment::One(matcher) => {
                si < relative.len()
                    && matcher.is_match(relative[si].as_ref())
                    && self.match_from(pi + 1, relative, si + 1)
            }
        }
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
