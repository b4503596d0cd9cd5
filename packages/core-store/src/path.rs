//! Backend-free path algebra over normalized segments.

use std::fmt;

use crate::glob::{has_drive_prefix, SegmentMatcher};
use crate::{Error, Result};

/// A normalized, always-relative sequence of path segments.
///
/// Segments are never empty, never `.` or `..`, and never contain a
/// separator. The empty sequence is the root of a backend.
///
/// `Segments` carries no backend; [`crate::Location`] binds one to a backend.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Segments {
    components: Vec<String>,
}

impl Segments {
    /// The root (empty) sequence.
    pub fn root() -> Self {
        Segments::default()
    }

    /// Build segments from raw parts.
    ///
    /// # Normalization
    ///
    /// - `\` is treated as `/`
    /// - Each part is split on `/`; `.` and empty segments are dropped
    /// - A part with a leading separator or a drive (`C:`) is rejected
    /// - Any `..` segment is rejected
    ///
    /// # Examples
    ///
    /// ```rust
    /// use storeloc_core::Segments;
    ///
    /// let s = Segments::parse([".", "a", "./b", "c/./d"]).unwrap();
    /// assert_eq!(s.parts(), ["a", "b", "c", "d"]);
    ///
    /// assert!(Segments::parse(["..", "x"]).is_err());
    /// assert!(Segments::parse(["/etc"]).is_err());
    /// ```
    pub fn parse<I, S>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut components = Vec::new();
        for part in parts {
            Self::split_into(part.as_ref(), &mut components)?;
        }
        Ok(Segments { components })
    }

    /// Parse a single `/`-separated string.
    pub fn parse_str(raw: &str) -> Result<Self> {
        Self::parse([raw])
    }

    fn split_into(raw: &str, out: &mut Vec<String>) -> Result<()> {
        let normalized = raw.replace('\\', "/");
        if normalized.starts_with('/') {
            return Err(Error::validation(format!(
                "absolute path not allowed: {}",
                raw
            )));
        }
        if has_drive_prefix(&normalized) {
            return Err(Error::validation(format!(
                "drive-rooted path not allowed: {}",
                raw
            )));
        }
        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::validation(format!(
                        "parent reference '..' not allowed: {}",
                        raw
                    )))
                }
                _ => out.push(segment.to_string()),
            }
        }
        Ok(())
    }

    /// Validate a single name (no separators, not empty, not `.`/`..`).
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::validation(format!("invalid name: '{}'", name)));
        }
        if name.contains(['/', '\\']) {
            return Err(Error::validation(format!(
                "name may not contain a separator: '{}'",
                name
            )));
        }
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn parts(&self) -> &[String] {
        &self.components
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// Append raw parts, validating them as construction does.
    pub fn join<I, S>(&self, parts: I) -> Result<Segments>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut components = self.components.clone();
        for part in parts {
            Self::split_into(part.as_ref(), &mut components)?;
        }
        Ok(Segments { components })
    }

    /// Append a single already-valid name.
    pub fn child(&self, name: &str) -> Result<Segments> {
        Self::validate_name(name)?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Segments { components })
    }

    /// Concatenate two sequences.
    #[must_use]
    pub fn concat(&self, other: &Segments) -> Segments {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        Segments { components }
    }

    /// The final segment, or `""` at the root.
    pub fn name(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// The final extension of [`Self::name`], including the dot.
    ///
    /// `"foo.tar.gz"` gives `".gz"`; `".bashrc"` and `"foo."` give `""`.
    pub fn suffix(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(i) if i > 0 && i < name.len() - 1 => &name[i..],
            _ => "",
        }
    }

    /// All extensions of [`Self::name`].
    ///
    /// `"foo.tar.gz"` gives `[".tar", ".gz"]`.
    pub fn suffixes(&self) -> Vec<String> {
        let name = self.name();
        if name.ends_with('.') {
            return Vec::new();
        }
        name.trim_start_matches('.')
            .split('.')
            .skip(1)
            .map(|s| format!(".{}", s))
            .collect()
    }

    /// [`Self::name`] without its final suffix.
    pub fn stem(&self) -> &str {
        let name = self.name();
        let suffix = self.suffix();
        &name[..name.len() - suffix.len()]
    }

    /// Everything but the last segment. The root is its own parent.
    #[must_use]
    pub fn parent(&self) -> Segments {
        let mut components = self.components.clone();
        components.pop();
        Segments { components }
    }

    /// Ancestors from nearest to the root, inclusive. Empty at the root.
    pub fn parents(&self) -> Vec<Segments> {
        (0..self.components.len())
            .rev()
            .map(|end| Segments {
                components: self.components[..end].to_vec(),
            })
            .collect()
    }

    /// Replace the last segment.
    pub fn with_name(&self, name: &str) -> Result<Segments> {
        if self.is_root() {
            return Err(Error::validation("root has an empty name"));
        }
        Self::validate_name(name)?;
        let mut components = self.components.clone();
        if let Some(last) = components.last_mut() {
            *last = name.to_string();
        }
        Ok(Segments { components })
    }

    /// Replace the final suffix. An empty suffix removes it.
    pub fn with_suffix(&self, suffix: &str) -> Result<Segments> {
        if self.is_root() {
            return Err(Error::validation("root has an empty name"));
        }
        if suffix.contains(['/', '\\']) {
            return Err(Error::validation(format!("invalid suffix '{}'", suffix)));
        }
        if !suffix.is_empty() && (!suffix.starts_with('.') || suffix == ".") {
            return Err(Error::validation(format!("invalid suffix '{}'", suffix)));
        }
        self.with_name(&format!("{}{}", self.stem(), suffix))
    }

    /// Replace the stem, keeping the final suffix.
    pub fn with_stem(&self, stem: &str) -> Result<Segments> {
        if self.is_root() {
            return Err(Error::validation("root has an empty name"));
        }
        self.with_name(&format!("{}{}", stem, self.suffix()))
    }

    pub fn has_prefix(&self, prefix: &Segments) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }

    /// Strip `prefix`, or `None` if it is not a prefix.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Segments) -> Option<Segments> {
        if self.has_prefix(prefix) {
            Some(Segments {
                components: self.components[prefix.components.len()..].to_vec(),
            })
        } else {
            None
        }
    }

    /// The suffix left after removing `base`, or a validation error.
    pub fn relative_to(&self, base: &Segments) -> Result<Segments> {
        self.strip_prefix(base).ok_or_else(|| {
            Error::validation(format!("'{}' is not relative to '{}'", self, base))
        })
    }

    /// Shell-style pure-path match, anchored on the right.
    ///
    /// ```rust
    /// use storeloc_core::Segments;
    ///
    /// let s = Segments::parse_str("a/b/c.txt").unwrap();
    /// assert!(s.matches("*.txt").unwrap());
    /// assert!(s.matches("a/*/c.txt").unwrap());
    /// assert!(!s.matches("a/*/*.bin").unwrap());
    /// ```
    pub fn matches(&self, pattern: &str) -> Result<bool> {
        let normalized = pattern.replace('\\', "/");
        if normalized.is_empty() {
            return Err(Error::validation("empty pattern"));
        }
        // Segments are always relative; an anchored pattern never matches.
        if normalized.starts_with('/') || has_drive_prefix(&normalized) {
            return Ok(false);
        }

        let pattern_parts: Vec<&str> = normalized
            .split('/')
            .filter(|p| !p.is_empty() && *p != ".")
            .collect();
        if pattern_parts.is_empty() {
            return Err(Error::validation(format!("empty pattern: {}", pattern)));
        }
        if pattern_parts.len() > self.components.len() {
            return Ok(false);
        }

        let offset = self.components.len() - pattern_parts.len();
        for (part, component) in pattern_parts.iter().zip(&self.components[offset..]) {
            // `**` carries no recursive meaning here
            let part = if *part == "**" { "*" } else { part };
            if !SegmentMatcher::new(part)?.is_match(component) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `/`-joined form, `"."` at the root.
    pub fn as_posix(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Segments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.components.join("/"))
        }
    }
}

impl std::ops::Index<usize> for Segments {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

/// Macro for building segments from a literal.
///
/// # Example
///
/// ```rust
/// use storeloc_core::segments;
///
/// let s = segments!("a/b/c");
/// assert_eq!(s.len(), 3);
/// ```
#[macro_export]
macro_rules! segments {
    ($s:expr) => {
        $crate::Segments::parse_str($s).expect("invalid segments literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_and_joins_parts() {
        let s = Segments::parse(["alpha/bravo", "charlie"]).unwrap();
        assert_eq!(s.parts(), ["alpha", "bravo", "charlie"]);
        assert_eq!(s.to_string(), "alpha/bravo/charlie");
    }

    #[test]
    fn parse_drops_dots_and_empties() {
        let s = Segments::parse([".", "a", "./b", "c/./d"]).unwrap();
        assert_eq!(s.parts(), ["a", "b", "c", "d"]);
        assert_eq!(segments!("a//b/"), segments!("a/b"));
    }

    #[test]
    fn parse_normalizes_backslashes() {
        assert_eq!(segments!("a\\b\\c"), segments!("a/b/c"));
    }

    #[test]
    fn parse_rejects_escapes() {
        assert!(Segments::parse(["..", "x"]).unwrap_err().is_validation());
        assert!(Segments::parse(["a/../b"]).unwrap_err().is_validation());
        assert!(Segments::parse(["/abs"]).unwrap_err().is_validation());
        assert!(Segments::parse(["a", "/abs"]).unwrap_err().is_validation());
        assert!(Segments::parse(["\\abs"]).unwrap_err().is_validation());
        assert!(Segments::parse(["C:/x"]).unwrap_err().is_validation());
        assert!(Segments::parse(["C:"]).unwrap_err().is_validation());
    }

    #[test]
    fn parts_roundtrip() {
        let s = segments!("x/y.tar.gz");
        assert_eq!(Segments::parse(s.parts()).unwrap(), s);
    }

    #[test]
    fn root_display_and_fixed_point() {
        let root = Segments::root();
        assert_eq!(root.to_string(), ".");
        assert_eq!(root.name(), "");
        assert_eq!(root.parent(), root);
        assert!(root.parents().is_empty());
    }

    #[test]
    fn parents_are_nearest_first() {
        let s = segments!("a/b/c");
        let parents: Vec<String> = s.parents().iter().map(|p| p.to_string()).collect();
        assert_eq!(parents, vec!["a/b", "a", "."]);
    }

    #[test]
    fn name_suffix_stem() {
        let s = segments!("dir/foo.tar.gz");
        assert_eq!(s.name(), "foo.tar.gz");
        assert_eq!(s.suffix(), ".gz");
        assert_eq!(s.suffixes(), vec![".tar", ".gz"]);
        assert_eq!(s.stem(), "foo.tar");

        let hidden = segments!(".bashrc");
        assert_eq!(hidden.suffix(), "");
        assert!(hidden.suffixes().is_empty());
        assert_eq!(hidden.stem(), ".bashrc");

        let trailing = segments!("foo.");
        assert_eq!(trailing.suffix(), "");
        assert!(trailing.suffixes().is_empty());
        assert_eq!(trailing.stem(), "foo.");

        let plain = segments!("README");
        assert_eq!(plain.suffix(), "");
        assert_eq!(plain.stem(), "README");
    }

    #[test]
    fn with_name_validates() {
        let s = segments!("a/b.txt");
        assert_eq!(s.with_name("c.md").unwrap(), segments!("a/c.md"));
        assert!(s.with_name("x/y").unwrap_err().is_validation());
        assert!(s.with_name("").unwrap_err().is_validation());
        assert!(s.with_name("..").unwrap_err().is_validation());
        assert!(Segments::root().with_name("x").unwrap_err().is_validation());
    }

    #[test]
    fn with_suffix_rules() {
        let s = segments!("a/file.txt");
        assert_eq!(s.with_suffix(".md").unwrap(), segments!("a/file.md"));
        assert_eq!(s.with_suffix("").unwrap(), segments!("a/file"));
        assert_eq!(s.with_suffix(".txt").unwrap().name(), s.name());
        assert!(s.with_suffix("md").unwrap_err().is_validation());
        assert!(s.with_suffix(".").unwrap_err().is_validation());
        assert!(s.with_suffix("./x").unwrap_err().is_validation());
        assert!(Segments::root().with_suffix(".x").unwrap_err().is_validation());
    }

    #[test]
    fn with_stem_keeps_final_suffix() {
        let s = segments!("file.tar.gz");
        assert_eq!(s.with_stem("changed").unwrap(), segments!("changed.gz"));
        assert!(Segments::root().with_stem("x").is_err());
    }

    #[test]
    fn join_revalidates() {
        let s = segments!("a");
        assert_eq!(s.join(["b/c"]).unwrap(), segments!("a/b/c"));
        assert_eq!(s.join(Vec::<&str>::new()).unwrap(), s);
        assert!(s.join([".."]).unwrap_err().is_validation());
        assert!(s.join(["/etc"]).unwrap_err().is_validation());
    }

    #[test]
    fn relative_to_and_prefixes() {
        let s = segments!("a/b/c");
        assert_eq!(s.relative_to(&segments!("a")).unwrap(), segments!("b/c"));
        assert_eq!(s.relative_to(&s).unwrap(), Segments::root());
        assert!(s.relative_to(&segments!("b")).unwrap_err().is_validation());
        assert!(s.has_prefix(&Segments::root()));
    }

    #[test]
    fn match_is_right_anchored() {
        let s = segments!("a/b/c.txt");
        assert!(s.matches("*.txt").unwrap());
        assert!(s.matches("c.*").unwrap());
        assert!(s.matches("b/c.txt").unwrap());
        assert!(s.matches("a/*/c.txt").unwrap());
        assert!(!s.matches("a/*/*.bin").unwrap());
        assert!(!s.matches("x/a/b/c.txt").unwrap());
        assert!(!s.matches("/a/b/c.txt").unwrap());
        assert!(s.matches("").is_err());
    }

    #[test]
    fn ordering_is_lexicographic_by_segment() {
        assert!(segments!("a/b") < segments!("a/c"));
        assert!(segments!("a") < segments!("a/b"));
    }
}
