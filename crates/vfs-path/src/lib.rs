#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Path normalization, segment iteration, cross-namespace path conversion,
//! and glob-filter compilation.
//!
//! A **path** is a slash-delimited, forward-slash string. The empty string
//! `""` is the root. A trailing `/` denotes a directory; its absence denotes
//! a file except at the root. Leading and trailing separators are
//! semantically significant and are never trimmed by this crate — back-ends
//! decide whether empty segments (`"//"`) are legal, and case sensitivity is
//! back-end-declared rather than assumed globally.
//!
//! # Design
//!
//! [`VPath`] is a thin newtype over `String` giving `Display`, `Hash`, and a
//! [`segments`](VPath::segments) iterator without imposing any normalization
//! beyond what callers ask for explicitly. [`PathConverter`] rewrites a child
//! back-end's paths into the parent VFS namespace (or back), used both by
//! the mount tree's `sub-path` reshaping and by the observer network's event
//! splicing. [`GlobFilter`] compiles an observer's subscription pattern into
//! a matcher plus its literal prefix depth.
//!
//! # Invariants
//!
//! - [`PathConverter::convert`] fails with [`vfs_error::VfsError::PathInvalid`]
//!   when the input path is not under the converter's source root; it never
//!   silently truncates.
//! - A [`GlobFilter`] matches whole paths, never segments in isolation.
//!
//! # Errors
//!
//! [`GlobFilter::compile`] returns [`vfs_error::VfsError::PathInvalid`] for a
//! malformed pattern.

use std::fmt;

use vfs_error::{VfsError, VfsResult};

/// Case sensitivity for path comparisons, declared by the owning back-end
/// rather than assumed globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaseSensitivity {
    /// Paths are compared byte-for-byte.
    #[default]
    Sensitive,
    /// Paths are compared case-insensitively (ASCII folding).
    Insensitive,
}

impl CaseSensitivity {
    /// Compares two path strings under this case-sensitivity rule.
    #[must_use]
    pub fn eq(self, a: &str, b: &str) -> bool {
        match self {
            Self::Sensitive => a == b,
            Self::Insensitive => a.eq_ignore_ascii_case(b),
        }
    }
}

/// A slash-delimited virtual filesystem path.
///
/// The empty string is the root. This type never trims, collapses, or
/// otherwise reinterprets its contents: normalization is the caller's
/// responsibility, since leading and trailing separators carry meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VPath(String);

impl VPath {
    /// The root path (the empty string).
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Wraps a raw path string without modification.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the path denotes a directory (trailing `/`, or the
    /// root).
    #[must_use]
    pub fn is_directory_shaped(&self) -> bool {
        self.is_root() || self.0.ends_with('/')
    }

    /// Iterates the path's segments in order, including empty segments
    /// produced by doubled separators. The iterator yields no items for the
    /// root path.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            remainder: if self.0.is_empty() {
                None
            } else {
                Some(self.0.trim_end_matches('/'))
            },
        }
    }

    /// The leaf (final) segment of the path, or `None` for the root.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Joins a child segment onto this path, inserting a separator unless
    /// this path is the root.
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_owned())
        } else {
            let mut joined = self.0.trim_end_matches('/').to_owned();
            joined.push('/');
            joined.push_str(segment);
            Self(joined)
        }
    }

    /// Returns `true` if `self` is `other` or a descendant of `other` under
    /// the given case rule.
    #[must_use]
    pub fn is_under(&self, other: &Self, case: CaseSensitivity) -> bool {
        if other.is_root() {
            return true;
        }
        let prefix = other.0.trim_end_matches('/');
        if case.eq(&self.0, prefix) {
            return true;
        }
        let prefixed = format!("{prefix}/");
        let candidate = &self.0;
        if candidate.len() <= prefixed.len() {
            return false;
        }
        match case {
            CaseSensitivity::Sensitive => candidate.starts_with(&prefixed),
            CaseSensitivity::Insensitive => {
                candidate.len() >= prefixed.len()
                    && candidate[..prefixed.len()].eq_ignore_ascii_case(&prefixed)
            }
        }
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VPath {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for VPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Iterator over the segments of a [`VPath`], produced by
/// [`VPath::segments`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    remainder: Option<&'a str>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let remainder = self.remainder.take()?;
        match remainder.split_once('/') {
            Some((head, tail)) => {
                self.remainder = Some(tail);
                Some(head)
            }
            None => Some(remainder),
        }
    }
}

/// Rewrites paths between two roots by prefix substitution.
///
/// Used both to shift a child back-end's namespace under a `sub-path`
/// assignment and to splice an observer event's path from a child
/// back-end's root back into the parent VFS namespace.
#[derive(Debug, Clone)]
pub struct PathConverter {
    src_root: VPath,
    dst_root: VPath,
    case: CaseSensitivity,
}

impl PathConverter {
    /// Builds a converter that rewrites paths under `src_root` to their
    /// counterpart under `dst_root`.
    #[must_use]
    pub fn new(src_root: impl Into<VPath>, dst_root: impl Into<VPath>) -> Self {
        Self {
            src_root: src_root.into(),
            dst_root: dst_root.into(),
            case: CaseSensitivity::Sensitive,
        }
    }

    /// Overrides the case-sensitivity rule used to test whether a path lies
    /// under the source root.
    #[must_use]
    pub fn with_case(mut self, case: CaseSensitivity) -> Self {
        self.case = case;
        self
    }

    /// Rewrites `path` from the source root's namespace into the
    /// destination root's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathInvalid`] if `path` is not under `src_root`.
    pub fn convert(&self, path: &str) -> VfsResult<String> {
        let candidate = VPath::from(path);
        if !candidate.is_under(&self.src_root, self.case) {
            return Err(VfsError::PathInvalid(format!(
                "{path} is not under {}",
                self.src_root
            )));
        }
        let src_prefix = self.src_root.as_str().trim_end_matches('/');
        let suffix = path.strip_prefix(src_prefix).unwrap_or(path);
        let suffix = suffix.trim_start_matches('/');
        let dst_prefix = self.dst_root.as_str();
        if suffix.is_empty() {
            Ok(dst_prefix.to_owned())
        } else if dst_prefix.is_empty() {
            Ok(suffix.to_owned())
        } else {
            Ok(format!("{}/{}", dst_prefix.trim_end_matches('/'), suffix))
        }
    }

    /// Builds the inverse converter (swaps source and destination roots).
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            src_root: self.dst_root.clone(),
            dst_root: self.src_root.clone(),
            case: self.case,
        }
    }
}

/// A compiled observer subscription pattern.
///
/// Vocabulary: `?` matches exactly one non-separator character, `*` matches
/// zero or more characters within a single segment, `**` crosses segment
/// boundaries, and any other character is literal.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    pattern: String,
    matcher: globset::GlobMatcher,
    literal_prefix_depth: usize,
}

impl GlobFilter {
    /// Compiles a glob pattern into a matcher, also computing its literal
    /// prefix depth.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathInvalid`] if the pattern cannot be compiled.
    pub fn compile(pattern: &str) -> VfsResult<Self> {
        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(false)
            .build()
            .map_err(|e| VfsError::PathInvalid(format!("{pattern}: {e}")))?;
        Ok(Self {
            pattern: pattern.to_owned(),
            matcher: glob.compile_matcher(),
            literal_prefix_depth: literal_prefix_depth(pattern),
        })
    }

    /// A filter that matches every path (`"**"`).
    ///
    /// # Panics
    ///
    /// Never panics: `"**"` always compiles.
    #[must_use]
    pub fn match_all() -> Self {
        Self::compile("**").expect("\"**\" is always a valid glob")
    }

    /// The original, uncompiled pattern text.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The number of leading path segments containing no wildcard
    /// character. A depth of zero means the filter targets a single literal
    /// path.
    #[must_use]
    pub const fn literal_prefix_depth(&self) -> usize {
        self.literal_prefix_depth
    }

    /// Reports whether this filter is a single-path filter (depth zero),
    /// letting back-ends special-case single-entry observation.
    #[must_use]
    pub const fn is_single_path(&self) -> bool {
        self.literal_prefix_depth == 0
    }

    /// Tests whether `path` matches this filter in full.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Tests whether this filter could possibly match something under
    /// `root` — i.e. `root` is a prefix of the filter's literal segments, or
    /// the filter's literal prefix is itself under `root`. Used to decide
    /// whether a subscription's filter intersects a mount sub-tree.
    #[must_use]
    pub fn intersects_subtree(&self, root: &str) -> bool {
        let root_segments: Vec<&str> = if root.is_empty() {
            Vec::new()
        } else {
            root.trim_end_matches('/').split('/').collect()
        };
        let pattern_segments: Vec<&str> = self.pattern.split('/').collect();
        let shared = root_segments.len().min(pattern_segments.len());
        for i in 0..shared {
            let seg = pattern_segments[i];
            if seg == "**" {
                return true;
            }
            if seg.contains('*') || seg.contains('?') {
                // Wildcard segment: assume it could match anything at this
                // depth, so the subtrees may intersect.
                return true;
            }
            if seg != root_segments[i] {
                return false;
            }
        }
        true
    }
}

fn literal_prefix_depth(pattern: &str) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let mut depth = 0;
    for segment in pattern.split('/') {
        if segment.contains('*') || segment.contains('?') {
            break;
        }
        depth += 1;
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_has_no_segments() {
        assert_eq!(VPath::root().segments().count(), 0);
    }

    #[test]
    fn segments_preserve_empty_entries() {
        let p = VPath::from("a//b/");
        let segs: Vec<&str> = p.segments().collect();
        assert_eq!(segs, vec!["a", "", "b"]);
    }

    #[test]
    fn join_from_root_has_no_leading_separator() {
        assert_eq!(VPath::root().join("a").as_str(), "a");
    }

    #[test]
    fn is_under_matches_self_and_descendants() {
        let root = VPath::from("/app/");
        assert!(VPath::from("/app/").is_under(&root, CaseSensitivity::Sensitive));
        assert!(VPath::from("/app/x").is_under(&root, CaseSensitivity::Sensitive));
        assert!(!VPath::from("/apples").is_under(&root, CaseSensitivity::Sensitive));
    }

    #[test]
    fn converter_rewrites_prefix() {
        let conv = PathConverter::new("/app/", "/opt/app/");
        assert_eq!(
            conv.convert("/app/config.ini").unwrap(),
            "/opt/app/config.ini"
        );
    }

    #[test]
    fn converter_rejects_paths_outside_root() {
        let conv = PathConverter::new("/app/", "/opt/app/");
        assert!(conv.convert("/other/x").is_err());
    }

    #[test]
    fn converter_inverse_round_trips() {
        let conv = PathConverter::new("/app/", "/opt/app/");
        let back = conv.inverse();
        let shifted = conv.convert("/app/config.ini").unwrap();
        assert_eq!(back.convert(&shifted).unwrap(), "/app/config.ini");
    }

    #[test]
    fn literal_prefix_depth_stops_at_wildcard() {
        let f = GlobFilter::compile("dir/sub/*.txt").unwrap();
        assert_eq!(f.literal_prefix_depth(), 2);
        assert!(!f.is_single_path());
    }

    #[test]
    fn single_path_filter_has_zero_depth() {
        let f = GlobFilter::compile("dir/file.txt").unwrap();
        assert_eq!(f.literal_prefix_depth(), 0);
        assert!(f.is_single_path());
    }

    #[test]
    fn double_star_crosses_segments() {
        let f = GlobFilter::compile("dir/**").unwrap();
        assert!(f.is_match("dir/a/b/c.txt"));
    }

    #[test]
    fn single_star_does_not_cross_segments() {
        let f = GlobFilter::compile("dir/*.txt").unwrap();
        assert!(f.is_match("dir/file.txt"));
        assert!(!f.is_match("dir/sub/file.txt"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let f = GlobFilter::compile("dir/fil?.txt").unwrap();
        assert!(f.is_match("dir/file.txt"));
        assert!(!f.is_match("dir/fil.txt"));
    }

    #[test]
    fn intersects_subtree_true_for_ancestor_root() {
        let f = GlobFilter::compile("/dir/*.txt").unwrap();
        assert!(f.intersects_subtree(""));
        assert!(f.intersects_subtree("/dir"));
    }

    #[test]
    fn intersects_subtree_false_for_unrelated_root() {
        let f = GlobFilter::compile("dir/*.txt").unwrap();
        assert!(!f.intersects_subtree("other"));
    }
}
