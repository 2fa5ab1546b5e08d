// MIT LICENSE
//
// Copyright (c) 2024 Hoard Engine Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Hoard path manipulation library.
//!
//! Every file the hoard tracks is addressed by a normalized POSIX path: an
//! absolute flag plus a list of non-empty components. Cave contents live
//! under a mount point, so the same file has two renderings: the *hoard
//! path* (absolute, mount point included) and the *cave-local path*
//! (relative to the mount point). This crate provides the path value type
//! and the translation between the two renderings.

#![deny(missing_docs)]

use std::cmp::Ordering;
use std::fmt;

/// Errors arising from path arithmetic.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// `relative_to` was called with a base the path is not under.
    #[error("path {0} is not relative to {1}")]
    NotRelative(String, String),
    /// An operation required a relative path but got an absolute one.
    #[error("expected a relative path, got {0}")]
    ExpectedRelative(String),
    /// An operation required an absolute path but got a relative one.
    #[error("expected an absolute path, got {0}")]
    ExpectedAbsolute(String),
}

/// A normalized POSIX path.
///
/// Components never contain `/` and never are empty; `parse` collapses
/// repeated separators and drops a trailing one. Ordering and hashing are
/// consistent with the `/`-joined rendering, so a sorted list of paths is
/// sorted the way `mktree_from_sorted_tuples` requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HoardPath {
    absolute: bool,
    components: Vec<String>,
}

impl HoardPath {
    /// The absolute root path `/`.
    pub fn root() -> Self {
        HoardPath {
            absolute: true,
            components: Vec::new(),
        }
    }

    /// The empty relative path, rendered as `.`.
    pub fn empty() -> Self {
        HoardPath {
            absolute: false,
            components: Vec::new(),
        }
    }

    /// Parses a POSIX path string. `""` and `"."` are the empty relative
    /// path; a leading `/` makes the path absolute; empty segments are
    /// dropped.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() || path == "." {
            return Self::empty();
        }
        let absolute = path.starts_with('/');
        let components = path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(str::to_owned)
            .collect();
        HoardPath {
            absolute,
            components,
        }
    }

    /// Builds a path directly from components.
    ///
    /// Callers must not pass components containing `/` or empty strings.
    pub fn from_components<I, S>(absolute: bool, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HoardPath {
            absolute,
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the path starts at the root.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// The path components, in order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The final component, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// The path with the final component removed; `None` at the top.
    pub fn parent(&self) -> Option<HoardPath> {
        if self.components.is_empty() {
            return None;
        }
        Some(HoardPath {
            absolute: self.absolute,
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Renders the path as a POSIX string. The empty relative path renders
    /// as `.` so it round-trips through `parse`.
    pub fn as_posix(&self) -> String {
        if self.absolute {
            format!("/{}", self.components.join("/"))
        } else if self.components.is_empty() {
            ".".to_owned()
        } else {
            self.components.join("/")
        }
    }

    /// Whether `self` is located at or under `base`.
    ///
    /// Paths of different absoluteness are never relative to each other.
    pub fn is_relative_to(&self, base: &HoardPath) -> bool {
        self.absolute == base.absolute
            && self.components.len() >= base.components.len()
            && self.components[..base.components.len()] == base.components[..]
    }

    /// Strips `base` off the front of `self`, producing a relative path.
    pub fn relative_to(&self, base: &HoardPath) -> Result<HoardPath, PathError> {
        if !self.is_relative_to(base) {
            return Err(PathError::NotRelative(self.as_posix(), base.as_posix()));
        }
        Ok(HoardPath {
            absolute: false,
            components: self.components[base.components.len()..].to_vec(),
        })
    }

    /// Appends a relative path to `self`.
    pub fn join(&self, tail: &HoardPath) -> Result<HoardPath, PathError> {
        if tail.absolute {
            return Err(PathError::ExpectedRelative(tail.as_posix()));
        }
        let mut components = self.components.clone();
        components.extend(tail.components.iter().cloned());
        Ok(HoardPath {
            absolute: self.absolute,
            components,
        })
    }

    /// Appends a single component.
    pub fn child(&self, name: &str) -> HoardPath {
        let mut components = self.components.clone();
        components.push(name.to_owned());
        HoardPath {
            absolute: self.absolute,
            components,
        }
    }

    // The `/`-joined rendering as a byte stream, without allocating.
    // Ordering over this stream matches ordering over `as_posix` strings
    // (modulo the `.` special case, which sorts first either way).
    fn joined_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        let lead = if self.absolute { Some(b'/') } else { None };
        lead.into_iter().chain(
            self.components
                .iter()
                .enumerate()
                .flat_map(|(i, c)| {
                    let sep = if i > 0 { Some(b'/') } else { None };
                    sep.into_iter().chain(c.bytes())
                }),
        )
    }
}

impl Ord for HoardPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.joined_bytes().cmp(other.joined_bytes())
    }
}

impl PartialOrd for HoardPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for HoardPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_posix())
    }
}

impl From<&str> for HoardPath {
    fn from(path: &str) -> Self {
        HoardPath::parse(path)
    }
}

/// Translates an absolute hoard path into a path local to a cave mounted at
/// `mount_point`. Returns `None` when the file is outside the mount.
pub fn hoard_to_local(hoard_path: &HoardPath, mount_point: &HoardPath) -> Option<HoardPath> {
    hoard_path.relative_to(mount_point).ok()
}

/// Translates a cave-local path back into the absolute hoard path for a cave
/// mounted at `mount_point`.
pub fn local_to_hoard(
    local_path: &HoardPath,
    mount_point: &HoardPath,
) -> Result<HoardPath, PathError> {
    if !mount_point.is_absolute() {
        return Err(PathError::ExpectedAbsolute(mount_point.as_posix()));
    }
    mount_point.join(local_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes() {
        assert_eq!(HoardPath::parse("/a//b/").components(), &["a", "b"]);
        assert_eq!(HoardPath::parse("/").components().len(), 0);
        assert!(HoardPath::parse("/").is_absolute());
        assert_eq!(HoardPath::parse("").as_posix(), ".");
        assert_eq!(HoardPath::parse(".").as_posix(), ".");
        assert_eq!(HoardPath::parse("a/b").as_posix(), "a/b");
        assert_eq!(HoardPath::parse("/a/b").as_posix(), "/a/b");
    }

    #[test]
    fn relativity() {
        let mount = HoardPath::parse("/media/cave");
        let file = HoardPath::parse("/media/cave/pics/a.jpg");
        assert!(file.is_relative_to(&mount));
        assert_eq!(
            file.relative_to(&mount).unwrap().as_posix(),
            "pics/a.jpg"
        );
        assert!(!mount.is_relative_to(&file));
        assert!(HoardPath::parse("/media/caveat").relative_to(&mount).is_err());
        assert!(!HoardPath::parse("media/cave/x").is_relative_to(&mount));
    }

    #[test]
    fn join_requires_relative_tail() {
        let mount = HoardPath::parse("/media/cave");
        let local = HoardPath::parse("pics/a.jpg");
        assert_eq!(
            mount.join(&local).unwrap().as_posix(),
            "/media/cave/pics/a.jpg"
        );
        assert!(mount.join(&HoardPath::parse("/abs")).is_err());
    }

    #[test]
    fn mount_round_trip() {
        let mount = HoardPath::parse("/m");
        let hoard = HoardPath::parse("/m/x/y");
        let local = hoard_to_local(&hoard, &mount).unwrap();
        assert_eq!(local.as_posix(), "x/y");
        assert_eq!(local_to_hoard(&local, &mount).unwrap(), hoard);
        assert_eq!(hoard_to_local(&HoardPath::parse("/other/x"), &mount), None);
    }

    #[test]
    fn ordering_matches_joined_rendering() {
        // '.' < '/' in ASCII, so "a.b" sorts before the directory "a"'s
        // children when rendered; component-wise comparison would disagree.
        let mut paths = vec![
            HoardPath::parse("/a/c"),
            HoardPath::parse("/a.b"),
            HoardPath::parse("/a"),
        ];
        paths.sort();
        let rendered: Vec<_> = paths.iter().map(|p| p.as_posix()).collect();
        let mut strings = rendered.clone();
        strings.sort();
        assert_eq!(rendered, strings);
    }

    #[test]
    fn parent_and_child() {
        let p = HoardPath::parse("/a/b/c");
        assert_eq!(p.file_name(), Some("c"));
        assert_eq!(p.parent().unwrap().as_posix(), "/a/b");
        assert_eq!(p.parent().unwrap().child("d").as_posix(), "/a/b/d");
        assert_eq!(HoardPath::root().parent(), None);
    }
}
