//! The session's request target.
//!
//! A [`TargetUri`] is split into an _origin_ (scheme and authority) and a
//! _path_. The split point is the third `/` found when scanning from the
//! second character onwards. For `scheme://host[:port]/...` that is exactly
//! the slash that terminates the authority:
//!
//! ```text
//! http://10.0.0.1/a/b/c
//!  ────┬────────── ──┬──
//!    origin        path
//! ```
//!
//! A target with fewer than three such slashes is all origin and has an
//! empty path. A server-directed migration keeps the origin and swaps the
//! path.

use core::fmt;

use crate::error::ConfigError;

/// A non-empty request target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetUri(String);

impl TargetUri {
    /// Wrap a target string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyUri`] if `uri` is empty.
    pub fn new(uri: impl Into<String>) -> Result<Self, ConfigError> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(ConfigError::EmptyUri);
        }
        Ok(Self(uri))
    }

    /// The full target string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme, if the target is of the form `scheme://...`.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once("://")?;
        let mut chars = scheme.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some(scheme)
    }

    /// Everything before the path: scheme and authority, or the whole
    /// target when it has no path separator.
    #[must_use]
    pub fn origin(&self) -> &str {
        match self.path_start() {
            Some(at) => self.0.split_at(at).0,
            None => &self.0,
        }
    }

    /// The path component, starting with `/`, or `""` if there is none.
    #[must_use]
    pub fn path(&self) -> &str {
        match self.path_start() {
            Some(at) => self.0.split_at(at).1,
            None => "",
        }
    }

    /// A new target with this origin and `path` appended to it.
    ///
    /// `path` is appended verbatim; no separator is inserted.
    #[must_use]
    pub fn with_path(&self, path: &str) -> Self {
        let origin = self.origin();
        let mut uri = String::with_capacity(origin.len() + path.len());
        uri.push_str(origin);
        uri.push_str(path);
        Self(uri)
    }

    /// Replace the path in place.
    pub fn migrate(&mut self, path: &str) {
        *self = self.with_path(path);
    }

    /// Byte offset of the third `/` after the first character.
    fn path_start(&self) -> Option<usize> {
        self.0
            .char_indices()
            .skip(1)
            .filter(|&(_, c)| c == '/')
            .nth(2)
            .map(|(at, _)| at)
    }
}

impl fmt::Display for TargetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TargetUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
