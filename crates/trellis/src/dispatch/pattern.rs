//! Identifier segments accepted after a resource's base path.

use crate::entity::KeyType;

/// Shape of the identifier segment a resource accepts.
///
/// A resource path is either the bare base (`""`) or the base followed by an
/// identifier and a trailing slash (`"<id>/"`).
///
/// ```
/// use trellis::{IdentifierPattern, KeyType};
///
/// let pattern = IdentifierPattern::for_key_type(KeyType::Auto);
/// assert_eq!(pattern.capture(""), Some(None));
/// assert_eq!(pattern.capture("42/"), Some(Some("42".to_owned())));
/// assert_eq!(pattern.capture("abc/"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPattern {
    /// ASCII digits only.
    Numeric,
    /// Letters, digits and underscores.
    Word,
}

impl IdentifierPattern {
    /// Chooses the pattern matching a primary-key type.
    #[must_use]
    pub const fn for_key_type(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Auto => Self::Numeric,
            KeyType::Text => Self::Word,
        }
    }

    /// Matches a path relative to the resource base.
    ///
    /// Returns `None` when the path does not belong to the resource,
    /// `Some(None)` for the bare base and `Some(Some(id))` otherwise.
    #[must_use]
    pub fn capture(self, relative_path: &str) -> Option<Option<String>> {
        if relative_path.is_empty() {
            return Some(None);
        }
        let identifier = relative_path.strip_suffix('/')?;
        (!identifier.is_empty() && identifier.chars().all(|c| self.accepts(c)))
            .then(|| Some(identifier.to_owned()))
    }

    fn accepts(self, c: char) -> bool {
        match self {
            Self::Numeric => c.is_ascii_digit(),
            Self::Word => c.is_alphanumeric() || c == '_',
        }
    }
}
