use derive_more::{Display, From, Into};

/// Identifier shared by all chunks of one payload.
///
/// ```
/// use relaymq::chunk::CollectionId;
/// let id = CollectionId::new("orders-1");
/// assert_eq!(id.as_str(), "orders-1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct CollectionId(String);

impl CollectionId {
    /// Create a new identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for CollectionId {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}
