use crate::ParseError;

/// One entry discovered on the listing page
///
/// The id doubles as the topic's directory name, so it is validated on
/// construction: only ASCII alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    link: String,
    id: String,
}

impl Topic {
    /// Creates a topic, rejecting ids that are not filesystem-safe
    ///
    /// # Examples
    ///
    /// ```
    /// use topic_ripple::Topic;
    ///
    /// let topic = Topic::new("https://example.com/post", "38712345").unwrap();
    /// assert_eq!(topic.id(), "38712345");
    ///
    /// assert!(Topic::new("https://example.com/post", "../etc").is_err());
    /// ```
    pub fn new(link: impl Into<String>, id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if !is_safe_topic_id(&id) {
            return Err(ParseError::InvalidTopicId(id));
        }

        Ok(Self {
            link: link.into(),
            id,
        })
    }

    /// The topic's primary page
    pub fn link(&self) -> &str {
        &self.link
    }

    /// Stable identifier, used verbatim as a directory name
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Checks that `id` can be used as a single path component
pub fn is_safe_topic_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
