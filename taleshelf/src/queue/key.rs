use serde::Serialize;
use shared::{Error, Result};
use std::fmt;

const SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// Ordered key segments identifying one cached operation.
///
/// The identifier joins the segments with `:` after escaping `\` and `:`
/// inside each segment, so two different segment lists never share an
/// identifier and a prefix of segments is always a prefix of the identifier
/// followed by a separator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    segments: Vec<String>,
}

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append the canonical JSON rendering of `value` as one more segment.
    ///
    /// The value goes through `serde_json::Value` first, whose object map
    /// keeps keys sorted, so maps built in any insertion order render the same.
    pub fn with_discriminant<D: Serialize + ?Sized>(self, value: &D) -> Result<Self> {
        let canonical = serde_json::to_value(value)
            .and_then(|v| serde_json::to_string(&v))
            .map_err(|e| Error::Internal(format!("cache key serialization failed: {e}")))?;
        Ok(self.push(canonical))
    }

    pub fn id(&self) -> String {
        let mut id = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                id.push(SEPARATOR);
            }
            for c in segment.chars() {
                if c == SEPARATOR || c == ESCAPE {
                    id.push(ESCAPE);
                }
                id.push(c);
            }
        }
        id
    }

    /// Segment-prefix test on encoded identifiers.
    pub(crate) fn id_has_prefix(id: &str, prefix_id: &str) -> bool {
        if prefix_id.is_empty() {
            return true;
        }
        match id.strip_prefix(prefix_id) {
            Some("") => true,
            Some(rest) => rest.starts_with(SEPARATOR),
            None => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl<const N: usize> From<[&str; N]> for CacheKey {
    fn from(segments: [&str; N]) -> Self {
        CacheKey::new(segments)
    }
}
