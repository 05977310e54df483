use crate::id::Zid;
use crate::meta::Meta;
use std::borrow::Cow;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content(Vec<u8>);

impl Content {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content that is not valid UTF-8 or contains NUL bytes is treated as binary.
    pub fn is_binary(&self) -> bool {
        self.0.contains(&0) || std::str::from_utf8(&self.0).is_err()
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zettel {
    pub meta: Meta,
    pub content: Content,
}

impl Zettel {
    pub fn new(meta: Meta, content: impl Into<Content>) -> Self {
        Self {
            meta,
            content: content.into(),
        }
    }

    pub fn zid(&self) -> Zid {
        self.meta.zid
    }
}

#[cfg(test)]
mod tests {
    use super::Content;

    #[test]
    fn binary_detection() {
        assert!(!Content::from("plain text").is_binary());
        assert!(Content::new(vec![0x89, b'P', b'N', b'G', 0]).is_binary());
        assert!(Content::new(vec![0xff, 0xfe]).is_binary());
    }
}
