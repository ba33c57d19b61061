//! Move-only payloads handed from callers through the router to the
//! transport controller.

use std::io::Read;
use std::path::PathBuf;

use bytes::Bytes;
use rand::Rng;

/// Numeric payload id, unique within a session for cancellation purposes.
pub type PayloadId = i64;

/// Payload kind, for logging and progress bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Bytes,
    Stream,
    File,
}

/// Payload content. Streams are consumed by the transport; nothing here is
/// cloneable.
pub enum PayloadContent {
    Bytes(Bytes),
    Stream(Box<dyn Read + Send>),
    File { path: PathBuf, size: u64 },
}

/// A unit of data or a stream targeted at one or more endpoints.
///
/// Ownership moves from the caller into the router's queued task and from
/// there into the transport controller; it is never duplicated.
pub struct Payload {
    id: PayloadId,
    content: PayloadContent,
}

impl Payload {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::with_id(generate_payload_id(), PayloadContent::Bytes(data.into()))
    }

    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Self::with_id(generate_payload_id(), PayloadContent::Stream(Box::new(reader)))
    }

    pub fn file(path: impl Into<PathBuf>, size: u64) -> Self {
        Self::with_id(
            generate_payload_id(),
            PayloadContent::File {
                path: path.into(),
                size,
            },
        )
    }

    pub fn with_id(id: PayloadId, content: PayloadContent) -> Self {
        Self { id, content }
    }

    pub fn id(&self) -> PayloadId {
        self.id
    }

    pub fn kind(&self) -> PayloadKind {
        match self.content {
            PayloadContent::Bytes(_) => PayloadKind::Bytes,
            PayloadContent::Stream(_) => PayloadKind::Stream,
            PayloadContent::File { .. } => PayloadKind::File,
        }
    }

    /// Known size in bytes, if any. Streams report `None`.
    pub fn size(&self) -> Option<u64> {
        match &self.content {
            PayloadContent::Bytes(b) => Some(b.len() as u64),
            PayloadContent::Stream(_) => None,
            PayloadContent::File { size, .. } => Some(*size),
        }
    }

    /// Borrow the bytes of a [`PayloadKind::Bytes`] payload.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.content {
            PayloadContent::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn content(&self) -> &PayloadContent {
        &self.content
    }

    pub fn into_content(self) -> PayloadContent {
        self.content
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("size", &self.size())
            .finish()
    }
}

/// Random non-negative payload id.
pub fn generate_payload_id() -> PayloadId {
    rand::thread_rng().gen_range(0..PayloadId::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_payload() {
        let payload = Payload::bytes(&b"hello"[..]);
        assert_eq!(payload.kind(), PayloadKind::Bytes);
        assert_eq!(payload.size(), Some(5));
        assert_eq!(payload.as_bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
        assert!(payload.id() >= 0);
    }

    #[test]
    fn test_stream_payload_has_no_size() {
        let payload = Payload::stream(std::io::Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(payload.kind(), PayloadKind::Stream);
        assert_eq!(payload.size(), None);
        assert!(payload.as_bytes().is_none());
    }

    #[test]
    fn test_explicit_id() {
        let payload = Payload::with_id(42, PayloadContent::Bytes(Bytes::from_static(b"x")));
        assert_eq!(payload.id(), 42);
        assert!(format!("{:?}", payload).contains("42"));
    }
}
