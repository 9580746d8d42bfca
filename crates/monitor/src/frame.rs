//! Log frames
//!
//! A `LogFrame` is one already-formatted log record. The relay never looks
//! inside it; frames are cheap to clone (`Bytes` is reference counted), so one
//! rendered record can be handed to several handlers.

use std::fmt;

use bytes::Bytes;

/// One formatted log record, forwarded as-is
#[derive(Clone, PartialEq, Eq, Default)]
pub struct LogFrame(Bytes);

impl LogFrame {
    /// Wrap already-formatted bytes
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Frame from a static string, handy for tests and fixed records
    pub const fn from_static(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for LogFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LogFrame")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}

impl From<Bytes> for LogFrame {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for LogFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<String> for LogFrame {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<&'static str> for LogFrame {
    fn from(s: &'static str) -> Self {
        Self::from_static(s)
    }
}

impl From<LogFrame> for Bytes {
    fn from(frame: LogFrame) -> Self {
        frame.0
    }
}

impl AsRef<[u8]> for LogFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
