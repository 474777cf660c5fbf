/// A resolved byte range of a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// Offset right after the last byte of this range.
    pub fn end(&self) -> Option<u64> {
        self.length
            .map(|length| self.offset.saturating_add(length))
    }

    /// Whether the range covers no byte at all.
    pub fn is_empty(&self) -> bool {
        self.length == Some(0)
    }

    /// Value of the `Range` header. `None` for an empty range, which HTTP can not express.
    pub fn to_http_range(&self) -> Option<String> {
        match self.length {
            Some(0) => None,
            None => Some(format!("bytes={}-", self.offset)),
            Some(length) => Some(format!(
                "bytes={}-{}",
                self.offset,
                self.offset.saturating_add(length - 1)
            )),
        }
    }
}
