//! Byte range requests (RFC 7233 subset).
//!
//! Only the `bytes=<start>-<end?>` form is accepted. A missing upper
//! bound is stored as `end == 0`, meaning "to the end of the
//! resource"; [`RangeSpec::resolve`] turns it into concrete inclusive
//! offsets against a known resource size.

use std::fmt;

/// A byte range as it appears in a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    /// First byte offset, inclusive.
    pub start: u64,
    /// Last byte offset, inclusive. Zero means "to end of resource".
    pub end: u64,
}

/// A range resolved against a resource size. Both offsets inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// First byte offset, inclusive.
    pub start: u64,
    /// Last byte offset, inclusive.
    pub end: u64,
}

impl ResolvedRange {
    /// Number of bytes covered by this range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false: a resolved range covers at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Format as a `Content-Range` header value, e.g. `bytes 0-4/20`.
    #[must_use]
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// Error for a syntactically valid range that cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeUnsatisfiable {
    /// Size of the resource the range was checked against.
    pub resource_size: u64,
}

impl fmt::Display for RangeUnsatisfiable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "range not satisfiable for resource of size {}",
            self.resource_size
        )
    }
}

impl std::error::Error for RangeUnsatisfiable {}

impl RangeSpec {
    /// Parse a `Range` header value of the form `bytes=<u64>-<u64>?`.
    ///
    /// Returns `None` on any deviation from that shape, including
    /// overflowing numbers, suffix ranges and range lists.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix("bytes=")?;
        let (start_str, end_str) = rest.split_once('-')?;

        if start_str.is_empty() || !start_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let start: u64 = start_str.parse().ok()?;

        let end: u64 = if end_str.is_empty() {
            0
        } else {
            if !end_str.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            end_str.parse().ok()?
        };

        Some(Self { start, end })
    }

    /// Resolve against a resource size.
    ///
    /// `end == 0` is interpreted as `resource_size - 1`. Violating
    /// `start < size`, `start <= end` or `end < size` yields
    /// [`RangeUnsatisfiable`], which callers turn into a 416.
    pub fn resolve(self, resource_size: u64) -> Result<ResolvedRange, RangeUnsatisfiable> {
        let unsatisfiable = RangeUnsatisfiable { resource_size };
        if resource_size == 0 {
            return Err(unsatisfiable);
        }

        let end = if self.end == 0 {
            resource_size - 1
        } else {
            self.end
        };

        if self.start >= resource_size || self.start > end || end >= resource_size {
            return Err(unsatisfiable);
        }

        Ok(ResolvedRange {
            start: self.start,
            end,
        })
    }
}

/// `Content-Range` value for a 416 response, e.g. `bytes */20`.
#[must_use]
pub fn content_range_unsatisfiable(resource_size: u64) -> String {
    format!("bytes */{resource_size}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn parse_bounded() {
        assert_eq!(
            RangeSpec::parse("bytes=0-499"),
            Some(RangeSpec { start: 0, end: 499 })
        );
    }

    #[test]
    fn parse_open_ended_stores_zero() {
        assert_eq!(
            RangeSpec::parse("bytes=500-"),
            Some(RangeSpec { start: 500, end: 0 })
        );
    }

    #[test]
    fn parse_rejects_suffix_form() {
        assert_eq!(RangeSpec::parse("bytes=-500"), None);
    }

    #[test]
    fn parse_rejects_other_units() {
        assert_eq!(RangeSpec::parse("items=0-10"), None);
        assert_eq!(RangeSpec::parse("0-10"), None);
    }

    #[test]
    fn parse_rejects_lists_and_garbage() {
        assert_eq!(RangeSpec::parse("bytes=0-10,20-30"), None);
        assert_eq!(RangeSpec::parse("bytes=a-b"), None);
        assert_eq!(RangeSpec::parse("bytes=10"), None);
    }

    #[test]
    fn parse_rejects_overflow() {
        assert_eq!(RangeSpec::parse("bytes=99999999999999999999-"), None);
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[test]
    fn resolve_open_ended_runs_to_last_byte() {
        let range = RangeSpec { start: 0, end: 0 }.resolve(20).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 19);
        assert_eq!(range.len(), 20);
        assert_eq!(range.content_range(20), "bytes 0-19/20");
    }

    #[test]
    fn resolve_bounded() {
        let range = RangeSpec { start: 0, end: 4 }.resolve(20).unwrap();
        assert_eq!(range.len(), 5);
        assert_eq!(range.content_range(20), "bytes 0-4/20");
    }

    #[test]
    fn resolve_start_at_size_is_unsatisfiable() {
        let err = RangeSpec { start: 20, end: 0 }.resolve(20).unwrap_err();
        assert_eq!(err.resource_size, 20);
    }

    #[test]
    fn resolve_inverted_is_unsatisfiable() {
        assert!(RangeSpec { start: 10, end: 5 }.resolve(20).is_err());
    }

    #[test]
    fn resolve_end_at_size_is_unsatisfiable() {
        assert!(RangeSpec { start: 0, end: 20 }.resolve(20).is_err());
    }

    #[test]
    fn resolve_empty_resource_is_unsatisfiable() {
        assert!(RangeSpec { start: 0, end: 0 }.resolve(0).is_err());
    }

    #[test]
    fn unsatisfiable_content_range() {
        assert_eq!(content_range_unsatisfiable(20), "bytes */20");
    }
}
