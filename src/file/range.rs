//! HTTP byte-range resolution.
//!
//! Only the `bytes` unit is understood, and only the first range of a
//! multi-range header is served.

use crate::{DocstoreError, Result};

/// The portion of a blob a download will return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// The whole blob.
    Full { length: u64 },
    /// Inclusive window `start..=end` of a blob of `total` bytes.
    Partial { start: u64, end: u64, total: u64 },
}

impl ByteRange {
    pub fn start(&self) -> u64 {
        match self {
            Self::Full { .. } => 0,
            Self::Partial { start, .. } => *start,
        }
    }

    /// Number of bytes to serve.
    pub fn length(&self) -> u64 {
        match self {
            Self::Full { length } => *length,
            Self::Partial { start, end, .. } => end - start + 1,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }

    /// `Content-Range` value, e.g. `bytes 0-49/100`. None for full reads.
    pub fn content_range(&self) -> Option<String> {
        match self {
            Self::Full { .. } => None,
            Self::Partial { start, end, total } => Some(format!("bytes {start}-{end}/{total}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSpec {
    /// `bytes=S-E`
    Bounded(u64, u64),
    /// `bytes=S-`
    From(u64),
    /// `bytes=-N`
    Suffix(u64),
}

/// Resolve an optional `Range` header against a blob of `total` bytes.
///
/// An absent header selects the whole blob. The end of a bounded range is
/// clamped to the last byte. Anything that cannot be served, including a
/// malformed header, is [`DocstoreError::RangeNotSatisfiable`].
pub fn resolve(header: Option<&str>, total: u64) -> Result<ByteRange> {
    let Some(header) = header else {
        return Ok(ByteRange::Full { length: total });
    };

    let requested = parse_first(header).map_err(|reason| unsatisfiable(reason, total))?;

    if total == 0 {
        return Err(unsatisfiable("blob is empty", total));
    }
    let last = total - 1;

    let (start, end) = match requested {
        RangeSpec::Bounded(start, end) => (start, end.min(last)),
        RangeSpec::From(start) => (start, last),
        RangeSpec::Suffix(0) => return Err(unsatisfiable("zero-length suffix", total)),
        RangeSpec::Suffix(n) => (total.saturating_sub(n), last),
    };

    if start > last {
        return Err(unsatisfiable("start beyond end of blob", total));
    }

    Ok(ByteRange::Partial { start, end, total })
}

fn parse_first(header: &str) -> std::result::Result<RangeSpec, &'static str> {
    let (unit, ranges) = header
        .trim()
        .split_once('=')
        .ok_or("missing range unit")?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err("unsupported range unit");
    }

    let first = ranges.split(',').next().unwrap_or_default().trim();
    let (from, to) = first.split_once('-').ok_or("missing '-' in range")?;

    match (from.trim(), to.trim()) {
        ("", "") => Err("empty range"),
        ("", suffix) => Ok(RangeSpec::Suffix(parse_position(suffix)?)),
        (start, "") => Ok(RangeSpec::From(parse_position(start)?)),
        (start, end) => {
            let start = parse_position(start)?;
            let end = parse_position(end)?;
            if end < start {
                return Err("range end before start");
            }
            Ok(RangeSpec::Bounded(start, end))
        }
    }
}

fn parse_position(s: &str) -> std::result::Result<u64, &'static str> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err("range position is not a number");
    }
    s.parse().map_err(|_| "range position too large")
}

fn unsatisfiable(reason: &str, size: u64) -> DocstoreError {
    DocstoreError::RangeNotSatisfiable {
        reason: reason.to_string(),
        size,
    }
}
