use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic dispenser of the next unclaimed index in an inclusive range.
///
/// The counter holds the offset from `lo`; a claim is valid only when the
/// pre-increment offset is still inside the range, so concurrent callers can
/// never receive the same index twice.
#[derive(Debug)]
pub struct WorkCursor {
    next: AtomicU64,
    lo: i64,
    len: u64,
}

impl WorkCursor {
    /// Cursor over `[lo, hi]`; an empty cursor when `hi < lo`
    pub fn new(lo: i64, hi: i64) -> anyhow::Result<Self> {
        Ok(Self {
            next: AtomicU64::new(0),
            lo,
            len: range_len(lo, hi)?,
        })
    }

    /// Claim the next index, or `None` once the range is exhausted
    #[inline]
    pub fn next(&self) -> Option<i64> {
        let offset = self.next.fetch_add(1, Ordering::Relaxed);
        (offset < self.len).then(|| self.lo.wrapping_add_unsigned(offset))
    }

    /// Number of indices in the range
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indices handed out so far
    pub fn dispensed(&self) -> u64 {
        self.next.load(Ordering::Relaxed).min(self.len)
    }
}

/// Number of indices in `[lo, hi]`, zero when `hi < lo`
pub fn range_len(lo: i64, hi: i64) -> anyhow::Result<u64> {
    if hi < lo {
        return Ok(0);
    }
    hi.abs_diff(lo)
        .checked_add(1)
        .ok_or_else(|| anyhow::anyhow!("index range [{lo}, {hi}] is too large"))
}
