//! Ordinal windows for paged extraction.

use crate::error::FlatFileError;
use crate::reassemble::LogicalRecord;
use std::io;

/// Half-open ordinal range `[lo, hi)`; `hi == None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: u64,
    pub hi: Option<u64>,
}

impl Window {
    /// Compute the window for `start` and optional `page`/`size`.
    ///
    /// `lo = start + size * (page - 1)` and `hi = lo + size`. A size without a
    /// page means the first page; a page without a size is rejected.
    pub fn new(start: u64, page: Option<u64>, size: Option<u64>) -> Result<Self, FlatFileError> {
        if start == 0 {
            return Err(FlatFileError::config("start must be at least 1"));
        }
        match (page, size) {
            (None, None) => Ok(Self::from_start(start)),
            (Some(_), None) => Err(FlatFileError::config("page requires size")),
            (Some(0), _) => Err(FlatFileError::config("page must be at least 1")),
            (_, Some(0)) => Err(FlatFileError::config("size must be at least 1")),
            (page, Some(size)) => {
                let page = page.unwrap_or(1);
                let lo = start.saturating_add(size.saturating_mul(page - 1));
                Ok(Self {
                    lo,
                    hi: Some(lo.saturating_add(size)),
                })
            }
        }
    }

    pub fn from_start(start: u64) -> Self {
        Self {
            lo: start.max(1),
            hi: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::from_start(1)
    }

    pub fn contains(&self, ordinal: u64) -> bool {
        ordinal >= self.lo && self.hi.is_none_or(|hi| ordinal < hi)
    }

    /// `true` once no ordinal at or after `ordinal + 1` can be in the window.
    pub fn is_last(&self, ordinal: u64) -> bool {
        self.hi.is_some_and(|hi| ordinal.saturating_add(1) >= hi)
    }

    /// Wrap a logical-record stream so only records in this window come out.
    pub fn apply<I>(self, records: I) -> Windowed<I>
    where
        I: Iterator<Item = io::Result<LogicalRecord>>,
    {
        Windowed::new(records, self)
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Iterator adaptor enforcing a [`Window`].
///
/// Records before `lo` are skipped. After the record at `hi - 1` is yielded
/// the upstream iterator is dropped, which releases whatever it owns (the
/// open file, typically) and guarantees no further line is read.
pub struct Windowed<I> {
    inner: Option<I>,
    window: Window,
}

impl<I> Windowed<I>
where
    I: Iterator<Item = io::Result<LogicalRecord>>,
{
    pub fn new(inner: I, window: Window) -> Self {
        // An empty window never needs the source at all.
        let empty = window.hi.is_some_and(|hi| hi <= window.lo);
        Self {
            inner: (!empty).then_some(inner),
            window,
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// `true` once the upstream has been released.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<I> Iterator for Windowed<I>
where
    I: Iterator<Item = io::Result<LogicalRecord>>,
{
    type Item = io::Result<LogicalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let inner = self.inner.as_mut()?;
            match inner.next() {
                None => {
                    self.inner = None;
                    return None;
                }
                Some(Err(e)) => {
                    self.inner = None;
                    return Some(Err(e));
                }
                Some(Ok(record)) if record.ordinal < self.window.lo => continue,
                Some(Ok(record)) if !self.window.contains(record.ordinal) => {
                    self.inner = None;
                    return None;
                }
                Some(Ok(record)) => {
                    if self.window.is_last(record.ordinal) {
                        tracing::debug!(ordinal = record.ordinal, "window satisfied, closing source");
                        self.inner = None;
                    }
                    return Some(Ok(record));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_arithmetic() {
        let w = Window::new(1, Some(3), Some(10)).unwrap();
        assert_eq!(w, Window { lo: 21, hi: Some(31) });
        let w = Window::new(2, Some(1), Some(5)).unwrap();
        assert_eq!(w, Window { lo: 2, hi: Some(7) });
    }

    #[test]
    fn size_without_page_is_first_page() {
        assert_eq!(Window::new(1, None, Some(4)).unwrap().hi, Some(5));
    }

    #[test]
    fn invalid_combinations_are_configuration_errors() {
        for (start, page, size) in [(0, None, None), (1, Some(2), None), (1, Some(0), Some(3)), (1, Some(1), Some(0))] {
            assert!(matches!(
                Window::new(start, page, size),
                Err(FlatFileError::Configuration(_))
            ));
        }
    }

    #[test]
    fn huge_pages_saturate_instead_of_overflowing() {
        let w = Window::new(u64::MAX - 1, Some(u64::MAX), Some(u64::MAX)).unwrap();
        assert_eq!(w.lo, u64::MAX);
        assert!(!w.contains(1));
    }
}
