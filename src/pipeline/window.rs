//! Page-window planning.
//!
//! A document is split into contiguous, half-open page ranges of at most
//! `max_window_pages` pages. Windows are disjoint, ordered by start, and
//! together cover exactly `[0, page_count)`.

use crate::fingerprint::Fingerprint;
use serde::Serialize;
use std::fmt;

/// A half-open, 0-indexed page range `[start, end)` of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageWindow {
    pub document: Fingerprint,
    pub start: usize,
    pub end: usize,
}

impl PageWindow {
    pub fn new(document: Fingerprint, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            document,
            start,
            end,
        }
    }

    /// Number of pages in the window.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 0-indexed page numbers covered by the window.
    pub fn pages(&self) -> impl Iterator<Item = usize> {
        self.start..self.end
    }
}

impl fmt::Display for PageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// How a document will be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowPlan {
    /// Zero pages: nothing to annotate, nothing to persist.
    Empty,
    /// The whole document fits in one call; no merge needed.
    Single(PageWindow),
    /// Several windows whose records must be merged in start order.
    Chunked(Vec<PageWindow>),
}

impl WindowPlan {
    /// Number of annotation calls the plan needs.
    pub fn len(&self) -> usize {
        match self {
            WindowPlan::Empty => 0,
            WindowPlan::Single(_) => 1,
            WindowPlan::Chunked(w) => w.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, WindowPlan::Empty)
    }

    /// All windows in ascending start order.
    pub fn windows(&self) -> Vec<PageWindow> {
        match self {
            WindowPlan::Empty => Vec::new(),
            WindowPlan::Single(w) => vec![w.clone()],
            WindowPlan::Chunked(w) => w.clone(),
        }
    }
}

/// Split `page_count` pages into windows of at most `max_window_pages`.
///
/// `max_window_pages` of 0 is treated as 1.
pub fn plan_windows(
    document: &Fingerprint,
    page_count: usize,
    max_window_pages: usize,
) -> WindowPlan {
    let size = max_window_pages.max(1);
    if page_count == 0 {
        return WindowPlan::Empty;
    }
    if page_count <= size {
        return WindowPlan::Single(PageWindow::new(document.clone(), 0, page_count));
    }

    let windows = (0..page_count)
        .step_by(size)
        .map(|start| PageWindow::new(document.clone(), start, (start + size).min(page_count)))
        .collect();
    WindowPlan::Chunked(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::from_name("doc.pdf")
    }

    fn ranges(plan: &WindowPlan) -> Vec<(usize, usize)> {
        plan.windows().iter().map(|w| (w.start, w.end)).collect()
    }

    #[test]
    fn twenty_pages_by_eight() {
        let plan = plan_windows(&fp(), 20, 8);
        assert_eq!(ranges(&plan), vec![(0, 8), (8, 16), (16, 20)]);
        assert!(matches!(plan, WindowPlan::Chunked(_)));
    }

    #[test]
    fn zero_pages_is_empty_plan() {
        let plan = plan_windows(&fp(), 0, 8);
        assert_eq!(plan, WindowPlan::Empty);
        assert_eq!(plan.len(), 0);
        assert!(plan.windows().is_empty());
    }

    #[test]
    fn short_document_is_single_call() {
        let plan = plan_windows(&fp(), 8, 8);
        assert_eq!(plan, WindowPlan::Single(PageWindow::new(fp(), 0, 8)));
        let plan = plan_windows(&fp(), 1, 8);
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan, WindowPlan::Single(_)));
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let plan = plan_windows(&fp(), 16, 8);
        assert_eq!(ranges(&plan), vec![(0, 8), (8, 16)]);
    }

    #[test]
    fn windows_tile_the_document() {
        for page_count in 0..60 {
            for size in 1..12 {
                let windows = plan_windows(&fp(), page_count, size).windows();
                let mut cursor = 0;
                for w in &windows {
                    assert_eq!(w.start, cursor, "gap or overlap at {page_count}/{size}");
                    assert!(w.end > w.start);
                    assert!(w.len() <= size);
                    cursor = w.end;
                }
                assert_eq!(cursor, page_count);
                assert_eq!(windows.len(), page_count.div_ceil(size));
            }
        }
    }

    #[test]
    fn window_display_and_pages() {
        let w = PageWindow::new(fp(), 8, 11);
        assert_eq!(w.to_string(), "[8, 11)");
        assert_eq!(w.pages().collect::<Vec<_>>(), vec![8, 9, 10]);
    }
}
