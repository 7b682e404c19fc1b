//! Bounded listing-page iteration.
//!
//! Replaces open-ended "click load more until it disappears" loops with a
//! finite sequence of page URLs. The caller stops early when a page comes
//! back empty; [`Pagination::restart`] rewinds for another pass.

/// Placeholder replaced with the 1-based page number.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Iterator over listing page URLs, capped at `max_pages`.
#[derive(Debug, Clone)]
pub struct Pagination {
    template: String,
    max_pages: u32,
    next_page: u32,
    stopped: bool,
}

impl Pagination {
    /// A template without `{page}` yields exactly one URL.
    pub fn new(template: impl Into<String>, max_pages: u32) -> Self {
        Self {
            template: template.into(),
            max_pages: max_pages.max(1),
            next_page: 1,
            stopped: false,
        }
    }

    /// Whether the template addresses more than one page.
    pub fn is_paged(&self) -> bool {
        self.template.contains(PAGE_PLACEHOLDER)
    }

    /// No more pages: the last one was empty or signalled the end.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Rewind to the first page.
    pub fn restart(&mut self) {
        self.next_page = 1;
        self.stopped = false;
    }

    /// 1-based number of the page most recently yielded (0 before the first).
    pub fn current_page(&self) -> u32 {
        self.next_page - 1
    }
}

impl Iterator for Pagination {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let cap = if self.is_paged() { self.max_pages } else { 1 };
        if self.stopped || self.next_page > cap {
            return None;
        }
        let url = self
            .template
            .replace(PAGE_PLACEHOLDER, &self.next_page.to_string());
        self.next_page += 1;
        Some(url)
    }
}
