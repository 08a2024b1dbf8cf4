pub const MAX_PAGE_SIZE: usize = 1000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Page window after clamping. Construct through [`PageRequest::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// `page` clamps to at least 1; `page_size` to `1..=max_page_size`, where
    /// `max_page_size` itself never exceeds [`MAX_PAGE_SIZE`].
    pub fn clamped(page: i64, page_size: i64, max_page_size: usize) -> Self {
        let max = max_page_size.clamp(1, MAX_PAGE_SIZE) as i64;
        Self {
            page: page.max(1) as u64,
            page_size: page_size.clamp(1, max) as u64,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub total_pages: u64,
    pub has_more: bool,
}

impl PageMeta {
    pub fn compute(total_rows: u64, req: &PageRequest) -> Self {
        let total_pages = total_rows.div_ceil(req.page_size);
        Self {
            total_pages,
            has_more: req.page < total_pages,
        }
    }
}
