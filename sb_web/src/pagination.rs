//! ABOUTME: Page arithmetic and page-link windows for paginated listings
//! ABOUTME: Builds URLs that keep the active filters and drop page=1

use serde::Serialize;
use url::form_urlencoded;

pub const DEFAULT_MAX_PER_PAGE: i64 = 100;

/// One entry in the rendered page bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub page: Option<i64>,
    pub url: String,
    pub is_current: bool,
    pub is_ellipsis: bool,
}

impl PageLink {
    fn page(page: i64, url: String, is_current: bool) -> Self {
        Self {
            page: Some(page),
            url,
            is_current,
            is_ellipsis: false,
        }
    }

    fn ellipsis() -> Self {
        Self {
            page: None,
            url: String::new(),
            is_current: false,
            is_ellipsis: true,
        }
    }

    /// Label for templates: the page number or an ellipsis
    pub fn label(&self) -> String {
        self.page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "…".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
    base_url: String,
    params: Vec<(String, String)>,
}

impl Pagination {
    pub fn new(
        page: i64,
        per_page: i64,
        total: i64,
        base_url: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Self {
        let per_page = per_page.max(1);
        let total = total.max(0);
        let pages = if total > 0 {
            (total + per_page - 1) / per_page
        } else {
            1
        };

        Self {
            page: page.max(1).min(pages),
            per_page,
            total,
            pages,
            base_url: base_url.into(),
            params,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }

    pub fn prev_page(&self) -> Option<i64> {
        self.has_prev().then(|| self.page - 1)
    }

    pub fn next_page(&self) -> Option<i64> {
        self.has_next().then(|| self.page + 1)
    }

    pub fn start_index(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn end_index(&self) -> i64 {
        (self.start_index() + self.per_page).min(self.total)
    }

    pub fn offset(&self) -> i64 {
        self.start_index()
    }

    /// URL for `page`, keeping every other query parameter
    pub fn page_url(&self, page: i64) -> String {
        if self.base_url.is_empty() {
            return String::new();
        }

        let mut params = self.params.clone();
        match params.iter_mut().find(|(k, _)| k == "page") {
            Some(entry) => entry.1 = page.to_string(),
            None => params.push(("page".to_string(), page.to_string())),
        }
        if page == 1 {
            params.retain(|(k, _)| k != "page");
        }

        if params.is_empty() {
            return self.base_url.clone();
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        let separator = if self.base_url.contains('?') { "&" } else { "?" };
        format!("{}{}{}", self.base_url, separator, query)
    }

    pub fn prev_url(&self) -> String {
        self.prev_page().map(|p| self.page_url(p)).unwrap_or_default()
    }

    pub fn next_url(&self) -> String {
        self.next_page().map(|p| self.page_url(p)).unwrap_or_default()
    }

    /// Window of at most `max_visible` page links, with first/last anchors and ellipses
    pub fn links(&self, max_visible: i64) -> Vec<PageLink> {
        let mut links = Vec::new();
        if self.pages <= 1 {
            return links;
        }
        let max_visible = max_visible.max(1);

        let mut start = (self.page - max_visible / 2).max(1);
        let end = (start + max_visible - 1).min(self.pages);
        if end - start < max_visible - 1 {
            start = (end - max_visible + 1).max(1);
        }

        if start > 1 {
            links.push(PageLink::page(1, self.page_url(1), false));
            if start > 2 {
                links.push(PageLink::ellipsis());
            }
        }

        for page in start..=end {
            links.push(PageLink::page(page, self.page_url(page), page == self.page));
        }

        if end < self.pages {
            if end < self.pages - 1 {
                links.push(PageLink::ellipsis());
            }
            links.push(PageLink::page(self.pages, self.page_url(self.pages), false));
        }

        links
    }

    /// Default five-link window, for templates
    pub fn window(&self) -> Vec<PageLink> {
        self.links(5)
    }
}

/// Validated page/per_page pair taken from a query string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: i64,
    pub per_page: i64,
    pub offset: i64,
}

impl PaginationParams {
    pub fn from_query(
        page: Option<i64>,
        per_page: Option<i64>,
        default_per_page: i64,
        max_per_page: i64,
    ) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(default_per_page)
            .clamp(1, max_per_page.max(1));
        Self {
            page,
            per_page,
            // page comes straight from the query string
            offset: (page - 1).saturating_mul(per_page),
        }
    }

    pub fn page_request(&self) -> sb_db::PageRequest {
        sb_db::PageRequest::new(self.per_page, self.offset)
    }
}

/// Query parameters worth carrying into page links: non-blank values only
pub fn carried_params(pairs: &[(&str, &Option<String>)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages_of(p: &Pagination) -> Vec<Option<i64>> {
        p.links(5).into_iter().map(|l| l.page).collect()
    }

    #[test]
    fn test_clamping_and_zero_total() {
        let p = Pagination::new(0, 0, 0, "/companies", vec![]);
        assert_eq!((p.page, p.per_page, p.pages), (1, 1, 1));
        assert!(!p.has_prev() && !p.has_next());
        assert_eq!(p.end_index(), 0);

        let p = Pagination::new(99, 10, 45, "/companies", vec![]);
        assert_eq!(p.pages, 5);
        assert_eq!(p.page, 5);
        assert_eq!(p.start_index(), 40);
        assert_eq!(p.end_index(), 45);
        assert_eq!(p.prev_page(), Some(4));
        assert_eq!(p.next_page(), None);
    }

    #[test]
    fn test_page_url_keeps_params_and_drops_first_page() {
        let params = vec![
            ("q".to_string(), "ai tools".to_string()),
            ("country".to_string(), "Kazakhstan".to_string()),
        ];
        let p = Pagination::new(2, 10, 100, "/companies", params);
        assert_eq!(p.page_url(1), "/companies?q=ai+tools&country=Kazakhstan");
        assert_eq!(
            p.page_url(3),
            "/companies?q=ai+tools&country=Kazakhstan&page=3"
        );

        let p = Pagination::new(1, 10, 100, "/admin/users?sort=new", vec![]);
        assert_eq!(p.page_url(2), "/admin/users?sort=new&page=2");
        assert_eq!(p.page_url(1), "/admin/users?sort=new");

        let p = Pagination::new(1, 10, 100, "", vec![]);
        assert_eq!(p.page_url(2), "");
    }

    #[test]
    fn test_existing_page_param_is_replaced_in_place() {
        let params = vec![
            ("page".to_string(), "7".to_string()),
            ("q".to_string(), "x".to_string()),
        ];
        let p = Pagination::new(1, 10, 100, "/news", params);
        assert_eq!(p.page_url(4), "/news?page=4&q=x");
    }

    #[test]
    fn test_link_windows() {
        assert!(Pagination::new(1, 10, 10, "/x", vec![]).links(5).is_empty());

        let p = Pagination::new(1, 10, 100, "/x", vec![]);
        assert_eq!(
            pages_of(&p),
            vec![Some(1), Some(2), Some(3), Some(4), Some(5), None, Some(10)]
        );

        let p = Pagination::new(10, 10, 100, "/x", vec![]);
        assert_eq!(
            pages_of(&p),
            vec![Some(1), None, Some(6), Some(7), Some(8), Some(9), Some(10)]
        );

        let p = Pagination::new(5, 10, 100, "/x", vec![]);
        assert_eq!(
            pages_of(&p),
            vec![Some(1), None, Some(3), Some(4), Some(5), Some(6), Some(7), None, Some(10)]
        );

        // start == 2: first link without an ellipsis
        let p = Pagination::new(4, 10, 70, "/x", vec![]);
        assert_eq!(
            pages_of(&p),
            vec![Some(1), Some(2), Some(3), Some(4), Some(5), Some(6), Some(7)]
        );
        let current: Vec<_> = p.links(5).into_iter().filter(|l| l.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].page, Some(4));
    }

    #[test]
    fn test_pagination_params() {
        let p = PaginationParams::from_query(Some(0), Some(500), 20, DEFAULT_MAX_PER_PAGE);
        assert_eq!((p.page, p.per_page, p.offset), (1, 100, 0));

        let p = PaginationParams::from_query(Some(3), None, 20, DEFAULT_MAX_PER_PAGE);
        assert_eq!((p.page, p.per_page, p.offset), (3, 20, 40));

        let p = PaginationParams::from_query(None, Some(-5), 20, DEFAULT_MAX_PER_PAGE);
        assert_eq!(p.per_page, 1);
    }

    #[test]
    fn test_huge_page_number_saturates_offset() {
        let p = PaginationParams::from_query(Some(i64::MAX), Some(50), 20, DEFAULT_MAX_PER_PAGE);
        assert_eq!(p.page, i64::MAX);
        assert_eq!(p.offset, i64::MAX);

        let page = Pagination::new(p.page, p.per_page, 120, "/companies", vec![]);
        assert_eq!(page.page, 3);
        assert_eq!(page.offset(), 100);
    }

    #[test]
    fn test_carried_params_skip_blanks() {
        let q = Some("fintech".to_string());
        let blank = Some("  ".to_string());
        let params = carried_params(&[("q", &q), ("country", &blank), ("stage", &None)]);
        assert_eq!(params, vec![("q".to_string(), "fintech".to_string())]);
    }
}
