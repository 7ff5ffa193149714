//! Response envelopes.
//!
//! Single items are wrapped in a `data` envelope; lists carry pagination
//! metadata alongside.

use serde::Serialize;

/// Single-item envelope.
#[derive(Debug, Serialize)]
pub struct Item<T> {
    pub data: T,
}

/// Unpaginated collection envelope.
#[derive(Debug, Serialize)]
pub struct Collection<T> {
    pub data: Vec<T>,
}

/// Paginated collection envelope.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub count: i64,
    pub per_page: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub links: Links,
}

#[derive(Debug, Serialize)]
pub struct Links {
    pub next_page: Option<String>,
    pub previous_page: Option<String>,
}

impl<T> Paginated<T> {
    /// Build a page envelope for `data` out of `total` rows at `path`.
    pub fn new(path: &str, page: i64, per_page: i64, total: i64, data: Vec<T>) -> Self {
        let total_pages = if total == 0 { 1 } else { (total + per_page - 1) / per_page };
        let page_link = |p: i64| format!("{}?page={}&per_page={}", path, p, per_page);

        let next_page = (page < total_pages).then(|| page_link(page + 1));
        let previous_page = (page > 1).then(|| page_link(page - 1));

        Self {
            meta: Meta {
                pagination: Pagination {
                    total,
                    count: data.len() as i64,
                    per_page,
                    current_page: page,
                    total_pages,
                    links: Links { next_page, previous_page },
                },
            },
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let page = Paginated::new("/components", 1, 20, 45, vec![0u8; 20]);
        let p = &page.meta.pagination;
        assert_eq!(p.total, 45);
        assert_eq!(p.count, 20);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.links.next_page.as_deref(), Some("/components?page=2&per_page=20"));
        assert!(p.links.previous_page.is_none());
    }

    #[test]
    fn test_last_page_has_no_next_link() {
        let page = Paginated::new("/components", 3, 20, 45, vec![0u8; 5]);
        let p = &page.meta.pagination;
        assert!(p.links.next_page.is_none());
        assert_eq!(p.links.previous_page.as_deref(), Some("/components?page=2&per_page=20"));
    }

    #[test]
    fn test_empty_set_is_one_page() {
        let page = Paginated::new("/incidents", 1, 20, 0, Vec::<u8>::new());
        let p = &page.meta.pagination;
        assert_eq!(p.total_pages, 1);
        assert!(p.links.next_page.is_none());
        assert!(p.links.previous_page.is_none());
    }
}
