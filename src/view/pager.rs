//! Pager configuration, per-execution pager state and pager controls.

use serde::{Deserialize, Serialize};

use crate::render::RenderNode;

/// How results are split into pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagerKind {
    /// Every row.
    #[default]
    None,
    /// A fixed number of rows, no controls.
    Some,
    /// Numbered pages; needs a row count.
    Full,
    /// Previous/next only; fetches one extra row to detect a next page.
    Mini,
}

/// Pager section of a display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerConfig {
    /// Pager kind.
    #[serde(rename = "type", default)]
    pub kind: PagerKind,
    /// Rows per page; `0` means unlimited.
    #[serde(default)]
    pub items_per_page: u64,
    /// Rows skipped before the first page.
    #[serde(default)]
    pub offset: u64,
}

impl PagerConfig {
    /// A pager of `kind` with `items_per_page` rows.
    pub fn new(kind: PagerKind, items_per_page: u64) -> Self {
        Self {
            kind,
            items_per_page,
            offset: 0,
        }
    }

    /// Sets the leading offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Whether computing the state needs the total row count.
    pub fn needs_count(&self) -> bool {
        self.kind == PagerKind::Full && self.items_per_page > 0
    }
}

/// Pager state of one execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PagerState {
    /// Pager kind.
    pub kind: PagerKind,
    /// Zero-based current page.
    pub page: u64,
    /// Rows per page; `0` means unlimited.
    pub items_per_page: u64,
    /// Rows skipped by the query.
    pub offset: u64,
    /// Rows the query fetches.
    pub limit: Option<u64>,
    /// Total rows, when counted.
    pub total: Option<u64>,
    /// Number of pages, when counted.
    pub page_count: Option<u64>,
    /// Whether a page follows the current one.
    pub has_next: bool,
}

impl PagerState {
    /// Computes the window for `requested` page. `total` is consulted by full
    /// pagers, which clamp the page to the last one.
    pub fn compute(
        config: &PagerConfig,
        items_per_page: u64,
        requested: u64,
        total: Option<u64>,
    ) -> Self {
        let unlimited = Self {
            kind: config.kind,
            page: 0,
            items_per_page: 0,
            offset: config.offset,
            limit: None,
            total,
            page_count: None,
            has_next: false,
        };
        if items_per_page == 0 {
            return unlimited;
        }
        match config.kind {
            PagerKind::None => unlimited,
            PagerKind::Some => Self {
                items_per_page,
                limit: Some(items_per_page),
                ..unlimited
            },
            PagerKind::Full => {
                let rows = total.unwrap_or(0).saturating_sub(config.offset);
                let page_count = rows.div_ceil(items_per_page).max(1);
                let page = requested.min(page_count - 1);
                Self {
                    page,
                    items_per_page,
                    offset: config.offset.saturating_add(page * items_per_page),
                    limit: Some(items_per_page),
                    page_count: Some(page_count),
                    has_next: page + 1 < page_count,
                    ..unlimited
                }
            }
            PagerKind::Mini => Self {
                page: requested,
                items_per_page,
                offset: config
                    .offset
                    .saturating_add(requested.saturating_mul(items_per_page)),
                limit: Some(items_per_page.saturating_add(1)),
                ..unlimited
            },
        }
    }

    /// Records how many rows came back and returns how many to keep.
    pub fn settle(&mut self, fetched: usize) -> usize {
        if self.kind == PagerKind::Mini && self.items_per_page > 0 {
            let page_rows = self.items_per_page as usize;
            self.has_next = fetched > page_rows;
            return fetched.min(page_rows);
        }
        fetched
    }

    /// Whether pager controls are rendered.
    pub fn has_controls(&self) -> bool {
        self.items_per_page > 0 && matches!(self.kind, PagerKind::Full | PagerKind::Mini)
    }

    /// Pager controls; links carry the page in `param`.
    pub fn render(&self, param: &str) -> RenderNode {
        if !self.has_controls() {
            return RenderNode::Empty;
        }
        let link = |page: u64, label: &str, class: &str| {
            RenderNode::element(
                "li",
                vec![RenderNode::link(&format!("?{param}={page}"), label)],
            )
            .with_class(class)
        };
        let mut items = Vec::new();
        if self.page > 0 {
            if self.kind == PagerKind::Full {
                items.push(link(0, "« first", "pager__item pager__item--first"));
            }
            items.push(link(self.page - 1, "‹ previous", "pager__item pager__item--previous"));
        }
        match (self.kind, self.page_count) {
            (PagerKind::Full, Some(count)) => {
                let (first, last) = page_window(self.page, count);
                for page in first..=last {
                    if page == self.page {
                        items.push(current(&(page + 1).to_string()));
                    } else {
                        items.push(link(page, &(page + 1).to_string(), "pager__item"));
                    }
                }
            }
            _ => items.push(current(&format!("Page {}", self.page.saturating_add(1)))),
        }
        if self.has_next {
            let next = self.page.saturating_add(1);
            items.push(link(next, "next ›", "pager__item pager__item--next"));
            if let (PagerKind::Full, Some(count)) = (self.kind, self.page_count) {
                items.push(link(count - 1, "last »", "pager__item pager__item--last"));
            }
        }
        RenderNode::element(
            "nav",
            vec![RenderNode::element("ul", items).with_class("pager__items")],
        )
        .with_class("pager")
    }
}

const PAGE_WINDOW: u64 = 9;

fn page_window(page: u64, count: u64) -> (u64, u64) {
    if count <= PAGE_WINDOW {
        return (0, count - 1);
    }
    let half = PAGE_WINDOW / 2;
    let first = page.saturating_sub(half).min(count - PAGE_WINDOW);
    (first, first + PAGE_WINDOW - 1)
}

fn current(label: &str) -> RenderNode {
    RenderNode::element("li", vec![RenderNode::text(label)])
        .with_class("pager__item is-active")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pager_clamps_to_the_last_page() {
        let config = PagerConfig::new(PagerKind::Full, 10);
        let state = PagerState::compute(&config, 10, 7, Some(25));
        assert_eq!(state.page, 2);
        assert_eq!(state.offset, 20);
        assert_eq!(state.limit, Some(10));
        assert_eq!(state.page_count, Some(3));
        assert!(!state.has_next);
        assert_eq!(state, PagerState::compute(&config, 10, 7, Some(25)));
    }

    #[test]
    fn mini_pager_fetches_one_extra_row() {
        let config = PagerConfig::new(PagerKind::Mini, 5).with_offset(1);
        let mut state = PagerState::compute(&config, 5, 1, None);
        assert_eq!(state.offset, 6);
        assert_eq!(state.limit, Some(6));
        assert_eq!(state.settle(6), 5);
        assert!(state.has_next);
        assert_eq!(state.settle(3), 3);
        assert!(!state.has_next);
    }

    #[test]
    fn none_and_some_pagers() {
        let none = PagerState::compute(&PagerConfig::default(), 0, 3, None);
        assert_eq!((none.offset, none.limit), (0, None));
        let some = PagerConfig::new(PagerKind::Some, 3).with_offset(2);
        let state = PagerState::compute(&some, 3, 9, None);
        assert_eq!((state.page, state.offset, state.limit), (0, 2, Some(3)));
        assert!(!state.has_controls());
    }

    #[test]
    fn full_pager_controls() {
        let config = PagerConfig::new(PagerKind::Full, 10);
        let state = PagerState::compute(&config, 10, 1, Some(30));
        let html = state.render("page").to_html();
        assert!(html.starts_with("<nav class=\"pager\"><ul class=\"pager__items\">"));
        assert!(html.contains("<a href=\"?page=0\">« first</a>"));
        assert!(html.contains("<li class=\"pager__item is-active\">2</li>"));
        assert!(html.contains("<a href=\"?page=2\">last »</a>"));
    }

    #[test]
    fn huge_requested_pages_saturate() {
        let mini = PagerConfig::new(PagerKind::Mini, 10).with_offset(3);
        let mut state = PagerState::compute(&mini, 10, u64::MAX, None);
        assert_eq!(state.page, u64::MAX);
        assert_eq!(state.offset, u64::MAX);
        assert_eq!(state.limit, Some(11));
        assert_eq!(state.settle(0), 0);
        assert!(!state.has_next);
        assert!(state.render("page").to_html().contains("Page 18446744073709551615"));

        let some = PagerConfig::new(PagerKind::Some, 10);
        let state = PagerState::compute(&some, 10, u64::MAX, None);
        assert_eq!((state.page, state.offset, state.limit), (0, 0, Some(10)));

        let full = PagerConfig::new(PagerKind::Full, 10);
        let state = PagerState::compute(&full, 10, u64::MAX, Some(25));
        assert_eq!((state.page, state.offset), (2, 20));
    }

    #[test]
    fn mini_pager_next_link_at_the_last_page_saturates() {
        let mini = PagerConfig::new(PagerKind::Mini, 2);
        let mut state = PagerState::compute(&mini, 2, u64::MAX, None);
        state.settle(3);
        assert!(state.has_next);
        let html = state.render("page").to_html();
        assert!(html.contains("<a href=\"?page=18446744073709551615\">next ›</a>"));
    }

    #[test]
    fn full_pager_without_rows_has_one_page() {
        let full = PagerConfig::new(PagerKind::Full, 10).with_offset(50);
        let state = PagerState::compute(&full, 10, 4, Some(20));
        assert_eq!((state.page, state.offset, state.page_count), (0, 50, Some(1)));
        assert!(!state.has_next);
    }

    #[test]
    fn page_window_slides() {
        assert_eq!(page_window(0, 3), (0, 2));
        assert_eq!(page_window(10, 40), (6, 14));
        assert_eq!(page_window(39, 40), (31, 39));
    }
}
