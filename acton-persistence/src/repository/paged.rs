//! Paged queries with relative navigation
//!
//! A [`PagedQuery`] owns a result query, its count query (derived once, at
//! construction) and the current [`Page`]. Navigation only moves the page;
//! the query definitions never change.
//!
//! # Example
//!
//! ```rust
//! use acton_persistence::repository::Page;
//!
//! let page = Page::of(2, 10);
//! assert_eq!(page.offset(), 20);
//! assert_eq!(page.next(), Page::of(3, 10));
//! assert_eq!(Page::of(0, 10).previous(), Page::of(0, 10));
//! ```

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::error::RepositoryError;
use super::traits::RepositoryResult;
use crate::entity::Entity;
use crate::query::{derive_count_query, CriteriaQuery};
use crate::session::{Session, Window};

/// Zero-based page number and page size
///
/// The size is always at least one; deserializing a zero size fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PageParts")]
pub struct Page {
    number: u64,
    size: u64,
}

#[derive(Deserialize)]
struct PageParts {
    number: u64,
    size: u64,
}

/// A page description with a zero size
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page size must be at least 1 (page {number})")]
pub struct InvalidPageSize {
    pub number: u64,
}

impl TryFrom<PageParts> for Page {
    type Error = InvalidPageSize;

    fn try_from(parts: PageParts) -> Result<Self, Self::Error> {
        Self::try_new(parts.number, parts.size)
    }
}

impl Page {
    /// Page `number` of `size` results, rejecting a zero size
    pub fn try_new(number: u64, size: u64) -> Result<Self, InvalidPageSize> {
        if size == 0 {
            return Err(InvalidPageSize { number });
        }
        Ok(Self { number, size })
    }

    /// Page `number` of `size` results; a zero size is raised to one
    pub fn of(number: u64, size: u64) -> Self {
        Self {
            number,
            size: size.max(1),
        }
    }

    /// First page of `size` results
    pub fn first(size: u64) -> Self {
        Self::of(0, size)
    }

    /// Zero-based page number
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Number of results per page, never zero
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of results before this page
    pub fn offset(&self) -> u64 {
        self.number.saturating_mul(self.size)
    }

    /// The offset/limit window of this page
    pub fn window(&self) -> Window {
        Window::new(self.offset(), self.size)
    }

    /// The following page
    #[must_use]
    pub fn next(&self) -> Self {
        Self::of(self.number.saturating_add(1), self.size)
    }

    /// The preceding page, staying on the first page
    #[must_use]
    pub fn previous(&self) -> Self {
        Self::of(self.number.saturating_sub(1), self.size)
    }
}

/// One executed page
///
/// `count` is the number of rows matching the query ignoring the window.
/// `entities` is lazy and single-pass; it borrows the session and must be
/// drained or dropped before the session is released.
pub struct PageResult<'s, E> {
    /// Total matching rows
    pub count: u64,
    /// Entities of this page
    pub entities: BoxStream<'s, RepositoryResult<E>>,
    /// The page that was executed
    pub page: Page,
}

impl<E> PageResult<'_, E> {
    /// Number of pages needed for `count` rows
    pub fn total_pages(&self) -> u64 {
        self.count.div_ceil(self.page.size)
    }

    /// Drain the entity stream
    pub async fn into_vec(self) -> RepositoryResult<Vec<E>> {
        self.entities.try_collect().await
    }
}

impl<E> std::fmt::Debug for PageResult<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageResult")
            .field("count", &self.count)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

/// Result query plus derived count query, positioned on a page
pub struct PagedQuery<'s, E, S> {
    session: &'s S,
    entity_name: String,
    criteria: CriteriaQuery<E>,
    count_criteria: CriteriaQuery<i64>,
    page: Page,
}

impl<'s, E, S> PagedQuery<'s, E, S>
where
    E: Entity,
    S: Session,
{
    /// Capture `criteria` and derive its count query
    ///
    /// Fails with a query-shape error when no root of `criteria` matches its
    /// result type.
    pub fn new(
        session: &'s S,
        entity_name: impl Into<String>,
        criteria: CriteriaQuery<E>,
        page: Page,
    ) -> RepositoryResult<Self> {
        let entity_name = entity_name.into();
        let count_criteria = derive_count_query(&criteria).map_err(|err| {
            RepositoryError::query_shape(err.to_string())
                .with_entity(entity_name.clone())
                .with_page(page)
                .with_source(err)
        })?;
        Ok(Self {
            session,
            entity_name,
            criteria,
            count_criteria,
            page,
        })
    }

    /// Execute the count query and open the current page
    pub async fn page_result(&self) -> RepositoryResult<PageResult<'s, E>> {
        let page = self.page;
        let count = self.session.count(&self.count_criteria).await.map_err(|err| {
            RepositoryError::page_query(page, self.entity_name.clone()).with_source(err)
        })?;

        tracing::debug!(
            entity = %self.entity_name,
            page = page.number,
            size = page.size,
            total = count,
            "executing page query"
        );

        let entity_name = self.entity_name.clone();
        let entities = self
            .session
            .stream(self.criteria.clone(), page.window())
            .map_err(move |err| RepositoryError::page_query(page, entity_name.clone()).with_source(err))
            .boxed();

        Ok(PageResult {
            count: u64::try_from(count).unwrap_or_default(),
            entities,
            page,
        })
    }

    /// Move to the next page
    pub fn next(&mut self) -> &mut Self {
        self.page = self.page.next();
        self
    }

    /// Move to the previous page; no-op on the first page
    pub fn previous(&mut self) -> &mut Self {
        self.page = self.page.previous();
        self
    }

    /// Move to an explicit page
    pub fn go_to(&mut self, page: Page) -> &mut Self {
        self.page = page;
        self
    }

    /// The current page
    pub fn page(&self) -> Page {
        self.page
    }

    /// The result query
    pub fn criteria(&self) -> &CriteriaQuery<E> {
        &self.criteria
    }

    /// The derived count query
    pub fn count_criteria(&self) -> &CriteriaQuery<i64> {
        &self.count_criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_invariants() {
        assert_eq!(Page::of(4, 0).size(), 1);
        assert_eq!(Page::of(4, 10).offset(), 40);
        assert_eq!(Page::of(4, 10).window(), Window::new(40, 10));
        assert_eq!(Page::first(25), Page::of(0, 25));
    }

    #[test]
    fn test_next_previous_round_trip() {
        let page = Page::of(5, 10);
        assert_eq!(page.next().previous(), page);
        assert_eq!(Page::first(10).previous(), Page::first(10));
        assert_eq!(Page::first(10).previous().previous().number(), 0);
    }

    #[test]
    fn test_page_serde() {
        let json = serde_json::to_string(&Page::of(2, 50)).expect("serializable");
        assert_eq!(json, r#"{"number":2,"size":50}"#);
        let page: Page = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(page, Page::of(2, 50));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = serde_json::from_str::<Page>(r#"{"number":3,"size":0}"#).err().expect("zero size");
        assert!(err.to_string().contains("page size must be at least 1"));
        assert_eq!(Page::try_new(3, 0), Err(InvalidPageSize { number: 3 }));
        assert_eq!(Page::try_new(3, 4).map(|page| page.size()), Ok(4));
    }
}
