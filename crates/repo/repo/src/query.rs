use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::RepoError;

/// Default page size when the caller does not ask for one.
pub const DEFAULT_LIMIT: u32 = 100;

/// Hard cap on a single page; larger requests are clamped.
pub const MAX_LIMIT: u32 = 1000;

/// Pagination and ordering parameters for a `list` call.
///
/// `order_by` names one sortable field, optionally suffixed with a
/// direction: `"year"`, `"year.asc"`, `"year.desc"`. Unknown fields and
/// directions are rejected at compile time, never silently ignored.
#[derive(Debug, Clone)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
    pub order_by: Option<String>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            order_by: None,
        }
    }
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            order_by: None,
        }
    }

    /// A one-row page, for unique lookups expressed as filters.
    pub fn single() -> Self {
        Self::new(1, 0)
    }

    pub fn ordered_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }
}

/// A typed scalar a predicate compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl ScalarValue {
    /// Compare two scalars of the same kind. Mismatched kinds are
    /// incomparable and yield `None`.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// One compiled predicate. A filter compiles to a conjunction of these.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Exact equality.
    Eq {
        field: &'static str,
        value: ScalarValue,
    },
    /// Case-insensitive substring match on a text field.
    Contains {
        field: &'static str,
        needle: String,
    },
    /// Inclusive lower bound.
    Ge {
        field: &'static str,
        value: ScalarValue,
    },
    /// Inclusive upper bound.
    Le {
        field: &'static str,
        value: ScalarValue,
    },
}

impl Predicate {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Eq { field, .. }
            | Self::Contains { field, .. }
            | Self::Ge { field, .. }
            | Self::Le { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The output of the filter compiler: a predicate conjunction, one
/// deterministic ordering (the entity id is always the tiebreak) and a
/// bounded page window.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub predicates: Vec<Predicate>,
    pub order_field: &'static str,
    pub direction: SortDirection,
    pub limit: u32,
    pub offset: u32,
}

/// Compile a sparse filter plus pagination into a [`CompiledQuery`].
///
/// Absent filter fields impose no constraint. `limit == 0` and unknown
/// `order_by` values fail with [`RepoError::Validation`]; limits above
/// [`MAX_LIMIT`] are clamped.
pub fn compile<E: Entity>(filter: &E::Filter, page: &Page) -> Result<CompiledQuery, RepoError> {
    if page.limit == 0 {
        return Err(RepoError::Validation("limit must be positive".to_owned()));
    }

    let (order_field, direction) = match page.order_by.as_deref() {
        None => ("id", SortDirection::Asc),
        Some(raw) => parse_order_by(raw, E::SORTABLE)?,
    };

    Ok(CompiledQuery {
        predicates: crate::entity::EntityFilter::predicates(filter),
        order_field,
        direction,
        limit: page.limit.min(MAX_LIMIT),
        offset: page.offset,
    })
}

fn parse_order_by(
    raw: &str,
    sortable: &'static [&'static str],
) -> Result<(&'static str, SortDirection), RepoError> {
    let (name, direction) = match raw.split_once('.') {
        None => (raw, SortDirection::Asc),
        Some((name, "asc")) => (name, SortDirection::Asc),
        Some((name, "desc")) => (name, SortDirection::Desc),
        Some((_, other)) => {
            return Err(RepoError::Validation(format!(
                "unknown sort direction `{other}`; expected `asc` or `desc`"
            )));
        }
    };

    if name == "id" {
        return Ok(("id", direction));
    }
    sortable
        .iter()
        .find(|field| **field == name)
        .map(|field| (*field, direction))
        .ok_or_else(|| RepoError::Validation(format!("`{name}` is not a sortable field")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Books;
    use librarium_model::BookFilter;

    fn page(order_by: &str) -> Page {
        Page::default().ordered_by(order_by)
    }

    #[test]
    fn absent_fields_produce_no_predicates() {
        let query = compile::<Books>(&BookFilter::default(), &Page::default()).unwrap();
        assert!(query.predicates.is_empty());
        assert_eq!(query.order_field, "id");
        assert_eq!(query.direction, SortDirection::Asc);
        assert_eq!(query.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn present_fields_compile_to_a_conjunction() {
        let filter = BookFilter {
            title_contains: Some("war".to_owned()),
            year_from: Some(1900),
            year_to: Some(1950),
            is_published: Some(true),
            ..BookFilter::default()
        };
        let query = compile::<Books>(&filter, &Page::default()).unwrap();
        assert_eq!(query.predicates.len(), 4);
        assert!(query.predicates.iter().any(|p| matches!(
            p,
            Predicate::Ge { field: "year", value: ScalarValue::Int(1900) }
        )));
        assert!(query.predicates.iter().any(|p| matches!(
            p,
            Predicate::Contains { field: "title", .. }
        )));
    }

    #[test]
    fn order_by_with_direction_suffix() {
        let query = compile::<Books>(&BookFilter::default(), &page("year.desc")).unwrap();
        assert_eq!(query.order_field, "year");
        assert_eq!(query.direction, SortDirection::Desc);
    }

    #[test]
    fn unknown_order_field_is_a_validation_error() {
        let err = compile::<Books>(&BookFilter::default(), &page("sausage")).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[test]
    fn unknown_direction_is_a_validation_error() {
        let err = compile::<Books>(&BookFilter::default(), &page("year.sideways")).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[test]
    fn zero_limit_is_rejected_and_large_limits_clamp() {
        let err =
            compile::<Books>(&BookFilter::default(), &Page::new(0, 0)).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));

        let query =
            compile::<Books>(&BookFilter::default(), &Page::new(10_000, 0)).unwrap();
        assert_eq!(query.limit, MAX_LIMIT);
    }

    #[test]
    fn id_is_always_sortable() {
        let query = compile::<Books>(&BookFilter::default(), &page("id.desc")).unwrap();
        assert_eq!(query.order_field, "id");
        assert_eq!(query.direction, SortDirection::Desc);
    }
}
