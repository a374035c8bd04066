//! In-memory evaluation of compiled queries.
//!
//! The relational backend hands its compiled predicates to the database;
//! this backend evaluates the same predicates against rows directly via
//! [`FieldRead`], so both paginate and filter identically.

use std::cmp::Ordering;

use librarium_repo::{CompiledQuery, FieldRead, Predicate, ScalarValue, SortDirection};

/// True when the row satisfies every predicate in the conjunction.
pub fn matches<R: FieldRead>(row: &R, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|predicate| match predicate {
        Predicate::Eq { field, value } => row.field(field).as_ref() == Some(value),
        Predicate::Contains { field, needle } => match row.field(field) {
            Some(ScalarValue::Text(haystack)) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => false,
        },
        Predicate::Ge { field, value } => cmp_against(row, field, value)
            .is_some_and(|ord| ord != Ordering::Less),
        Predicate::Le { field, value } => cmp_against(row, field, value)
            .is_some_and(|ord| ord != Ordering::Greater),
    })
}

fn cmp_against<R: FieldRead>(row: &R, field: &str, value: &ScalarValue) -> Option<Ordering> {
    row.field(field)?.compare(value)
}

/// Filter, order and window rows into one page.
pub fn select<R: FieldRead + Clone>(
    rows: impl Iterator<Item = R>,
    query: &CompiledQuery,
) -> Vec<R> {
    let mut matching: Vec<R> = rows
        .filter(|row| matches(row, &query.predicates))
        .collect();

    matching.sort_by(|a, b| cmp_rows(a, b, query));

    matching
        .into_iter()
        .skip(query.offset as usize)
        .take(query.limit as usize)
        .collect()
}

/// Order two rows by the compiled field, with the entity id as tiebreak.
/// Absent values sort the way Postgres sorts NULL: last ascending, first
/// descending.
fn cmp_rows<R: FieldRead>(a: &R, b: &R, query: &CompiledQuery) -> Ordering {
    let primary = match (a.field(query.order_field), b.field(query.order_field)) {
        (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    };
    let primary = match query.direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };

    primary.then_with(|| {
        match (a.field("id"), b.field("id")) {
            (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        }
    })
}
