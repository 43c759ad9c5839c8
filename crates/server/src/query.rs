//! Validates caller-supplied pagination, sorting and filter parameters and
//! compiles them into a bound SQL predicate with deterministic ordering.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{AppError, Result};

/// Zero-based page index plus page size, rejected before any query runs.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Result<Self> {
        if page < 0 || size <= 0 {
            return Err(AppError::Validation(
                "Invalid pagination parameters.".to_string(),
            ));
        }
        Ok(Self { page, size })
    }

    fn offset(&self) -> i64 {
        self.page * self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "ASC" | "ASCENDING" => Ok(SortDirection::Asc),
            "DESC" | "DESCENDING" => Ok(SortDirection::Desc),
            _ => Err(AppError::Validation(
                "Invalid sort direction. Use ASC or DESC.".to_string(),
            )),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Maps an API-facing sort field to its SQL column through a per-resource
/// whitelist. Anything outside the whitelist is rejected naming the allowed set.
pub fn resolve_sort_field(
    fields: &[(&'static str, &'static str)],
    requested: &str,
) -> Result<&'static str> {
    fields
        .iter()
        .find(|(api, _)| *api == requested)
        .map(|(_, column)| *column)
        .ok_or_else(|| {
            let allowed: Vec<&str> = fields.iter().map(|(api, _)| *api).collect();
            AppError::Validation(format!(
                "Invalid sort field. Allowed: {}.",
                allowed.join(", ")
            ))
        })
}

/// One typed predicate clause. Values are always bound, never interpolated.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Case-insensitive substring match; the pattern is pre-trimmed and lowered.
    Contains {
        column: &'static str,
        pattern: String,
    },
    EqText {
        column: &'static str,
        value: String,
    },
    EqInt {
        column: &'static str,
        value: i64,
    },
    NeInt {
        column: &'static str,
        value: i64,
    },
    EqDate {
        column: &'static str,
        value: NaiveDate,
    },
    /// Half-open timestamp window, `from <= col < to`.
    TimestampWithin {
        column: &'static str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl Filter {
    /// Blank and absent inputs produce no clause at all.
    pub fn contains(column: &'static str, value: Option<&str>) -> Option<Self> {
        let value = value?.trim();
        if value.is_empty() {
            return None;
        }
        Some(Filter::Contains {
            column,
            pattern: format!("%{}%", value.to_lowercase()),
        })
    }

    fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Filter::Contains { column, pattern } => {
                qb.push("lower(")
                    .push(*column)
                    .push(") LIKE ")
                    .push_bind(pattern.clone());
            }
            Filter::EqText { column, value } => {
                qb.push(*column).push(" = ").push_bind(value.clone());
            }
            Filter::EqInt { column, value } => {
                qb.push(*column).push(" = ").push_bind(*value);
            }
            Filter::NeInt { column, value } => {
                qb.push(*column).push(" <> ").push_bind(*value);
            }
            Filter::EqDate { column, value } => {
                qb.push(*column).push(" = ").push_bind(*value);
            }
            Filter::TimestampWithin { column, from, to } => {
                qb.push(*column)
                    .push(" >= ")
                    .push_bind(*from)
                    .push(" AND ")
                    .push(*column)
                    .push(" < ")
                    .push_bind(*to);
            }
        }
    }
}

/// AND-composition of an optional mandatory scope clause and caller filters,
/// with a validated ordering. The scope is held apart from the filters so the
/// ownership boundary cannot be overridden or forgotten by a caller clause.
pub struct QuerySpec {
    scope: Option<Filter>,
    filters: Vec<Filter>,
    order_column: &'static str,
    direction: SortDirection,
    id_column: &'static str,
    page: PageRequest,
}

impl QuerySpec {
    /// Spec with a hard ownership scope; used by every non-admin listing.
    pub fn scoped(scope: Filter, page: PageRequest) -> Self {
        Self {
            scope: Some(scope),
            filters: Vec::new(),
            order_column: "id",
            direction: SortDirection::Desc,
            id_column: "id",
            page,
        }
    }

    /// Spec without an ownership scope; only the admin user listing uses this.
    pub fn unscoped(page: PageRequest) -> Self {
        Self {
            scope: None,
            filters: Vec::new(),
            order_column: "id",
            direction: SortDirection::Desc,
            id_column: "id",
            page,
        }
    }

    pub fn filter(mut self, filter: Option<Filter>) -> Self {
        if let Some(filter) = filter {
            self.filters.push(filter);
        }
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: SortDirection) -> Self {
        self.order_column = column;
        self.direction = direction;
        self
    }

    /// Identity column for the mandatory tie-break (qualified for joins).
    pub fn tie_break(mut self, id_column: &'static str) -> Self {
        self.id_column = id_column;
        self
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let clauses = self.scope.iter().chain(self.filters.iter());
        for (i, clause) in clauses.enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            clause.push(qb);
        }
    }

    fn push_order(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        // Trailing tie-break on the identity key keeps page boundaries stable
        // when the primary sort field has duplicate values.
        qb.push(" ORDER BY ")
            .push(self.order_column)
            .push(" ")
            .push(self.direction.sql())
            .push(", ")
            .push(self.id_column)
            .push(" DESC");
    }

    /// Runs the compiled COUNT and SELECT queries and assembles one page.
    pub async fn fetch_page<T>(
        &self,
        pool: &SqlitePool,
        from: &str,
        columns: &str,
    ) -> Result<Page<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
    {
        let mut count_qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {from}"));
        self.push_where(&mut count_qb);
        let total_elements: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {columns} FROM {from}"));
        self.push_where(&mut qb);
        self.push_order(&mut qb);
        qb.push(" LIMIT ").push_bind(self.page.size);
        qb.push(" OFFSET ").push_bind(self.page.offset());

        let content = qb.build_query_as::<T>().fetch_all(pool).await?;

        Ok(Page::new(content, self.page, total_elements))
    }

    #[cfg(test)]
    fn render(&self, head: &str) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new(head.to_string());
        self.push_where(&mut qb);
        self.push_order(&mut qb);
        qb.into_sql()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: PageRequest, total_elements: i64) -> Self {
        Self {
            content,
            page: page.page,
            size: page.size,
            total_elements,
            total_pages: (total_elements + page.size - 1) / page.size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}
