//! Paginated, searchable, faceted list queries shared by every table endpoint.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, mysql::MySqlRow};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub limit: u32,
    #[schema(example = 3)]
    pub total_pages: u32,
    #[schema(example = 27)]
    pub total_count: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total_count: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total_count.div_ceil(u64::from(limit));
        Self {
            page,
            limit,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            total_count,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn empty(params: &ListParams) -> Self {
        Self {
            data: Vec::new(),
            pagination: Pagination::new(params.page, params.limit, 0),
        }
    }
}

/// Raw table query as it arrives in the URL.
///
/// Facets accept comma separated values: `?status=pending,approved`.
/// Unknown keys are refused so a misspelt facet cannot return unfiltered rows.
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[serde(deny_unknown_fields)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    #[schema(example = 1)]
    /// 1-based page number
    pub page: Option<u32>,
    #[schema(example = 10)]
    /// Rows per page (max 100)
    pub limit: Option<u32>,
    #[schema(example = "john")]
    /// Free-text search
    pub search: Option<String>,
    #[schema(example = "pending,approved")]
    /// Status facet
    pub status: Option<String>,
    #[schema(example = "general")]
    /// Category facet
    pub category: Option<String>,
    #[schema(example = "sick")]
    /// Leave type facet
    pub leave_type: Option<String>,
    #[schema(example = "meeting")]
    /// Event type facet
    pub event_type: Option<String>,
    #[schema(example = 3)]
    /// Department facet
    pub department_id: Option<String>,
}

/// Normalized list query: page and limit clamped, search trimmed, facets split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub status: Vec<String>,
    pub category: Vec<String>,
    pub leave_type: Vec<String>,
    pub event_type: Vec<String>,
    pub department_id: Vec<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        ListQuery::default().normalize()
    }
}

fn split_facet(raw: &Option<String>) -> Vec<String> {
    let mut values: Vec<String> = raw
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    values.sort();
    values.dedup();
    values
}

impl ListQuery {
    pub fn normalize(&self) -> ListParams {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        ListParams {
            page,
            limit,
            search,
            status: split_facet(&self.status),
            category: split_facet(&self.category),
            leave_type: split_facet(&self.leave_type),
            event_type: split_facet(&self.event_type),
            department_id: split_facet(&self.department_id),
        }
    }
}

impl ListParams {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Stable cache key; equal for queries that select the same rows.
    pub fn cache_key(&self) -> String {
        format!(
            "p={}&l={}&q={}&status={}&category={}&leave_type={}&event_type={}&department_id={}",
            self.page,
            self.limit,
            self.search.as_deref().unwrap_or(""),
            self.status.join(","),
            self.category.join(","),
            self.leave_type.join(","),
            self.event_type.join(","),
            self.department_id.join(","),
        )
    }
}

/// Parses facet values into a typed enum, rejecting unknown ones.
pub fn parse_facet<T>(name: &str, values: &[String]) -> Result<Vec<T>, ApiError>
where
    T: FromStr,
{
    values
        .iter()
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {name} filter value: {v}")))
        })
        .collect()
}

// Helper enum for typed SQLx binding
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
}

/// Dynamic WHERE clause with positional bindings.
#[derive(Debug, Default)]
pub struct SqlFilter {
    clauses: Vec<String>,
    args: Vec<FilterValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(&mut self, column: &str, value: FilterValue) -> &mut Self {
        self.clauses.push(format!("{column} = ?"));
        self.args.push(value);
        self
    }

    pub fn raw(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// `column IN (...)`; an empty value list adds nothing.
    pub fn any_of<V: AsRef<str>>(&mut self, column: &str, values: &[V]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{column} IN ({marks})"));
        self.args
            .extend(values.iter().map(|v| FilterValue::Str(v.as_ref().to_string())));
        self
    }

    pub fn any_of_ids(&mut self, column: &str, values: &[u64]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{column} IN ({marks})"));
        self.args.extend(values.iter().copied().map(FilterValue::U64));
        self
    }

    /// Case-insensitive substring match on any of `columns`.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term else {
            return self;
        };
        if columns.is_empty() {
            return self;
        }
        let like = format!("%{}%", escape_like(term));
        let ors = columns
            .iter()
            .map(|c| format!("{c} LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.clauses.push(format!("({ors})"));
        self.args
            .extend(columns.iter().map(|_| FilterValue::Str(like.clone())));
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn args(&self) -> &[FilterValue] {
        &self.args
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Runs the COUNT and the page query for `select ... from ... where ... order by`.
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    select: &str,
    from: &str,
    filter: &SqlFilter,
    order_by: &str,
    params: &ListParams,
) -> Result<Page<T>, ApiError>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let where_sql = filter.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM {from}{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in filter.args() {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
            FilterValue::Date(d) => count_q.bind(*d),
        };
    }
    let total = count_q.fetch_one(pool).await.map_err(|e| {
        tracing::error!(error = %e, sql = %count_sql, "Failed to count rows");
        ApiError::from(e)
    })?;

    let total = u64::try_from(total).unwrap_or(0);
    if total == 0 {
        return Ok(Page::empty(params));
    }

    let data_sql =
        format!("SELECT {select} FROM {from}{where_sql} ORDER BY {order_by} LIMIT ? OFFSET ?");
    tracing::debug!(sql = %data_sql, page = params.page, limit = params.limit, "Fetching page");

    let mut data_q = sqlx::query_as::<_, T>(&data_sql);
    for arg in filter.args() {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(*v),
            FilterValue::Str(s) => data_q.bind(s.as_str()),
            FilterValue::Date(d) => data_q.bind(*d),
        };
    }

    let data = data_q
        .bind(u64::from(params.limit))
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, sql = %data_sql, "Failed to fetch page");
            ApiError::from(e)
        })?;

    Ok(Page {
        data,
        pagination: Pagination::new(params.page, params.limit, total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let params = ListQuery::default().normalize();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(params.search, None);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn page_and_limit_are_clamped() {
        let params = ListQuery {
            page: Some(0),
            limit: Some(5000),
            ..Default::default()
        }
        .normalize();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, MAX_PAGE_LIMIT);

        let params = ListQuery {
            page: Some(3),
            limit: Some(0),
            ..Default::default()
        }
        .normalize();
        assert_eq!(params.limit, 1);
        assert_eq!(params.offset(), 2);
    }

    #[test]
    fn blank_search_is_dropped() {
        let params = ListQuery {
            search: Some("   ".into()),
            ..Default::default()
        }
        .normalize();
        assert_eq!(params.search, None);
    }

    #[test]
    fn facets_are_split_sorted_and_deduplicated() {
        let params = ListQuery {
            status: Some("rejected, pending,,pending".into()),
            ..Default::default()
        }
        .normalize();
        assert_eq!(params.status, vec!["pending", "rejected"]);
    }

    #[test]
    fn equivalent_queries_share_a_cache_key() {
        let a = ListQuery {
            status: Some("approved,pending".into()),
            search: Some(" ann ".into()),
            ..Default::default()
        }
        .normalize();
        let b = ListQuery {
            status: Some("pending,approved".into()),
            search: Some("ann".into()),
            page: Some(1),
            ..Default::default()
        }
        .normalize();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn unknown_facet_keys_are_refused() {
        use actix_web::web::Query;

        assert!(Query::<ListQuery>::from_query("priority=high").is_err());
        let query = Query::<ListQuery>::from_query("page=2&status=pending,approved").unwrap();
        assert_eq!(query.normalize().status, vec!["approved", "pending"]);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(Pagination::new(1, 10, 11).total_pages, 2);
        let p = Pagination::new(2, 10, 25);
        assert!(p.has_next());
        assert!(p.has_prev());
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let json = serde_json::to_value(Pagination::new(1, 10, 3)).unwrap();
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["totalCount"], 3);
    }

    #[test]
    fn filter_builds_where_clause_with_bindings() {
        let mut filter = SqlFilter::new();
        filter
            .eq("l.employee_id", FilterValue::U64(7))
            .any_of("l.status", &["pending", "approved"])
            .search(&["e.first_name", "e.last_name"], Some("an_n"));

        assert_eq!(
            filter.where_sql(),
            " WHERE l.employee_id = ? AND l.status IN (?, ?) AND (e.first_name LIKE ? OR e.last_name LIKE ?)"
        );
        assert_eq!(filter.args().len(), 5);
        assert_eq!(filter.args()[3], FilterValue::Str("%an\\_n%".into()));
    }

    #[test]
    fn empty_filter_has_no_where() {
        let mut filter = SqlFilter::new();
        filter.any_of::<&str>("status", &[]).search(&["title"], None);
        assert_eq!(filter.where_sql(), "");
        assert!(filter.args().is_empty());
    }

    #[test]
    fn unknown_facet_value_is_rejected() {
        #[derive(Debug, strum_macros::EnumString)]
        #[strum(serialize_all = "snake_case")]
        enum Colour {
            Red,
        }
        let ok: Vec<Colour> = parse_facet("colour", &["red".to_string()]).unwrap();
        assert_eq!(ok.len(), 1);
        let err = parse_facet::<Colour>("colour", &["blue".to_string()]).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("blue")));
    }
}
