use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    /// Page numbers and sizes come straight from the query string, so the
    /// offset math saturates instead of trusting the client's range.
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Name,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    #[schema(value_type = Option<String>, example = "5.00")]
    pub min_price: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "50.00")]
    pub max_price: Option<Decimal>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults_and_clamps() {
        let defaults = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(defaults.normalize(), (1, 20, 0));

        let out_of_range = Pagination {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(out_of_range.normalize(), (1, 100, 0));
    }

    #[test]
    fn normalize_caps_offset_for_extreme_pages() {
        let extreme = Pagination {
            page: Some(i64::MAX),
            per_page: Some(100),
        };
        let (page, per_page, offset) = extreme.normalize();
        assert_eq!(page, i64::MAX);
        assert_eq!(per_page, 100);
        assert_eq!(offset, i64::MAX);
    }
}
