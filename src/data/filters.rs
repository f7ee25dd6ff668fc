use serde::Serialize;

use crate::validator::{permitted_value, Validator};

/// Pagination and sorting parameters for list endpoints.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Column to sort on. `validate_filters` rejects values outside the
    /// safelist before any query is built; the `id` fallback is unreachable
    /// from validated input.
    pub fn sort_column(&self) -> &str {
        if permitted_value(&self.sort.as_str(), self.sort_safelist) {
            self.sort.trim_start_matches('-')
        } else {
            "id"
        }
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') {
            "DESC"
        } else {
            "ASC"
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page <= 0, "page", "must be greater than zero");
    v.check(f.page > 10_000_000, "page", "must be a maximum of 10 million");
    v.check(f.page_size <= 0, "page_size", "must be greater than zero");
    v.check(f.page_size > 100, "page_size", "must be a maximum of 100");
    v.check(!permitted_value(&f.sort.as_str(), f.sort_safelist), "sort", "invalid sort value");
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
