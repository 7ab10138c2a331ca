//! Search, filter and paginate a sheet's leads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{Lead, LeadStatus, SubStatus};
use crate::types::{AppError, AppResult};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PER_PAGE: usize = 25;
const ALL: &str = "ALL";

/// Query-string shape of `GET /api/sheets/{id}/leads`. Every filter is optional
/// and they combine with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub sub_status: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facets {
    pub cities: Vec<String>,
    pub categories: Vec<String>,
}

/// Compiled form of a [`LeadQuery`]; labels are validated once.
struct Filter {
    needle: String,
    status: Option<LeadStatus>,
    sub_status: Option<SubStatus>,
    city: Option<String>,
    category: Option<String>,
}

fn active_value(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ALL))
}

impl Filter {
    fn compile(query: &LeadQuery) -> AppResult<Self> {
        let status = active_value(&query.status)
            .map(|label| {
                LeadStatus::from_label(label)
                    .ok_or_else(|| AppError::InvalidRequest(format!("unknown status: {}", label)))
            })
            .transpose()?;
        let sub_status = active_value(&query.sub_status)
            .map(|label| {
                SubStatus::from_label(label)
                    .ok_or_else(|| AppError::InvalidRequest(format!("unknown sub-status: {}", label)))
            })
            .transpose()?;

        Ok(Self {
            needle: query
                .search
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default(),
            status,
            sub_status,
            city: active_value(&query.city).map(str::to_string),
            category: active_value(&query.category).map(str::to_string),
        })
    }

    fn matches(&self, lead: &Lead) -> bool {
        self.status.map_or(true, |s| lead.meta.status == s)
            && self.sub_status.map_or(true, |s| lead.meta.sub_status == s)
            && self.city.as_deref().map_or(true, |c| lead.city() == c)
            && self.category.as_deref().map_or(true, |c| lead.sheet_category() == c)
            && lead.matches_search(&self.needle)
    }
}

impl LeadQuery {
    pub fn apply(&self, leads: &[Lead]) -> AppResult<LeadPage> {
        let filter = Filter::compile(self)?;
        let page = self.page.unwrap_or(DEFAULT_PAGE).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);

        let matched: Vec<&Lead> = leads.iter().filter(|lead| filter.matches(lead)).collect();
        let total = matched.len();

        Ok(LeadPage {
            leads: matched
                .into_iter()
                .skip((page - 1) * per_page)
                .take(per_page)
                .cloned()
                .collect(),
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        })
    }
}

/// Sorted distinct non-empty city and category values.
pub fn facets(leads: &[Lead]) -> Facets {
    let distinct = |pick: fn(&Lead) -> &str| -> Vec<String> {
        leads
            .iter()
            .map(pick)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };

    Facets {
        cities: distinct(Lead::city),
        categories: distinct(Lead::sheet_category),
    }
}
