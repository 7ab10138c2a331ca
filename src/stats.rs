//! Funnel statistics
//!
//! Pure functions over a slice of leads, recomputed on every read. The
//! `contacted` and `responded` buckets overlap on purpose: a WON lead counts
//! in both.

use serde::{Deserialize, Serialize};

use crate::models::{Lead, LeadStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetStats {
    pub total: usize,
    pub contacted: usize,
    pub not_responded: usize,
    pub responded: usize,
    pub won: usize,
    pub lost: usize,
    pub contact_rate: f64,
    pub response_rate: f64,
    pub conversion_rate: f64,
}

impl SheetStats {
    pub fn from_leads(leads: &[Lead]) -> Self {
        let count = |pred: fn(LeadStatus) -> bool| {
            leads.iter().filter(|l| pred(l.meta.status)).count()
        };

        Self::from_counts(
            leads.len(),
            count(|s| s.is_contacted()),
            count(|s| s == LeadStatus::NotResponded),
            count(|s| s.has_responded()),
            count(|s| s == LeadStatus::Won),
            count(|s| s == LeadStatus::Lost),
        )
    }

    pub fn from_counts(
        total: usize,
        contacted: usize,
        not_responded: usize,
        responded: usize,
        won: usize,
        lost: usize,
    ) -> Self {
        Self {
            total,
            contacted,
            not_responded,
            responded,
            won,
            lost,
            contact_rate: percentage(contacted, total),
            response_rate: percentage(responded, contacted),
            conversion_rate: percentage(won, total),
        }
    }

    pub fn lost_rate(&self) -> f64 {
        percentage(self.lost, self.total)
    }

    /// Disjoint chart segments derived from the overlapping buckets.
    /// A segment that would come out negative is left out.
    pub fn funnel(&self) -> Vec<FunnelSegment> {
        let total = self.total as i64;
        let contacted = self.contacted as i64;
        let not_responded = self.not_responded as i64;
        let responded = self.responded as i64;
        let won = self.won as i64;
        let lost = self.lost as i64;

        [
            ("Unvisited", total - contacted),
            ("Contacted", contacted - not_responded - responded),
            ("No Response", not_responded),
            ("Responded", responded - won - lost),
            ("Won", won),
            ("Lost", lost),
        ]
        .into_iter()
        .filter(|(_, value)| *value >= 0)
        .map(|(name, value)| FunnelSegment {
            name: name.to_string(),
            value: value as usize,
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelSegment {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub sheet_id: Option<String>,
    pub stats: SheetStats,
    pub lost_rate: f64,
    pub funnel: Vec<FunnelSegment>,
}

impl StatsResponse {
    pub fn new(sheet_id: Option<String>, leads: &[Lead]) -> Self {
        let stats = SheetStats::from_leads(leads);
        Self {
            sheet_id,
            lost_rate: stats.lost_rate(),
            funnel: stats.funnel(),
            stats,
        }
    }
}

fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}
