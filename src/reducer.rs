//! Reduction of the raw statistics table to one work item per country
//!
//! The reducer is a chain of pure steps:
//!
//! 1. Filtering keeps rows under the rate threshold for the configured gender category.
//!    Rows failing either predicate are dropped silently; this is data reduction, not
//!    validation. [`Reducer`] and [`filter_records`] share [`passes_filter`], applied
//!    to raw JSON rows and typed records respectively.
//! 2. [`sort_by_year_desc`] orders the survivors by year, newest first. Records without
//!    a usable year sort as year 0.
//! 3. [`latest_by_country`] groups by country code and keeps the newest record of each
//!    group. Groups are re-sorted on their own, so the step is correct even without
//!    step 2.
//! 4. [`create_work_items`] wraps each selected record in the work item envelope. Year
//!    and rate are carried as published; the year is only parsed for ordering.
//!
//! Both sorts are stable. When one country has several records for the same year, the
//! record that appeared first in the raw input wins.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::config::{FieldMapping, FilterConfig, MalformedPolicy};
use crate::error::{MalformedRecord, Result};
use crate::types::{RawRecord, TrafficData, WorkItem};

/// Output of [`Reducer::reduce`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reduction {
    /// One work item per surviving country, in first-seen order after sorting
    pub work_items: Vec<WorkItem>,
    /// Rows that passed the filter but could not be used
    pub malformed: Vec<MalformedRecord>,
}

impl Reduction {
    /// True when there is nothing to deliver
    pub fn is_empty(&self) -> bool {
        self.work_items.is_empty()
    }
}

/// Applies the business rules of [`FilterConfig`] to raw rows named by a [`FieldMapping`]
#[derive(Clone, Debug, Default)]
pub struct Reducer {
    fields: FieldMapping,
    filter: FilterConfig,
}

impl Reducer {
    /// Create a reducer for the given source schema and business rules
    pub fn new(fields: FieldMapping, filter: FilterConfig) -> Self {
        Self { fields, filter }
    }

    /// Reduce raw rows to one work item per country
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`](crate::Error::MalformedRecord) for the first
    /// unusable row when the policy is [`MalformedPolicy::Abort`]. With the default
    /// [`MalformedPolicy::Skip`] the call does not fail.
    pub fn reduce(&self, rows: &[Value]) -> Result<Reduction> {
        let mut malformed = Vec::new();
        let mut kept = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let Some(fields) = row.as_object() else {
                let record = MalformedRecord {
                    index,
                    field: "<row>".to_string(),
                    reason: "row is not a JSON object".to_string(),
                };
                self.handle_malformed(record, &mut malformed)?;
                continue;
            };

            let rate = fields.get(&self.fields.rate).and_then(Value::as_f64);
            let gender = fields.get(&self.fields.gender).and_then(Value::as_str);
            if !passes_filter(rate, gender, self.filter.max_rate, &self.filter.gender) {
                continue;
            }

            match self.to_record(index, fields) {
                Ok(record) => kept.push(record),
                Err(record) => self.handle_malformed(record, &mut malformed)?,
            }
        }

        let sorted = sort_by_year_desc(kept);
        let latest = latest_by_country(&sorted);
        let work_items = create_work_items(&latest);

        tracing::debug!(
            rows = rows.len(),
            filtered = sorted.len(),
            countries = work_items.len(),
            malformed = malformed.len(),
            "reduced raw records"
        );

        Ok(Reduction {
            work_items,
            malformed,
        })
    }

    fn to_record(
        &self,
        index: usize,
        fields: &Map<String, Value>,
    ) -> std::result::Result<RawRecord, MalformedRecord> {
        let country_code = match fields.get(&self.fields.country) {
            Some(Value::String(code)) => code.clone(),
            Some(other) => {
                return Err(MalformedRecord {
                    index,
                    field: self.fields.country.clone(),
                    reason: format!("expected a string, found {other}"),
                });
            }
            None => {
                return Err(MalformedRecord {
                    index,
                    field: self.fields.country.clone(),
                    reason: "field is absent".to_string(),
                });
            }
        };

        let field = |name: &str| fields.get(name).cloned().unwrap_or(Value::Null);
        // The filter already guaranteed the gender is a string.
        let gender_code = fields
            .get(&self.fields.gender)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(RawRecord {
            country_code,
            year: field(&self.fields.year),
            rate: field(&self.fields.rate),
            gender_code,
        })
    }

    fn handle_malformed(
        &self,
        record: MalformedRecord,
        malformed: &mut Vec<MalformedRecord>,
    ) -> Result<()> {
        match self.filter.malformed {
            MalformedPolicy::Abort => Err(record.into()),
            MalformedPolicy::Skip => {
                tracing::warn!(
                    index = record.index,
                    field = %record.field,
                    reason = %record.reason,
                    "skipping malformed record"
                );
                malformed.push(record);
                Ok(())
            }
        }
    }
}

/// The filter rule: a numeric rate strictly below `max_rate` and the wanted gender
///
/// A missing or non-numeric rate, or a missing gender, fails the rule.
pub fn passes_filter(
    rate: Option<f64>,
    gender: Option<&str>,
    max_rate: f64,
    wanted: &str,
) -> bool {
    rate.is_some_and(|rate| rate < max_rate) && gender == Some(wanted)
}

/// Keep records that pass [`passes_filter`]
pub fn filter_records(records: &[RawRecord], max_rate: f64, gender: &str) -> Vec<RawRecord> {
    records
        .iter()
        .filter(|r| passes_filter(r.rate.as_f64(), Some(&r.gender_code), max_rate, gender))
        .cloned()
        .collect()
}

/// Stable sort, newest year first; an unusable year counts as 0
pub fn sort_by_year_desc(mut records: Vec<RawRecord>) -> Vec<RawRecord> {
    records.sort_by_key(|r| std::cmp::Reverse(r.year_ordinal()));
    records
}

/// Keep the newest record of each country
///
/// Countries appear in the order they are first seen in `records`. Each group is
/// re-sorted by year (stable, descending) and its first element wins, so equal years
/// resolve to the earliest record in `records`.
pub fn latest_by_country(records: &[RawRecord]) -> Vec<RawRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&RawRecord>> = HashMap::new();

    for record in records {
        let key = record.country_code.as_str();
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(record);
    }

    order
        .into_iter()
        .filter_map(|country| {
            let mut group = groups.remove(country)?;
            group.sort_by_key(|r| std::cmp::Reverse(r.year_ordinal()));
            group.first().map(|r| (*r).clone())
        })
        .collect()
}

/// Wrap records in the work item envelope
pub fn create_work_items(records: &[RawRecord]) -> Vec<WorkItem> {
    records
        .iter()
        .map(|r| WorkItem::new(&TrafficData::from(r)))
        .collect()
}
