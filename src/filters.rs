use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dates;
use crate::domain::{CachedRow, MetadataRow};
use crate::error::SeekerError;

pub trait CanonicalRow: Clone {
    fn accession(&self) -> Option<&str>;
    fn biosample(&self) -> Option<&str>;
    fn location(&self) -> Option<&str>;
    fn collection_date(&self) -> Option<&str>;
    fn sequence_type(&self) -> Option<&str> {
        None
    }
}

impl CanonicalRow for MetadataRow {
    fn accession(&self) -> Option<&str> {
        self.accession.as_deref()
    }

    fn biosample(&self) -> Option<&str> {
        self.biosample.as_deref()
    }

    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    fn collection_date(&self) -> Option<&str> {
        self.collection_date.as_deref()
    }
}

impl CanonicalRow for CachedRow {
    fn accession(&self) -> Option<&str> {
        Some(&self.accession)
    }

    fn biosample(&self) -> Option<&str> {
        self.biosample.as_deref()
    }

    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    fn collection_date(&self) -> Option<&str> {
        self.collection_date.as_deref()
    }

    fn sequence_type(&self) -> Option<&str> {
        self.sequence_type.as_deref()
    }
}

pub fn filter_by_location<R: CanonicalRow>(rows: &[R], location: Option<&str>) -> Vec<R> {
    match location.filter(|value| !value.is_empty()) {
        Some(prefix) => rows
            .iter()
            .filter(|row| row.location().is_some_and(|value| value.starts_with(prefix)))
            .cloned()
            .collect(),
        None => rows.to_vec(),
    }
}

pub fn filter_by_year<R: CanonicalRow>(rows: &[R], start: Option<i32>, end: Option<i32>) -> Vec<R> {
    rows.iter()
        .filter(|row| {
            row.collection_date()
                .and_then(dates::collection_year)
                .is_some_and(|year| dates::year_in_range(year, start, end))
        })
        .cloned()
        .collect()
}

pub fn filter_by_sequence_type<R: CanonicalRow>(rows: &[R], sequence_type: Option<&str>) -> Vec<R> {
    match sequence_type.filter(|value| !value.is_empty()) {
        Some(target) => rows
            .iter()
            .filter(|row| row.sequence_type() == Some(target))
            .cloned()
            .collect(),
        None => rows.to_vec(),
    }
}

/// Rows with no counterpart in `typed`. Biosample is the key; a row without
/// one falls back to its accession.
pub fn untyped<'a, M, C>(metadata: &'a [M], typed: &[C]) -> Vec<&'a M>
where
    M: CanonicalRow,
    C: CanonicalRow,
{
    let keys = TypedKeys::new(typed);
    metadata.iter().filter(|row| !keys.covers(*row)).collect()
}

pub struct TypedKeys<'a> {
    biosamples: HashSet<&'a str>,
    accessions: HashSet<&'a str>,
}

impl<'a> TypedKeys<'a> {
    pub fn new<R: CanonicalRow>(rows: &'a [R]) -> Self {
        Self {
            biosamples: biosamples(rows),
            accessions: rows.iter().filter_map(CanonicalRow::accession).collect(),
        }
    }

    pub fn covers<R: CanonicalRow>(&self, row: &R) -> bool {
        match row.biosample() {
            Some(biosample) => self.biosamples.contains(biosample),
            None => row
                .accession()
                .is_some_and(|accession| self.accessions.contains(accession)),
        }
    }
}

pub fn biosamples<R: CanonicalRow>(rows: &[R]) -> HashSet<&str> {
    rows.iter().filter_map(CanonicalRow::biosample).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub year_start: Option<i32>,
    pub year_end: Option<i32>,
    pub location: Option<String>,
    pub sequence_type: Option<String>,
}

impl FilterOptions {
    pub fn from_flags(
        collect_start: Option<&str>,
        collect_end: Option<&str>,
        location: Option<&str>,
        sequence_type: Option<&str>,
    ) -> Result<Self, SeekerError> {
        Ok(Self {
            year_start: parse_year("--collect-start", collect_start)?,
            year_end: parse_year("--collect-end", collect_end)?,
            location: non_empty(location),
            sequence_type: non_empty(sequence_type),
        })
    }

    pub fn has_year_bounds(&self) -> bool {
        self.year_start.is_some() || self.year_end.is_some()
    }

    pub fn apply_metadata(&self, rows: &[MetadataRow]) -> Vec<MetadataRow> {
        self.apply_common(rows)
    }

    pub fn apply_cached(&self, rows: &[CachedRow]) -> Vec<CachedRow> {
        let rows = self.apply_common(rows);
        filter_by_sequence_type(&rows, self.sequence_type.as_deref())
    }

    fn apply_common<R: CanonicalRow>(&self, rows: &[R]) -> Vec<R> {
        let rows = filter_by_location(rows, self.location.as_deref());
        if self.has_year_bounds() {
            filter_by_year(&rows, self.year_start, self.year_end)
        } else {
            rows
        }
    }
}

fn parse_year(flag: &str, value: Option<&str>) -> Result<Option<i32>, SeekerError> {
    match value.map(str::trim) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i32>()
            .map(Some)
            .map_err(|_| SeekerError::InvalidYear {
                flag: flag.to_string(),
                value: raw.to_string(),
            }),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
