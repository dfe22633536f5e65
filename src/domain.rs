use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SeekerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomeAccession(String);

impl GenomeAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenomeAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenomeAccession {
    type Err = SeekerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = normalized.starts_with("GCF_") || normalized.starts_with("GCA_");
        let parts = normalized.split('.').collect::<Vec<_>>();
        let has_numeric = parts
            .first()
            .map(|prefix| prefix.trim_start_matches("GCF_").trim_start_matches("GCA_"))
            .map(|rest| rest.chars().all(|ch| ch.is_ascii_digit()) && !rest.is_empty())
            .unwrap_or(false);
        let has_version = parts.len() == 2
            && !parts[1].is_empty()
            && parts[1].chars().all(|ch| ch.is_ascii_digit());
        if !is_valid || !has_numeric || !has_version {
            return Err(SeekerError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheme {
    pub name: String,
    pub genes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub accession: Option<String>,
    pub biosample: Option<String>,
    pub source_database: Option<String>,
    pub organism: Option<String>,
    pub location: Option<String>,
    pub collection_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRow {
    pub accession: String,
    pub biosample: Option<String>,
    pub source_database: Option<String>,
    pub location: Option<String>,
    pub collection_date: Option<String>,
    pub scheme: String,
    pub sequence_type: Option<String>,
    #[serde(default)]
    pub alleles: IndexMap<String, String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingRow {
    pub file: String,
    pub scheme: String,
    pub sequence_type: String,
    pub alleles: Vec<String>,
    pub accession: GenomeAccession,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingTable {
    pub genes: Vec<String>,
    pub rows: Vec<TypingRow>,
}

impl TypingTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
