use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dates;
use crate::domain::MetadataRow;
use crate::error::SeekerError;
use crate::ncbi::NcbiClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn accession(&self) -> Option<&str> {
        self.0.get("accession").and_then(Value::as_str)
    }

    pub fn biosample(&self) -> Option<&str> {
        self.0
            .pointer("/assembly_info/biosample/accession")
            .and_then(Value::as_str)
    }

    pub fn source_database(&self) -> Option<&str> {
        self.0.get("source_database").and_then(Value::as_str)
    }

    pub fn organism_name(&self) -> Option<&str> {
        self.0
            .pointer("/organism/organism_name")
            .and_then(Value::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.0
            .pointer("/assembly_info/biosample/attributes")?
            .as_array()?
            .iter()
            .find(|item| item.get("name").and_then(Value::as_str) == Some(name))?
            .get("value")
            .and_then(Value::as_str)
    }

    pub fn to_metadata_row(&self) -> MetadataRow {
        MetadataRow {
            accession: self.accession().map(str::to_string),
            biosample: self.biosample().map(str::to_string),
            source_database: self.source_database().map(str::to_string),
            organism: self.organism_name().map(str::to_string),
            location: self.attribute("geo_loc_name").map(str::to_string),
            collection_date: self.attribute("collection_date").map(str::to_string),
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

pub fn get_attribute<'a>(record: &'a RawRecord, name: &str) -> Option<&'a str> {
    record.attribute(name)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    records: Vec<RawRecord>,
}

#[derive(Debug, Default)]
pub struct ReportBuilder {
    organism: Option<String>,
    records: Option<Vec<RawRecord>>,
}

impl ReportBuilder {
    pub fn organism(mut self, organism: impl Into<String>) -> Self {
        self.organism = Some(organism.into());
        self
    }

    pub fn records(mut self, records: Vec<RawRecord>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn build<N: NcbiClient + ?Sized>(self, client: &N) -> Result<Report, SeekerError> {
        match (self.organism, self.records) {
            (Some(organism), None) => Ok(Report::from_records(client.dataset_reports(&organism)?)),
            (None, Some(records)) => Ok(Report::from_records(records)),
            _ => Err(SeekerError::InvalidReportArguments),
        }
    }
}

impl Report {
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    pub fn from_records(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filter_by_location(&self, location: &str) -> Report {
        self.retain(|record| {
            record
                .attribute("geo_loc_name")
                .is_some_and(|name| name.starts_with(location))
        })
    }

    pub fn filter_by_year(&self, start: Option<i32>, end: Option<i32>) -> Report {
        self.retain(|record| {
            record
                .attribute("collection_date")
                .and_then(dates::collection_year)
                .is_some_and(|year| dates::year_in_range(year, start, end))
        })
    }

    pub fn metadata_rows(&self) -> Vec<MetadataRow> {
        self.records.iter().map(RawRecord::to_metadata_row).collect()
    }

    fn retain<F>(&self, keep: F) -> Report
    where
        F: Fn(&RawRecord) -> bool,
    {
        Report::from_records(
            self.records
                .iter()
                .filter(|record| keep(record))
                .cloned()
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a RawRecord;
    type IntoIter = std::slice::Iter<'a, RawRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
