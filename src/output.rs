use std::io::{self, Write};

use csv::WriterBuilder;
use serde::Serialize;

use crate::domain::CachedRow;
use crate::preview::PreviewCounts;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_preview(counts: &PreviewCounts) -> io::Result<()> {
        Self::print_json(counts)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TsvOutput;

impl TsvOutput {
    pub fn print_rows(columns: &[String], rows: &[CachedRow]) -> io::Result<()> {
        let stdout = io::stdout();
        Self::write_rows(stdout.lock(), columns, rows)
    }

    pub fn write_rows<W: Write>(writer: W, columns: &[String], rows: &[CachedRow]) -> io::Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
        wtr.write_record(columns).map_err(io::Error::other)?;
        for row in rows {
            let record = columns
                .iter()
                .map(|column| cell(row, column))
                .collect::<Vec<_>>();
            wtr.write_record(&record).map_err(io::Error::other)?;
        }
        wtr.flush()
    }
}

fn cell(row: &CachedRow, column: &str) -> String {
    let value = match column {
        "accession" => Some(row.accession.clone()),
        "biosample" => row.biosample.clone(),
        "source_database" => row.source_database.clone(),
        "location" => row.location.clone(),
        "collection_date" => row.collection_date.clone(),
        "scheme" => Some(row.scheme.clone()),
        "sequence_type" => row.sequence_type.clone(),
        "last_updated" => row.last_updated.map(|ts| ts.to_rfc3339()),
        gene => row.alleles.get(gene).cloned(),
    };
    value.unwrap_or_default()
}
