#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::Utf8PathBuf;
use serde_json::{Value, json};

use mlst_seeker::domain::GenomeAccession;
use mlst_seeker::error::SeekerError;
use mlst_seeker::fs_util;
use mlst_seeker::ncbi::NcbiClient;
use mlst_seeker::report::RawRecord;
use mlst_seeker::store::LocalTableStore;
use mlst_seeker::typing::{ToolInfo, TypingTool, extract_accession};

pub const CATALOG: &str = "abaumannii\tgltA\tgyrB\nmabscessus\tgene1\tgene2\nsaureus\tarcC\taroE\tglpF\n";

pub fn record(
    accession: &str,
    biosample: &str,
    location: Option<&str>,
    collection_date: Option<&str>,
) -> RawRecord {
    let mut attributes = Vec::new();
    if let Some(location) = location {
        attributes.push(json!({"name": "geo_loc_name", "value": location}));
    }
    if let Some(date) = collection_date {
        attributes.push(json!({"name": "collection_date", "value": date}));
    }
    RawRecord::new(json!({
        "accession": accession,
        "source_database": "SOURCE_DATABASE_GENBANK",
        "organism": {"organism_name": "Mycobacteroides abscessus"},
        "assembly_info": {"biosample": {"accession": biosample, "attributes": attributes}}
    }))
}

pub fn dated_records(dates: &[&str]) -> Vec<RawRecord> {
    dates
        .iter()
        .map(|date| {
            RawRecord::new(json!({"assembly_info": {"biosample": {"attributes": [
                {"name": "collection_date", "value": date}
            ]}}}))
        })
        .collect()
}

pub fn first_attribute_value(record: &RawRecord) -> Option<&str> {
    record
        .as_json()
        .pointer("/assembly_info/biosample/attributes/0/value")
        .and_then(Value::as_str)
}

#[derive(Default)]
pub struct FakeNcbi {
    pub records: Vec<RawRecord>,
    pub fail_reports: bool,
    pub report_calls: Mutex<usize>,
    pub downloads: Mutex<Vec<Vec<String>>>,
}

impl FakeNcbi {
    pub fn with_records(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn downloaded(&self) -> Vec<Vec<String>> {
        self.downloads.lock().unwrap().clone()
    }
}

impl NcbiClient for FakeNcbi {
    fn dataset_reports(&self, _organism: &str) -> Result<Vec<RawRecord>, SeekerError> {
        *self.report_calls.lock().unwrap() += 1;
        if self.fail_reports {
            return Err(SeekerError::NcbiHttp("operation timed out".to_string()));
        }
        Ok(self.records.clone())
    }

    fn download_genomes(
        &self,
        accessions: &[GenomeAccession],
        target_dir: &Path,
    ) -> Result<(), SeekerError> {
        self.downloads
            .lock()
            .unwrap()
            .push(accessions.iter().map(|acc| acc.to_string()).collect());
        fs_util::clear_dir(target_dir)?;
        for accession in accessions {
            let dir = target_dir.join("ncbi_dataset/data").join(accession.as_str());
            fs::create_dir_all(&dir).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
            fs::write(dir.join(format!("{accession}_genomic.fna")), b">contig\nACGT\n")
                .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }
}

/// Stands in for the `mlst` binary. Sequence types come from `types`
/// (default "1"); `fail_on_call` makes that run (1-based) exit non-zero.
/// Accessions in `untypable` get no output line.
#[derive(Default)]
pub struct FakeMlst {
    pub types: HashMap<String, String>,
    pub untypable: Vec<String>,
    pub fail_on_call: Option<usize>,
    pub runs: Mutex<Vec<Vec<PathBuf>>>,
    pub catalog_calls: Mutex<usize>,
}

impl FakeMlst {
    pub fn with_types(types: &[(&str, &str)]) -> Self {
        Self {
            types: types
                .iter()
                .map(|(acc, st)| (acc.to_string(), st.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn typed_files(&self) -> usize {
        self.runs.lock().unwrap().iter().map(Vec::len).sum()
    }
}

impl TypingTool for FakeMlst {
    fn run(&self, scheme: &str, files: &[PathBuf]) -> Result<String, SeekerError> {
        let mut runs = self.runs.lock().unwrap();
        runs.push(files.to_vec());
        if self.fail_on_call == Some(runs.len()) {
            return Err(SeekerError::TypingFailed("mlst exited with status 1".to_string()));
        }

        let genes = self
            .scheme(scheme)
            .map(|scheme| scheme.genes)
            .unwrap_or_default();
        let mut out = format!("FILE\tSCHEME\tST\t{}\n", genes.join("\t"));
        for file in files {
            let path = file.to_string_lossy();
            let accession = extract_accession(&path);
            if accession
                .as_ref()
                .is_some_and(|acc| self.untypable.iter().any(|skip| skip == acc.as_str()))
            {
                continue;
            }
            let st = accession
                .and_then(|acc| self.types.get(acc.as_str()).cloned())
                .unwrap_or_else(|| "1".to_string());
            let alleles = (1..=genes.len()).map(|n| n.to_string()).collect::<Vec<_>>();
            out.push_str(&format!("{path}\t{scheme}\t{st}\t{}\n", alleles.join("\t")));
        }
        Ok(out)
    }

    fn scheme_catalog(&self) -> Result<String, SeekerError> {
        *self.catalog_calls.lock().unwrap() += 1;
        Ok(CATALOG.to_string())
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            mlst: Some("mlst 2.23.0".to_string()),
        }
    }
}

pub fn temp_store(temp: &tempfile::TempDir) -> LocalTableStore {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    LocalTableStore::new_with_root(root)
}
