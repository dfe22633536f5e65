use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use csv::ReaderBuilder;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{CachedRow, GenomeAccession, MetadataRow, Scheme, TypingRow, TypingTable};
use crate::error::SeekerError;
use crate::fs_util;

pub const SEQUENCE_TYPE_COLUMN: usize = 2;

static GENBANK_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bGCA_\d+\.\d+\b").expect("valid accession regex"));

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub mlst: Option<String>,
}

pub trait TypingTool: Send + Sync {
    fn run(&self, scheme: &str, files: &[PathBuf]) -> Result<String, SeekerError>;
    fn scheme_catalog(&self) -> Result<String, SeekerError>;
    fn tool_info(&self) -> ToolInfo;

    fn scheme(&self, name: &str) -> Result<Scheme, SeekerError> {
        parse_scheme_catalog(&self.scheme_catalog()?, name)
    }
}

#[derive(Clone)]
pub struct SystemMlst {
    mlst: Option<PathBuf>,
}

impl SystemMlst {
    pub fn new() -> Self {
        Self {
            mlst: find_in_path("mlst"),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            mlst: Some(path.into()),
        }
    }

    fn require_mlst(&self) -> Result<&PathBuf, SeekerError> {
        self.mlst
            .as_ref()
            .ok_or_else(|| SeekerError::MissingTool("mlst".to_string()))
    }

    fn run_cmd(&self, args: &[String]) -> Result<String, SeekerError> {
        let program = self.require_mlst()?;
        debug!(program = %program.display(), ?args, "running mlst");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| SeekerError::TypingFailed(err.to_string()))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", program.display())
        } else {
            stderr
        };
        Err(SeekerError::TypingFailed(message))
    }
}

impl Default for SystemMlst {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingTool for SystemMlst {
    fn run(&self, scheme: &str, files: &[PathBuf]) -> Result<String, SeekerError> {
        let mut args = vec![
            "--scheme".to_string(),
            scheme.to_string(),
            "--legacy".to_string(),
            "--quiet".to_string(),
        ];
        args.extend(files.iter().map(|path| path.to_string_lossy().to_string()));
        self.run_cmd(&args)
    }

    fn scheme_catalog(&self) -> Result<String, SeekerError> {
        self.run_cmd(&["--longlist".to_string()])
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            mlst: self
                .mlst
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
        }
    }
}

pub fn parse_scheme_catalog(catalog: &str, scheme: &str) -> Result<Scheme, SeekerError> {
    catalog
        .lines()
        .map(|line| line.trim_end_matches('\r').split('\t'))
        .find_map(|mut fields| {
            (fields.next() == Some(scheme)).then(|| Scheme {
                name: scheme.to_string(),
                genes: fields
                    .filter(|gene| !gene.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
        })
        .ok_or_else(|| SeekerError::SchemeNotFound(scheme.to_string()))
}

pub fn perform_typing<T: TypingTool + ?Sized>(
    tool: &T,
    scheme: &str,
    genome_dir: &Path,
) -> Result<TypingTable, SeekerError> {
    let files = fs_util::find_sequence_files(genome_dir);
    if files.is_empty() {
        warn!("no genome files found under {}", genome_dir.display());
        return Ok(TypingTable::default());
    }
    info!("Typing {} genomes with scheme {scheme}...", files.len());
    let output = tool.run(scheme, &files)?;
    parse_typing_output(&output)
}

pub fn parse_typing_output(output: &str) -> Result<TypingTable, SeekerError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(output.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| SeekerError::TypingOutput(err.to_string()))?
        .clone();
    if headers.len() <= SEQUENCE_TYPE_COLUMN {
        if output.trim().is_empty() {
            return Ok(TypingTable::default());
        }
        return Err(SeekerError::TypingOutput(format!(
            "expected FILE, SCHEME and ST columns, got {}",
            headers.len()
        )));
    }
    let genes = headers
        .iter()
        .skip(SEQUENCE_TYPE_COLUMN + 1)
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|err| SeekerError::TypingOutput(err.to_string()))?;
        if record.len() != headers.len() {
            warn!(
                "skipping mlst line {}: expected {} fields, found {}",
                line + 2,
                headers.len(),
                record.len()
            );
            continue;
        }
        let file = record.get(0).unwrap_or_default().to_string();
        let Some(accession) = extract_accession(&file) else {
            warn!("no GenBank accession in mlst output path {file}; dropping row");
            continue;
        };
        rows.push(TypingRow {
            scheme: record.get(1).unwrap_or_default().to_string(),
            sequence_type: record
                .get(SEQUENCE_TYPE_COLUMN)
                .unwrap_or_default()
                .to_string(),
            alleles: record
                .iter()
                .skip(SEQUENCE_TYPE_COLUMN + 1)
                .map(str::to_string)
                .collect(),
            file,
            accession,
        });
    }
    Ok(TypingTable { genes, rows })
}

pub fn extract_accession(path: &str) -> Option<GenomeAccession> {
    GENBANK_ACCESSION
        .find(path)
        .and_then(|found| found.as_str().parse().ok())
}

/// Rows whose sequence type equals `sequence_type` exactly. `None` or empty
/// keeps every row.
pub fn filter_by_sequence_type(table: &TypingTable, sequence_type: Option<&str>) -> TypingTable {
    let Some(target) = sequence_type.filter(|value| !value.is_empty()) else {
        return table.clone();
    };
    TypingTable {
        genes: table.genes.clone(),
        rows: table
            .rows
            .iter()
            .filter(|row| row.sequence_type == target)
            .cloned()
            .collect(),
    }
}

pub fn merge_with_metadata(table: &TypingTable, metadata: &[MetadataRow]) -> Vec<CachedRow> {
    let mut by_accession: HashMap<&str, &MetadataRow> = HashMap::new();
    for row in metadata {
        if let Some(accession) = row.accession.as_deref() {
            by_accession.entry(accession).or_insert(row);
        }
    }

    table
        .rows
        .iter()
        .filter_map(|typed| {
            let Some(meta) = by_accession.get(typed.accession.as_str()) else {
                debug!("typed genome {} has no metadata; dropping", typed.accession);
                return None;
            };
            let alleles = table
                .genes
                .iter()
                .cloned()
                .zip(typed.alleles.iter().cloned())
                .collect::<IndexMap<_, _>>();
            Some(CachedRow {
                accession: typed.accession.to_string(),
                biosample: meta.biosample.clone(),
                source_database: meta.source_database.clone(),
                location: meta.location.clone(),
                collection_date: meta.collection_date.clone(),
                scheme: typed.scheme.clone(),
                sequence_type: Some(typed.sequence_type.clone()),
                alleles,
                last_updated: None,
            })
        })
        .collect()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "FILE\tSCHEME\tST\targA\tcya\n\
genomes/ncbi_dataset/data/GCA_000001.1/GCA_000001.1_ASM1_genomic.fna\tmabscessus\t5\t1\t4\n\
genomes/ncbi_dataset/data/other/unnamed.fna\tmabscessus\t7\t2\t2\n\
genomes/ncbi_dataset/data/GCA_000002.3/x.fna\tmabscessus\t-\t~3\t?\n";

    #[test]
    fn parses_legacy_output() {
        let table = parse_typing_output(OUTPUT).unwrap();
        assert_eq!(table.genes, vec!["argA", "cya"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].accession.as_str(), "GCA_000001.1");
        assert_eq!(table.rows[0].sequence_type, "5");
        assert_eq!(table.rows[1].alleles, vec!["~3", "?"]);
    }

    #[test]
    fn skips_ragged_lines() {
        let output = "FILE\tSCHEME\tST\targA\nGCA_1.1.fna\ts\t3\nGCA_2.1.fna\ts\t4\t9\n";
        let table = parse_typing_output(output).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].accession.as_str(), "GCA_2.1");
    }

    #[test]
    fn empty_output_is_empty_table() {
        assert!(parse_typing_output("").unwrap().is_empty());
    }

    #[test]
    fn accession_requires_word_boundary_and_version() {
        assert_eq!(
            extract_accession("a/GCA_123.4/b.fna").map(|acc| acc.to_string()),
            Some("GCA_123.4".to_string())
        );
        assert!(extract_accession("a/GCA_123/b.fna").is_none());
        assert!(extract_accession("a/GCF_123.1/b.fna").is_none());
    }

    #[test]
    fn catalog_matches_whole_scheme_name() {
        let catalog = "abaumannii_2\tcpn60\tgdhB\nabaumannii\tgltA\tgyrB\n";
        let scheme = parse_scheme_catalog(catalog, "abaumannii").unwrap();
        assert_eq!(scheme.genes, vec!["gltA", "gyrB"]);
        assert!(parse_scheme_catalog(catalog, "ecoli").is_err());
    }
}
