use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{CachedRow, GenomeAccession, MetadataRow, Scheme};
use crate::error::SeekerError;
use crate::filters;
use crate::ncbi::NcbiClient;
use crate::store::{Column, TableSchema, TableStore};
use crate::typing::{self, TypingTool};

pub const DEFAULT_BATCH_SIZE: usize = 25;

pub const LEADING_COLUMNS: [&str; 7] = [
    "accession",
    "biosample",
    "source_database",
    "location",
    "collection_date",
    "scheme",
    "sequence_type",
];
pub const LAST_UPDATED_COLUMN: &str = "last_updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableCreation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub requested: usize,
    pub typed: usize,
    pub inserted: usize,
    pub batches: usize,
}

pub fn table_schema(scheme: &Scheme) -> TableSchema {
    let mut columns = LEADING_COLUMNS
        .iter()
        .map(|name| Column::string(*name))
        .collect::<Vec<_>>();
    columns.extend(scheme.genes.iter().map(Column::string));
    columns.push(Column::timestamp(LAST_UPDATED_COLUMN));
    TableSchema { columns }
}

/// Keeps a scheme's cached typing table in step with NCBI metadata.
///
/// Biosample is the durable cache key: an assembly whose biosample already
/// has a cached row is never downloaded or typed again.
pub struct CacheReconciler<N: NcbiClient, T: TypingTool, S: TableStore> {
    store: S,
    ncbi: N,
    typing: T,
    genome_dir: PathBuf,
    batch_size: usize,
}

impl<N: NcbiClient, T: TypingTool, S: TableStore> CacheReconciler<N, T, S> {
    pub fn new(store: S, ncbi: N, typing: T, genome_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            ncbi,
            typing,
            genome_dir: genome_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ncbi(&self) -> &N {
        &self.ncbi
    }

    pub fn typing(&self) -> &T {
        &self.typing
    }

    pub fn genome_dir(&self) -> &Path {
        &self.genome_dir
    }

    /// Type and store every metadata row not covered by `cached`.
    ///
    /// `cached` is `None` when the scheme table does not exist. Each batch is
    /// inserted on its own, so a failing batch leaves earlier ones committed.
    pub fn add_to_cache(
        &self,
        cached: Option<&[CachedRow]>,
        metadata: &[MetadataRow],
        scheme: &str,
    ) -> Result<CacheSummary, SeekerError> {
        let _lock = self.store.write_lock(scheme)?;

        self.create_table(scheme)?;
        let uncached = match cached {
            None => metadata.iter().collect::<Vec<_>>(),
            Some(cached) => filters::untyped(metadata, cached),
        };
        let accessions = unique_accessions(&uncached);

        let mut summary = CacheSummary {
            requested: accessions.len(),
            ..CacheSummary::default()
        };
        if accessions.is_empty() {
            info!("All {} genomes are already cached for {scheme}", metadata.len());
            return Ok(summary);
        }

        let tool = self.typing.tool_info();
        debug!("typing with {}", tool.mlst.as_deref().unwrap_or("mlst (version unknown)"));
        let mut processed = 0usize;
        for batch in accessions.chunks(self.batch_size) {
            processed += batch.len();
            info!("Caching {processed}/{}...", accessions.len());
            self.ncbi.download_genomes(batch, &self.genome_dir)?;
            let table = typing::perform_typing(&self.typing, scheme, &self.genome_dir)?;
            let merged = typing::merge_with_metadata(&table, metadata);
            summary.typed += table.len();
            summary.batches += 1;
            if merged.is_empty() {
                warn!("batch produced no typed rows for {scheme}");
                continue;
            }
            summary.inserted += self.store.insert_rows(scheme, &merged)?;
        }
        info!(
            "Cached {} new typing results for {scheme}",
            summary.inserted
        );
        Ok(summary)
    }

    pub fn create_table(&self, scheme: &str) -> Result<TableCreation, SeekerError> {
        if self.store.table_exists(scheme)? {
            info!("{scheme} table already exists");
            return Ok(TableCreation::AlreadyExists);
        }
        let scheme_def = self.typing.scheme(scheme)?;
        self.store.create_table(scheme, &table_schema(&scheme_def))?;
        info!("Created table {scheme}");
        Ok(TableCreation::Created)
    }

    pub fn update_table(&self, scheme: &str, new_rows: &[CachedRow]) -> Result<usize, SeekerError> {
        let _lock = self.store.write_lock(scheme)?;
        self.update_table_locked(scheme, new_rows)
    }

    fn update_table_locked(&self, scheme: &str, new_rows: &[CachedRow]) -> Result<usize, SeekerError> {
        let rows = self
            .store
            .read_table(scheme)?
            .ok_or_else(|| SeekerError::TableNotFound(scheme.to_string()))?;
        let mut index = rows
            .into_iter()
            .map(|row| (row.accession.clone(), row))
            .collect::<IndexMap<_, _>>();

        let mut updated = 0usize;
        for patch in new_rows {
            if let Some(existing) = index.get_mut(&patch.accession) {
                apply_patch(existing, patch);
                updated += 1;
            }
        }
        let rows = index.into_values().collect::<Vec<_>>();
        self.store.replace_table(scheme, &rows)?;
        info!("Updated {updated} rows in {scheme}");
        Ok(updated)
    }

    /// Cached rows for `scheme`; `None` if the table was never created.
    pub fn get_table(&self, scheme: &str) -> Result<Option<Vec<CachedRow>>, SeekerError> {
        info!("Downloading cached MLST results...");
        let rows = self.store.read_table(scheme)?;
        match &rows {
            Some(rows) => info!("Downloaded {} cached MLST results", rows.len()),
            None => info!("No cache table for {scheme} yet"),
        }
        Ok(rows)
    }

    pub fn refresh_metadata(
        &self,
        scheme: &str,
        metadata: &[MetadataRow],
    ) -> Result<usize, SeekerError> {
        let _lock = self.store.write_lock(scheme)?;
        let Some(cached) = self.store.read_table(scheme)? else {
            return Ok(0);
        };
        let cached_accessions = cached
            .iter()
            .map(|row| row.accession.as_str())
            .collect::<HashSet<_>>();
        let patches = metadata
            .iter()
            .filter_map(|meta| {
                let accession = meta.accession.as_deref()?;
                cached_accessions.contains(accession).then(|| CachedRow {
                    accession: accession.to_string(),
                    biosample: meta.biosample.clone(),
                    source_database: meta.source_database.clone(),
                    location: meta.location.clone(),
                    collection_date: meta.collection_date.clone(),
                    scheme: scheme.to_string(),
                    ..CachedRow::default()
                })
            })
            .collect::<Vec<_>>();
        if patches.is_empty() {
            return Ok(0);
        }
        self.update_table_locked(scheme, &patches)
    }
}

fn apply_patch(existing: &mut CachedRow, patch: &CachedRow) {
    fn overwrite(target: &mut Option<String>, value: &Option<String>) {
        if value.is_some() {
            target.clone_from(value);
        }
    }

    overwrite(&mut existing.biosample, &patch.biosample);
    overwrite(&mut existing.source_database, &patch.source_database);
    overwrite(&mut existing.location, &patch.location);
    overwrite(&mut existing.collection_date, &patch.collection_date);
    overwrite(&mut existing.sequence_type, &patch.sequence_type);
    if !patch.scheme.is_empty() {
        existing.scheme.clone_from(&patch.scheme);
    }
    for (gene, allele) in &patch.alleles {
        existing.alleles.insert(gene.clone(), allele.clone());
    }
    if patch.last_updated.is_some() {
        existing.last_updated = patch.last_updated;
    }
}

fn unique_accessions(rows: &[&MetadataRow]) -> Vec<GenomeAccession> {
    let mut seen = HashSet::new();
    let mut accessions = Vec::new();
    for row in rows {
        let Some(raw) = row.accession.as_deref() else {
            warn!("metadata row without accession; skipping");
            continue;
        };
        match raw.parse::<GenomeAccession>() {
            Ok(accession) => {
                if seen.insert(accession.clone()) {
                    accessions.push(accession);
                }
            }
            Err(err) => warn!("{err}; skipping"),
        }
    }
    accessions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_wraps_gene_columns() {
        let scheme = Scheme {
            name: "saureus".to_string(),
            genes: vec!["arcC".to_string(), "aroE".to_string()],
        };
        let schema = table_schema(&scheme);
        assert_eq!(
            schema.column_names(),
            vec![
                "accession",
                "biosample",
                "source_database",
                "location",
                "collection_date",
                "scheme",
                "sequence_type",
                "arcC",
                "aroE",
                "last_updated"
            ]
        );
        assert_eq!(
            schema.columns.last().map(|column| column.kind),
            Some(crate::store::ColumnKind::Timestamp)
        );
    }

    #[test]
    fn patch_keeps_absent_fields() {
        let mut existing = CachedRow {
            accession: "GCA_1.1".to_string(),
            location: Some("USA".to_string()),
            collection_date: Some("2020".to_string()),
            scheme: "s".to_string(),
            sequence_type: Some("3".to_string()),
            ..CachedRow::default()
        };
        let patch = CachedRow {
            accession: "GCA_1.1".to_string(),
            location: Some("USA: Ohio".to_string()),
            ..CachedRow::default()
        };
        apply_patch(&mut existing, &patch);
        assert_eq!(existing.location.as_deref(), Some("USA: Ohio"));
        assert_eq!(existing.collection_date.as_deref(), Some("2020"));
        assert_eq!(existing.sequence_type.as_deref(), Some("3"));
        assert_eq!(existing.scheme, "s");
    }

    #[test]
    fn accessions_deduplicated_and_validated() {
        let rows = [
            MetadataRow {
                accession: Some("GCA_1.1".to_string()),
                ..MetadataRow::default()
            },
            MetadataRow {
                accession: Some("GCA_1.1".to_string()),
                ..MetadataRow::default()
            },
            MetadataRow {
                accession: Some("bogus".to_string()),
                ..MetadataRow::default()
            },
            MetadataRow::default(),
        ];
        let refs = rows.iter().collect::<Vec<_>>();
        assert_eq!(unique_accessions(&refs).len(), 1);
    }
}
