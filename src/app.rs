use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::cache::{CacheReconciler, CacheSummary, LAST_UPDATED_COLUMN, LEADING_COLUMNS};
use crate::domain::{CachedRow, GenomeAccession, MetadataRow};
use crate::error::SeekerError;
use crate::filters::{FilterOptions, TypedKeys};
use crate::fs_util;
use crate::ncbi::NcbiClient;
use crate::preview::{PreviewCounts, PreviewInput};
use crate::report::Report;
use crate::store::TableStore;
use crate::typing::TypingTool;

#[derive(Debug, Clone)]
pub struct Query {
    pub organism: String,
    pub scheme: String,
    pub filters: FilterOptions,
}

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub cached_only: bool,
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheResult {
    pub summary: Option<CacheSummary>,
    pub refreshed: usize,
    pub columns: Vec<String>,
    pub rows: Vec<CachedRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub cache: CacheResult,
    pub output_dir: Option<PathBuf>,
    pub downloaded: usize,
}

struct Metadata {
    all: Vec<MetadataRow>,
    filtered: Vec<MetadataRow>,
}

pub struct App<N: NcbiClient, T: TypingTool, S: TableStore> {
    reconciler: CacheReconciler<N, T, S>,
}

impl<N: NcbiClient, T: TypingTool, S: TableStore> App<N, T, S> {
    pub fn new(reconciler: CacheReconciler<N, T, S>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &CacheReconciler<N, T, S> {
        &self.reconciler
    }

    pub fn preview(&self, query: &Query) -> Result<PreviewCounts, SeekerError> {
        let metadata = self.metadata(query)?;
        let cached = self.reconciler.get_table(&query.scheme)?.unwrap_or_default();
        let cached = scope_to(&cached, &metadata.all);

        let location_year = FilterOptions {
            sequence_type: None,
            ..query.filters.clone()
        };
        let filtered_cached = location_year.apply_cached(&cached);

        Ok(PreviewCounts::compute(PreviewInput {
            metadata: &metadata.all,
            filtered_metadata: &metadata.filtered,
            cached: &cached,
            filtered_cached: &filtered_cached,
            sequence_type: query.filters.sequence_type.as_deref(),
        }))
    }

    pub fn cache(&self, query: &Query, options: &CacheOptions) -> Result<CacheResult, SeekerError> {
        let metadata = self.metadata(query)?;
        let scheme = query.scheme.as_str();

        let summary = if options.cached_only {
            None
        } else {
            let cached = self.reconciler.get_table(scheme)?;
            Some(
                self.reconciler
                    .add_to_cache(cached.as_deref(), &metadata.filtered, scheme)?,
            )
        };
        let refreshed = if options.refresh {
            self.reconciler.refresh_metadata(scheme, &metadata.all)?
        } else {
            0
        };

        let cached = self.reconciler.get_table(scheme)?.unwrap_or_default();
        let rows = query
            .filters
            .apply_cached(&scope_to(&cached, &metadata.filtered));
        info!("{} cached genomes match", rows.len());

        Ok(CacheResult {
            summary,
            refreshed,
            columns: self.columns(scheme)?,
            rows,
        })
    }

    pub fn fetch(
        &self,
        query: &Query,
        options: &CacheOptions,
        output_dir: PathBuf,
    ) -> Result<FetchResult, SeekerError> {
        fs_util::ensure_replaceable_dir(&output_dir)?;
        let cache = self.cache(query, options)?;
        let accessions = cache
            .rows
            .iter()
            .filter_map(|row| row.accession.parse::<GenomeAccession>().ok())
            .collect::<Vec<_>>();
        if accessions.is_empty() {
            info!("No matching genomes to download");
            return Ok(FetchResult {
                cache,
                output_dir: None,
                downloaded: 0,
            });
        }

        self.reconciler
            .ncbi()
            .download_genomes(&accessions, &output_dir)?;
        info!(
            "Downloaded {} genomes to {}",
            accessions.len(),
            output_dir.display()
        );
        Ok(FetchResult {
            cache,
            output_dir: Some(output_dir),
            downloaded: accessions.len(),
        })
    }

    fn metadata(&self, query: &Query) -> Result<Metadata, SeekerError> {
        let report = Report::builder()
            .organism(query.organism.as_str())
            .build(self.reconciler.ncbi())?;
        let filtered = filter_report(&report, &query.filters);
        info!(
            "{} of {} genome records pass location/year filters",
            filtered.len(),
            report.len()
        );
        Ok(Metadata {
            all: report.metadata_rows(),
            filtered: filtered.metadata_rows(),
        })
    }

    fn columns(&self, scheme: &str) -> Result<Vec<String>, SeekerError> {
        let columns = match self.reconciler.store().schema(scheme)? {
            Some(schema) => schema
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => LEADING_COLUMNS
                .iter()
                .chain(std::iter::once(&LAST_UPDATED_COLUMN))
                .map(|name| name.to_string())
                .collect(),
        };
        Ok(columns)
    }
}

pub fn filter_report(report: &Report, options: &FilterOptions) -> Report {
    let mut filtered = match options.location.as_deref() {
        Some(location) => report.filter_by_location(location),
        None => report.clone(),
    };
    if options.has_year_bounds() {
        filtered = filtered.filter_by_year(options.year_start, options.year_end);
    }
    filtered
}

fn scope_to(cached: &[CachedRow], metadata: &[MetadataRow]) -> Vec<CachedRow> {
    let wanted = TypedKeys::new(metadata);
    cached
        .iter()
        .filter(|row| wanted.covers(*row))
        .cloned()
        .collect()
}
