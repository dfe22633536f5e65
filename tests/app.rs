mod common;

use assert_matches::assert_matches;

use mlst_seeker::app::{App, CacheOptions, Query};
use mlst_seeker::cache::CacheReconciler;
use mlst_seeker::domain::CachedRow;
use mlst_seeker::error::SeekerError;
use mlst_seeker::filters::FilterOptions;
use mlst_seeker::fs_util;
use mlst_seeker::store::{LocalTableStore, TableStore};

use common::{FakeMlst, FakeNcbi, record, temp_store};

type TestApp = App<FakeNcbi, FakeMlst, LocalTableStore>;

fn app(temp: &tempfile::TempDir, ncbi: FakeNcbi) -> TestApp {
    let reconciler = CacheReconciler::new(
        temp_store(temp),
        ncbi,
        FakeMlst::default(),
        temp.path().join("work/genomes"),
    );
    App::new(reconciler)
}

fn ncbi() -> FakeNcbi {
    FakeNcbi::with_records(vec![
        record("GCA_000001.1", "SAMN1", Some("USA: Ohio"), Some("2020-02-02")),
        record("GCA_000002.1", "SAMN2", Some("Canada"), Some("2021")),
        record("GCA_000003.1", "SAMN3", None, None),
    ])
}

fn query(location: Option<&str>, sequence_type: Option<&str>) -> Query {
    Query {
        organism: "Mycobacteroides abscessus".to_string(),
        scheme: "mabscessus".to_string(),
        filters: FilterOptions::from_flags(None, None, location, sequence_type).unwrap(),
    }
}

/// SAMN1 typed as ST 5, plus a row from an unrelated organism.
fn seed_cache(app: &TestApp) {
    let reconciler = app.reconciler();
    reconciler.create_table("mabscessus").unwrap();
    let seeded = [("GCA_000001.1", "SAMN1", "USA: Ohio"), ("GCA_000099.1", "SAMN99", "USA")];
    let rows = seeded
        .iter()
        .map(|(accession, biosample, location)| CachedRow {
            accession: accession.to_string(),
            biosample: Some(biosample.to_string()),
            location: Some(location.to_string()),
            collection_date: Some("2020-02-02".to_string()),
            scheme: "mabscessus".to_string(),
            sequence_type: Some("5".to_string()),
            ..CachedRow::default()
        })
        .collect::<Vec<_>>();
    reconciler.store().insert_rows("mabscessus", &rows).unwrap();
}

#[test]
fn preview_counts_without_typing() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);

    let counts = app.preview(&query(Some("USA"), Some("5"))).unwrap();
    assert_eq!(counts.typed.filtered_matches, 1);
    assert_eq!(counts.typed.unfiltered_matches, 1);
    assert_eq!(counts.typed.unfiltered_overall, 1);
    assert_eq!(counts.untyped.filtered_overall, 0);
    assert_eq!(counts.untyped.unfiltered_overall, 2);

    assert!(app.reconciler().ncbi().downloaded().is_empty());
    assert_eq!(app.reconciler().typing().typed_files(), 0);
}

#[test]
fn preview_without_cache_table_reports_everything_untyped() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    let counts = app.preview(&query(None, None)).unwrap();
    assert_eq!(counts.typed.unfiltered_overall, 0);
    assert_eq!(counts.untyped.unfiltered_overall, 3);
    assert!(!app.reconciler().store().table_exists("mabscessus").unwrap());
}

#[test]
fn cache_types_missing_genomes_and_filters_rows() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);

    let result = app
        .cache(&query(None, Some("1")), &CacheOptions::default())
        .unwrap();
    let summary = result.summary.unwrap();
    assert_eq!(summary.requested, 2);
    assert_eq!(summary.inserted, 2);
    assert_eq!(
        result
            .rows
            .iter()
            .map(|row| row.accession.as_str())
            .collect::<Vec<_>>(),
        vec!["GCA_000002.1", "GCA_000003.1"]
    );
    assert_eq!(result.columns.first().map(String::as_str), Some("accession"));
    assert!(result.columns.contains(&"gene2".to_string()));
    assert_eq!(result.columns.last().map(String::as_str), Some("last_updated"));
}

#[test]
fn cache_respects_location_filter_before_typing() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    let result = app
        .cache(&query(Some("Canada"), None), &CacheOptions::default())
        .unwrap();
    assert_eq!(
        app.reconciler().ncbi().downloaded(),
        vec![vec!["GCA_000002.1".to_string()]]
    );
    assert_eq!(result.rows.len(), 1);
}

#[test]
fn cached_only_never_downloads() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);

    let options = CacheOptions {
        cached_only: true,
        refresh: false,
    };
    let result = app.cache(&query(None, None), &options).unwrap();
    assert!(result.summary.is_none());
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].biosample.as_deref(), Some("SAMN1"));
    assert!(app.reconciler().ncbi().downloaded().is_empty());
}

#[test]
fn refresh_pushes_current_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);
    let mut stale = app.reconciler().get_table("mabscessus").unwrap().unwrap();
    stale[0].location = Some("nowhere".to_string());
    app.reconciler()
        .store()
        .replace_table("mabscessus", &stale)
        .unwrap();

    let options = CacheOptions {
        cached_only: true,
        refresh: true,
    };
    let result = app.cache(&query(None, None), &options).unwrap();
    assert_eq!(result.refreshed, 1);
    assert_eq!(result.rows[0].location.as_deref(), Some("USA: Ohio"));
}

#[test]
fn fetch_downloads_matching_genomes() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);
    let output_dir = temp.path().join("out");

    let options = CacheOptions {
        cached_only: true,
        refresh: false,
    };
    let result = app
        .fetch(&query(None, Some("5")), &options, output_dir.clone())
        .unwrap();
    assert_eq!(result.downloaded, 1);
    assert_eq!(result.output_dir.as_deref(), Some(output_dir.as_path()));
    assert_eq!(
        app.reconciler().ncbi().downloaded(),
        vec![vec!["GCA_000001.1".to_string()]]
    );
    assert_eq!(fs_util::find_sequence_files(&output_dir).len(), 1);
}

#[test]
fn fetch_refuses_directory_with_unrelated_files() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);
    let output_dir = temp.path().join("documents");
    std::fs::create_dir_all(&output_dir).unwrap();
    std::fs::write(output_dir.join("thesis.docx"), b"draft").unwrap();

    let options = CacheOptions {
        cached_only: true,
        refresh: false,
    };
    let err = app
        .fetch(&query(None, Some("5")), &options, output_dir.clone())
        .unwrap_err();
    assert_matches!(err, SeekerError::OutputDirNotEmpty(dir) if dir == output_dir);
    assert_eq!(std::fs::read(output_dir.join("thesis.docx")).unwrap(), b"draft");
    assert!(app.reconciler().ncbi().downloaded().is_empty());
}

#[test]
fn fetch_replaces_previous_output() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    seed_cache(&app);
    let output_dir = temp.path().join("out");
    let options = CacheOptions {
        cached_only: true,
        refresh: false,
    };

    app.fetch(&query(None, Some("5")), &options, output_dir.clone())
        .unwrap();
    let result = app
        .fetch(&query(None, Some("5")), &options, output_dir.clone())
        .unwrap();
    assert_eq!(result.downloaded, 1);
    assert_eq!(app.reconciler().ncbi().downloaded().len(), 2);
    assert_eq!(fs_util::find_sequence_files(&output_dir).len(), 1);
}

#[test]
fn fetch_with_no_matches_skips_download() {
    let temp = tempfile::tempdir().unwrap();
    let app = app(&temp, ncbi());
    let options = CacheOptions {
        cached_only: true,
        refresh: false,
    };
    let result = app
        .fetch(&query(None, Some("5")), &options, temp.path().join("out"))
        .unwrap();
    assert_eq!(result.downloaded, 0);
    assert_eq!(result.output_dir, None);
    assert!(app.reconciler().ncbi().downloaded().is_empty());
}

#[test]
fn report_failures_surface_from_every_command() {
    let temp = tempfile::tempdir().unwrap();
    let failing = FakeNcbi {
        fail_reports: true,
        ..FakeNcbi::default()
    };
    let app = app(&temp, failing);
    assert_matches!(app.preview(&query(None, None)), Err(SeekerError::NcbiHttp(_)));
    assert_matches!(
        app.cache(&query(None, None), &CacheOptions::default()),
        Err(SeekerError::NcbiHttp(_))
    );
}
