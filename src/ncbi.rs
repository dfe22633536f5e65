use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::GenomeAccession;
use crate::error::SeekerError;
use crate::fs_util;
use crate::report::RawRecord;

pub const DEFAULT_BASE_URL: &str = "https://api.ncbi.nlm.nih.gov/datasets/v2alpha";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const PAGE_SIZE: usize = 1000;
const PAGE_DELAY: Duration = Duration::from_millis(400);

pub trait NcbiClient: Send + Sync {
    fn dataset_reports(&self, organism: &str) -> Result<Vec<RawRecord>, SeekerError>;

    fn download_genomes(
        &self,
        accessions: &[GenomeAccession],
        target_dir: &Path,
    ) -> Result<(), SeekerError>;
}

#[derive(Debug, Deserialize)]
struct DatasetReportPage {
    #[serde(default)]
    reports: Vec<serde_json::Value>,
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenomeDownloadRequest<'a> {
    accessions: Vec<&'a str>,
    include_annotation_type: [&'static str; 1],
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    base_url: String,
}

impl NcbiHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SeekerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mlst-seeker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SeekerError::NcbiHttp(err.to_string()))?,
        );
        headers.insert("X-Datasets-Client", HeaderValue::from_static("mlst-seeker"));
        headers.insert(
            "X-Datasets-Client-Version",
            HeaderValue::from_str(env!("CARGO_PKG_VERSION"))
                .map_err(|err| SeekerError::NcbiHttp(err.to_string()))?,
        );

        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim())
                        .map_err(|err| SeekerError::NcbiHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SeekerError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, SeekerError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "NCBI request failed".to_string());
        Err(SeekerError::NcbiStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, SeekerError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, "retrying NCBI request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Self::check_status(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(%err, attempt, "retrying NCBI request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(SeekerError::NcbiHttp(err.to_string()));
                }
            }
        }
    }
}

impl NcbiClient for NcbiHttpClient {
    fn dataset_reports(&self, organism: &str) -> Result<Vec<RawRecord>, SeekerError> {
        let url = format!("{}/genome/taxon/{}/dataset_report", self.base_url, organism);
        let page_size = PAGE_SIZE.to_string();
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        info!("Downloading genome records from NCBI...");
        loop {
            let response = self.send_with_retries(|| {
                let mut request = self.client.get(&url).query(&[
                    ("page_size", page_size.as_str()),
                    ("filters.assembly_source", "genbank"),
                ]);
                if let Some(token) = &page_token {
                    request = request.query(&[("page_token", token.as_str())]);
                }
                request
            })?;
            let page: DatasetReportPage = response
                .json()
                .map_err(|err| SeekerError::NcbiDecode(err.to_string()))?;

            records.extend(page.reports.into_iter().map(RawRecord::new));
            info!(
                "Downloaded {} of {} records",
                records.len(),
                page.total_count.unwrap_or(records.len() as u64)
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    page_token = Some(token);
                    thread::sleep(PAGE_DELAY);
                }
                _ => break,
            }
        }
        Ok(records)
    }

    fn download_genomes(
        &self,
        accessions: &[GenomeAccession],
        target_dir: &Path,
    ) -> Result<(), SeekerError> {
        info!("Downloading {} genomes...", accessions.len());
        let url = format!("{}/genome/download", self.base_url);
        let body = GenomeDownloadRequest {
            accessions: accessions.iter().map(GenomeAccession::as_str).collect(),
            include_annotation_type: ["GENOME_FASTA"],
        };
        let mut response = self.send_with_retries(|| self.client.post(&url).json(&body))?;

        let parent = target_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        let temp_dir = tempfile::Builder::new()
            .prefix("mlst-seeker-genomes")
            .tempdir_in(parent)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        let download_path = temp_dir.path().join("genomes.download");
        let mut file =
            File::create(&download_path).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        file.flush()
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        drop(file);

        let zip_path = unwrap_gzip(&download_path, &temp_dir.path().join("genomes.zip"))?;
        fs_util::validate_zip(&zip_path)?;
        fs_util::clear_dir(target_dir)?;
        fs_util::extract_zip(&zip_path, target_dir)
    }
}

fn unwrap_gzip(path: &Path, zip_path: &Path) -> Result<std::path::PathBuf, SeekerError> {
    let mut magic = [0u8; 2];
    let read = File::open(path)
        .and_then(|mut file| file.read(&mut magic))
        .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    if read < 2 || magic != [0x1f, 0x8b] {
        return Ok(path.to_path_buf());
    }

    let input = File::open(path).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    let mut decoder = GzDecoder::new(input);
    let mut output =
        File::create(zip_path).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    std::io::copy(&mut decoder, &mut output)
        .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    Ok(zip_path.to_path_buf())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
