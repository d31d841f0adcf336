//! Paginated download of the LTA DataMall bus datasets.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use gtfs_synth_core::source::{BUS_ROUTES_FILE, BUS_SERVICES_FILE, BUS_STOPS_FILE};

pub const DATAMALL_BASE_URL: &str = "https://datamall2.mytransport.sg/ltaodataservice/";
pub const ACCOUNT_KEY_ENV: &str = "LTA_ACCOUNT_KEY";
pub const PAGE_SIZE: usize = 50;

/// DataMall endpoint and the file its records are saved to.
pub const DATASETS: &[(&str, &str)] = &[
    ("BusServices", BUS_SERVICES_FILE),
    ("BusStops", BUS_STOPS_FILE),
    ("BusRoutes", BUS_ROUTES_FILE),
];

/// Environment variable first, then the key file.
pub fn resolve_account_key(key_file: &Path) -> anyhow::Result<String> {
    if let Ok(key) = std::env::var(ACCOUNT_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }
    match std::fs::read_to_string(key_file) {
        Ok(contents) if !contents.trim().is_empty() => Ok(contents.trim().to_string()),
        _ => bail!(
            "set {} or put the account key in {}",
            ACCOUNT_KEY_ENV,
            key_file.display()
        ),
    }
}

pub trait PageSource {
    fn page(&mut self, endpoint: &str, skip: usize) -> anyhow::Result<Vec<Value>>;
}

#[derive(Deserialize)]
struct DataMallPage {
    #[serde(default)]
    value: Vec<Value>,
}

pub struct DataMallClient {
    client: Client,
    base_url: String,
    account_key: String,
}

impl DataMallClient {
    pub fn new(base_url: &str, account_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(format!("gtfs-synth/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            account_key,
        })
    }
}

impl PageSource for DataMallClient {
    fn page(&mut self, endpoint: &str, skip: usize) -> anyhow::Result<Vec<Value>> {
        let url = format!("{}{}?$skip={}", self.base_url, endpoint, skip);
        let page: DataMallPage = self
            .client
            .get(&url)
            .header("AccountKey", &self.account_key)
            .header("accept", "application/json")
            .send()
            .with_context(|| format!("fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("fetch {}", url))?
            .json()
            .with_context(|| format!("decode {}", url))?;
        Ok(page.value)
    }
}

/// Pages through `endpoint` until a page is empty or adds nothing new.
/// Records are deduplicated on their key-sorted JSON text.
pub fn fetch_all(
    source: &mut dyn PageSource,
    endpoint: &str,
    delay: Duration,
) -> anyhow::Result<Vec<Value>> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut skip = 0;
    loop {
        info!(endpoint, skip, "fetching page");
        let page = source.page(endpoint, skip)?;
        if page.is_empty() {
            break;
        }
        let mut added = 0;
        for record in page {
            let canonical = serde_json::to_string(&record).context("serialize record")?;
            if seen.insert(canonical) {
                records.push(record);
                added += 1;
            }
        }
        if added == 0 {
            info!(endpoint, skip, "page added no new records, stopping");
            break;
        }
        skip += PAGE_SIZE;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    Ok(records)
}

/// Downloads every dataset into `output_dir`. Returns the written paths.
pub fn fetch_datasets(
    source: &mut dyn PageSource,
    output_dir: &Path,
    delay: Duration,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;
    let mut written = Vec::with_capacity(DATASETS.len());
    for (endpoint, file_name) in DATASETS {
        let records = fetch_all(source, endpoint, delay)?;
        let path = output_dir.join(file_name);
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &records)
            .with_context(|| format!("write {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("flush {}", path.display()))?;
        info!(endpoint = *endpoint, records = records.len(), path = %path.display(), "dataset saved");
        written.push(path);
    }
    Ok(written)
}
