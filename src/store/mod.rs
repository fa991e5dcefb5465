use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::models::{ItemOutcome, ScrapedItem};

/// A JSON file holding a key -> record mapping, merged on every write
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole mapping.
    ///
    /// A missing or malformed file reads as empty.
    pub async fn load<T: DeserializeOwned>(&self) -> BTreeMap<String, T> {
        match self.try_load().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Treating store as empty: {e}");
                BTreeMap::new()
            }
        }
    }

    /// Reads the whole mapping, reporting a missing or malformed file
    pub async fn try_load<T: DeserializeOwned>(&self) -> Result<BTreeMap<String, T>, StoreError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Merges `records` over what is on disk; keys in `records` win.
    pub async fn merge<T: Serialize>(&self, records: BTreeMap<String, T>) -> Result<(), StoreError> {
        let mut data: BTreeMap<String, serde_json::Value> = self.load().await;
        for (key, record) in records {
            let value = serde_json::to_value(record).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
            data.insert(key, value);
        }
        self.write(&data).await
    }

    /// Replaces the file with `records`
    pub async fn replace<T: Serialize>(&self, records: &BTreeMap<String, T>) -> Result<(), StoreError> {
        self.write(records).await
    }

    async fn write<T: Serialize>(&self, data: &T) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(data).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        // Write then rename so readers never see a half-written file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

/// Writes the scrape phase's shortlist, keyed by item key.
///
/// Later items with the same key replace earlier ones.
pub async fn save_scraped(store: &JsonStore, items: Vec<ScrapedItem>) -> Result<usize, StoreError> {
    let mut records = BTreeMap::new();
    for scraped in items {
        let key = scraped.item.key();
        if key.is_empty() {
            continue;
        }
        if records.insert(key.clone(), scraped).is_some() {
            warn!("Duplicate item key '{key}', keeping the later row");
        }
    }

    store.replace(&records).await?;
    info!("Saved {} scraped items to {}", records.len(), store.path().display());
    Ok(records.len())
}

/// Success and failure stores for the cart phase
#[derive(Debug, Clone)]
pub struct OutcomeStores {
    pub success: JsonStore,
    pub failure: JsonStore,
}

impl OutcomeStores {
    pub fn new(success: impl Into<PathBuf>, failure: impl Into<PathBuf>) -> Self {
        Self {
            success: JsonStore::new(success),
            failure: JsonStore::new(failure),
        }
    }

    /// Records one outcome in the store matching its status
    pub async fn record(&self, outcome: ItemOutcome) -> Result<(), StoreError> {
        let store = if outcome.is_success() {
            &self.success
        } else {
            &self.failure
        };

        let mut records = BTreeMap::new();
        records.insert(outcome.item_key.clone(), outcome);
        store.merge(records).await
    }

    /// Starts the single writer that owns both store files for a run.
    ///
    /// Workers send outcomes through the returned channel; dropping every
    /// sender lets the writer drain and finish.
    pub fn spawn_writer(self) -> (mpsc::UnboundedSender<ItemOutcome>, JoinHandle<usize>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ItemOutcome>();

        let handle = tokio::spawn(async move {
            let mut written = 0;
            while let Some(outcome) = rx.recv().await {
                let key = outcome.item_key.clone();
                match self.record(outcome).await {
                    Ok(()) => written += 1,
                    Err(e) => error!("Failed to persist outcome for '{key}': {e}"),
                }
            }
            written
        });

        (tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{Candidate, EligibleSet, InputItem, OutcomeStatus};

    fn scraped(name: &str) -> ScrapedItem {
        ScrapedItem {
            item: InputItem {
                name: name.to_string(),
                min_price: 1.0,
                max_price: 2.0,
                extra: BTreeMap::new(),
            },
            eligible_products: EligibleSet::from_ranked(vec![Candidate {
                name: format!("{name} product"),
                price: 1.5,
                url: format!("https://shop.example/ip/{name}"),
            }]),
        }
    }

    fn outcome(name: &str, status: OutcomeStatus) -> ItemOutcome {
        let item = scraped(name);
        ItemOutcome {
            item_key: item.item.key(),
            successful_candidate: (status == OutcomeStatus::Success)
                .then(|| item.eligible_products.as_slice()[0].clone()),
            item,
            final_status: status,
            attempts: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_or_malformed_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = JsonStore::new(dir.path().join("missing.json"));
        assert!(missing.load::<ItemOutcome>().await.is_empty());

        let broken_path = dir.path().join("broken.json");
        std::fs::write(&broken_path, "{ not json").unwrap();
        let broken = JsonStore::new(&broken_path);
        assert!(broken.load::<ItemOutcome>().await.is_empty());
        assert!(matches!(
            broken.try_load::<ItemOutcome>().await,
            Err(StoreError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn merge_keeps_untouched_keys() {
        let dir = tempfile::tempdir().unwrap();
        let stores = OutcomeStores::new(dir.path().join("ok.json"), dir.path().join("fail.json"));

        stores.record(outcome("Lamp", OutcomeStatus::Success)).await.unwrap();
        stores.record(outcome("Kettle", OutcomeStatus::Success)).await.unwrap();
        let mut relamp = outcome("Lamp", OutcomeStatus::Success);
        relamp.attempts.clear();
        relamp.item.item.max_price = 9.0;
        stores.record(relamp).await.unwrap();

        let saved: BTreeMap<String, ItemOutcome> = stores.success.try_load().await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved["lamp"].item.item.max_price, 9.0);
        assert!(saved.contains_key("kettle"));
        assert!(stores.failure.try_load::<ItemOutcome>().await.is_err());
    }

    #[tokio::test]
    async fn writer_routes_by_status() {
        let dir = tempfile::tempdir().unwrap();
        let stores = OutcomeStores::new(
            dir.path().join("out/ok.json"),
            dir.path().join("out/fail.json"),
        );

        let (tx, handle) = stores.clone().spawn_writer();
        tx.send(outcome("Lamp", OutcomeStatus::Success)).unwrap();
        tx.send(outcome("Fan", OutcomeStatus::Failure)).unwrap();
        tx.send(outcome("Kettle", OutcomeStatus::Failure)).unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);

        let ok: BTreeMap<String, ItemOutcome> = stores.success.try_load().await.unwrap();
        let failed: BTreeMap<String, ItemOutcome> = stores.failure.try_load().await.unwrap();
        assert_eq!(ok.keys().collect::<Vec<_>>(), vec!["lamp"]);
        assert_eq!(failed.keys().collect::<Vec<_>>(), vec!["fan", "kettle"]);
    }

    #[tokio::test]
    async fn scraped_items_are_keyed_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("scraped.json"));

        let count = save_scraped(&store, vec![scraped("Desk Lamp"), scraped("Fan"), scraped("desk lamp")])
            .await
            .unwrap();

        assert_eq!(count, 2);
        let loaded: BTreeMap<String, ScrapedItem> = store.try_load().await.unwrap();
        assert_eq!(loaded["desk_lamp"].item.name, "desk lamp");
    }

    #[tokio::test]
    async fn columns_named_like_record_fields_survive_a_reload() {
        let csv = "Item Name,Min Cost ($),Max Cost ($),Name,Min Price,Item Key,Attempts\n\
                   Desk Lamp,10,20,Lamp alias,5,lamp-01,3\n";
        let items = crate::input::parse_input_items(csv.as_bytes()).unwrap();
        let shortlisted = ScrapedItem {
            item: items[0].clone(),
            eligible_products: scraped("Desk Lamp").eligible_products,
        };

        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("scraped.json"));
        save_scraped(&store, vec![shortlisted.clone()]).await.unwrap();

        let loaded: BTreeMap<String, ScrapedItem> = store.try_load().await.unwrap();
        assert_eq!(loaded["desk_lamp"], shortlisted);
        assert_eq!(loaded["desk_lamp"].item.name, "Desk Lamp");
        assert_eq!(loaded["desk_lamp"].item.extra["name"], "Lamp alias");

        let stores = OutcomeStores::new(dir.path().join("ok.json"), dir.path().join("fail.json"));
        let mut done = outcome("Desk Lamp", OutcomeStatus::Success);
        done.item = shortlisted;
        stores.record(done.clone()).await.unwrap();

        let saved: BTreeMap<String, ItemOutcome> = stores.success.try_load().await.unwrap();
        assert_eq!(saved["desk_lamp"], done);
    }
}
