use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mount_table::normalize_dataset;

/// One dataset as published by the catalogue service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub dataset: String,
    pub ms_host: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_pkey: String,
    pub gateway: String,
    #[serde(default)]
    pub description: String,
}

impl CatalogueEntry {
    fn normalized(mut self) -> Self {
        self.dataset = normalize_dataset(&self.dataset);
        self.ms_host = self.ms_host.trim().to_string();
        self.volume = self.volume.trim().to_string();
        self.username = self.username.trim().to_string();
        self.user_pkey = self.user_pkey.trim().to_string();
        self.gateway = self.gateway.trim().to_string();
        self.description = self.description.trim().to_string();
        self
    }

    /// Whether the entry ships its own identity.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.user_pkey.is_empty()
    }
}

/// Read-only dataset lookup, keyed by normalized dataset name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalogue {
    entries: BTreeMap<String, CatalogueEntry>,
}

impl Catalogue {
    /// Later entries for the same dataset replace earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogueEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(CatalogueEntry::normalized)
            .map(|entry| (entry.dataset.clone(), entry))
            .collect();
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<CatalogueEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, dataset: &str) -> Option<&CatalogueEntry> {
        self.entries.get(&normalize_dataset(dataset))
    }

    /// Entries sorted by dataset, filtered by a case-insensitive substring
    /// of the dataset or description.
    pub fn list(&self, query: Option<&str>) -> Vec<&CatalogueEntry> {
        let query = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        self.entries
            .values()
            .filter(|entry| match &query {
                Some(q) => {
                    entry.dataset.contains(q.as_str())
                        || entry.description.to_lowercase().contains(q.as_str())
                }
                None => true,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
