//! Data models for input items, scraped candidates and cart outcomes

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of the input sheet: what to look for and how much to pay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
    pub name: String,
    pub min_price: f64,
    pub max_price: f64,
    /// Any other non-empty columns, keyed by their normalized header.
    /// Kept under their own key so a column can never shadow a record field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl InputItem {
    /// Stable key used for the intermediate artifact and the outcome stores
    pub fn key(&self) -> String {
        item_key(&self.name)
    }
}

/// Lowercases the name and replaces spaces, commas and apostrophes with `_`
pub fn item_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | ',' | '\'' => '_',
            other => other,
        })
        .collect()
}

/// A product record as it comes off a search page, before price validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub name: String,
    pub price: Option<String>,
    pub url: String,
}

/// A product with a validated price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub price: f64,
    pub url: String,
}

/// Ranked shortlist of at most [`EligibleSet::CAPACITY`] candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EligibleSet(Vec<Candidate>);

impl EligibleSet {
    /// Primary pick plus one backup
    pub const CAPACITY: usize = 2;

    /// Keeps the first [`Self::CAPACITY`] entries of an already ranked list
    pub fn from_ranked(mut ranked: Vec<Candidate>) -> Self {
        ranked.truncate(Self::CAPACITY);
        Self(ranked)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a EligibleSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An input item together with its shortlist, as written by the scrape phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    #[serde(flatten)]
    pub item: InputItem,
    pub eligible_products: EligibleSet,
}

/// One add-to-cart attempt on one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub candidate: Candidate,
    pub succeeded: bool,
    pub proxied: bool,
    /// Failure kind, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Final record for one item, persisted to the success or failure store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_key: String,
    #[serde(flatten)]
    pub item: ScrapedItem,
    pub final_status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_candidate: Option<Candidate>,
    #[serde(default)]
    pub attempts: Vec<AttemptResult>,
    pub completed_at: DateTime<Utc>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.final_status == OutcomeStatus::Success
    }
}
