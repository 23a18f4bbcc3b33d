/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Saved rename rules: one JSON object mapping [`AddressKey`] to an override
//! title, held in a single storage slot.
//!
//! Every mutation rewrites the whole mapping. Two overlapping mutations race at
//! that granularity and the later write-back wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::address_key::AddressKey;
use crate::persistence::{KeyValueStore, StoreError};

pub const RULES_SLOT: &str = "titleRules";

pub type RuleMap = BTreeMap<String, String>;

pub struct RuleStore {
    store: Arc<dyn KeyValueStore>,
}

impl RuleStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Saved title for `key`, if any.
    pub fn get(&self, key: &AddressKey) -> Result<Option<String>, RuleStoreError> {
        let mut rules = self.list()?;
        Ok(rules.remove(key.as_str()).filter(|title| !title.is_empty()))
    }

    /// The whole mapping. An absent slot is an empty mapping.
    pub(crate) fn list(&self) -> Result<RuleMap, RuleStoreError> {
        let Some(bytes) = self.store.get(RULES_SLOT)? else {
            return Ok(RuleMap::new());
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| RuleStoreError::Storage(StoreError::Codec(format!("{e}"))))
    }

    /// Save `title` for `key`, overwriting any previous rule. Returns the
    /// trimmed title that was stored.
    pub fn set(&self, key: &AddressKey, title: &str) -> Result<String, RuleStoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RuleStoreError::EmptyTitle);
        }
        let mut rules = self.list()?;
        rules.insert(key.to_string(), title.to_string());
        self.write(&rules)?;
        Ok(title.to_string())
    }

    pub fn delete(&self, key: &AddressKey) -> Result<(), RuleStoreError> {
        let mut rules = self.list()?;
        rules.remove(key.as_str());
        self.write(&rules)
    }

    fn write(&self, rules: &RuleMap) -> Result<(), RuleStoreError> {
        let bytes = serde_json::to_vec(rules)
            .map_err(|e| RuleStoreError::Storage(StoreError::Codec(format!("{e}"))))?;
        self.store.set(RULES_SLOT, &bytes)?;
        Ok(())
    }
}

/// Errors from the rule store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStoreError {
    EmptyTitle,
    Storage(StoreError),
}

impl From<StoreError> for RuleStoreError {
    fn from(e: StoreError) -> Self {
        RuleStoreError::Storage(e)
    }
}

impl std::fmt::Display for RuleStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleStoreError::EmptyTitle => write!(f, "Title cannot be empty."),
            RuleStoreError::Storage(e) => write!(f, "Saved rules are unavailable: {e}"),
        }
    }
}

impl std::error::Error for RuleStoreError {}
