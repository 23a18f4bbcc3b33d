/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tells a lazily started rename surface which tab opened it.
//!
//! The entry is a single slot written to two places: a session storage area
//! and an in-memory fallback. The latest publish wins, a consume reads it once,
//! and an entry older than the TTL is treated as absent. Storage failures never
//! reach the caller.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::host::TabId;
use crate::persistence::KeyValueStore;

pub const LAUNCH_CONTEXT_SLOT: &str = "launchContext";
pub const DEFAULT_LAUNCH_CONTEXT_TTL: Duration = Duration::from_secs(30);

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchContextEntry {
    pub tab_id: i64,
    /// Unix time in milliseconds.
    pub created_at: i64,
}

pub struct LaunchContextBroker {
    session: Arc<dyn KeyValueStore>,
    fallback: Mutex<Option<LaunchContextEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl LaunchContextBroker {
    pub fn new(session: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self::with_clock(session, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        session: Arc<dyn KeyValueStore>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            fallback: Mutex::new(None),
            ttl,
            clock,
        }
    }

    /// Record `tab_id` as the tab that triggered the next surface launch,
    /// replacing any unconsumed entry. Non-positive ids are ignored.
    pub fn publish(&self, tab_id: i64) -> bool {
        if tab_id <= 0 {
            return false;
        }
        let entry = LaunchContextEntry {
            tab_id,
            created_at: unix_millis(self.clock.now()),
        };
        *self.fallback.lock() = Some(entry);

        match serde_json::to_vec(&entry) {
            Ok(bytes) => {
                if let Err(e) = self.session.set(LAUNCH_CONTEXT_SLOT, &bytes) {
                    debug!("launch_context: session write failed, keeping in-memory entry ({e})");
                }
            },
            Err(e) => debug!("launch_context: failed to encode entry ({e})"),
        }
        true
    }

    /// Take the pending entry, if it is still fresh.
    pub fn consume(&self) -> Option<TabId> {
        let fallback = self.fallback.lock().take();

        let entry = match self.session.get(LAUNCH_CONTEXT_SLOT) {
            Ok(Some(bytes)) => match serde_json::from_slice::<LaunchContextEntry>(&bytes) {
                Ok(stored) => Some(stored),
                Err(e) => {
                    debug!("launch_context: discarding unreadable session entry ({e})");
                    None
                },
            },
            Ok(None) => None,
            Err(e) => {
                debug!("launch_context: session read failed, using in-memory entry ({e})");
                fallback
            },
        };
        if let Err(e) = self.session.remove(LAUNCH_CONTEXT_SLOT) {
            debug!("launch_context: session remove failed ({e})");
        }

        let entry = entry?;
        if entry.tab_id <= 0 {
            return None;
        }
        let age_ms = unix_millis(self.clock.now()).saturating_sub(entry.created_at);
        if age_ms > self.ttl.as_millis() as i64 {
            debug!("launch_context: entry for tab {} expired", entry.tab_id);
            return None;
        }
        Some(TabId(entry.tab_id))
    }
}
