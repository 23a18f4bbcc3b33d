/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Host browser boundary.
//!
//! [`TabHost`] is everything the orchestrator needs from the browser: tab
//! lookup, running a [`LockAction`] inside a page, grouping, the context menu,
//! and opening the rename surface. Hosts report failures as raw platform text
//! in [`HostError`]; [`UnreachableCause`] turns the well-known ones into stable
//! messages.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::groups::{GroupId, GroupInfo, GroupUpdate};
use crate::title_lock::{LockAction, LockReply};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    pub url: Option<String>,
    pub title: Option<String>,
    pub group_id: Option<GroupId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Complete,
}

/// What changed in a tab update event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TabChange {
    pub status: Option<LoadStatus>,
    pub url: Option<String>,
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuItem {
    pub id: &'static str,
    pub title: &'static str,
}

/// Failure text as the host platform produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HostError {}

/// Stable, user-readable reasons a tab could not be reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnreachableCause {
    InternalPage,
    StoreGallery,
    TabGone,
    Unknown,
    Other(String),
}

impl UnreachableCause {
    pub fn classify(error: &HostError) -> Self {
        let message = error.0.as_str();
        if message.is_empty() {
            UnreachableCause::Unknown
        } else if message.contains("Cannot access a chrome:// URL") {
            UnreachableCause::InternalPage
        } else if message.contains("The extensions gallery cannot be scripted") {
            UnreachableCause::StoreGallery
        } else if message.contains("No tab with id") {
            UnreachableCause::TabGone
        } else {
            UnreachableCause::Other(message.to_string())
        }
    }
}

impl fmt::Display for UnreachableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableCause::InternalPage => f.write_str("Chrome internal pages cannot be renamed."),
            UnreachableCause::StoreGallery => f.write_str("Chrome Web Store pages cannot be renamed."),
            UnreachableCause::TabGone => f.write_str("That tab is no longer available."),
            UnreachableCause::Unknown => f.write_str("Unknown error."),
            UnreachableCause::Other(message) => f.write_str(message),
        }
    }
}

/// Stable message for a host failure.
pub fn describe_host_error(error: &HostError) -> String {
    UnreachableCause::classify(error).to_string()
}

/// Browser services the orchestrator consumes. Every call is a single attempt.
pub trait TabHost: Send + Sync {
    fn get_tab(&self, tab_id: TabId) -> impl Future<Output = Result<TabInfo, HostError>> + Send;

    /// Active tab of the current window.
    fn active_tab(&self) -> impl Future<Output = Result<Option<TabInfo>, HostError>> + Send;

    /// Run `action` inside the tab's page context. `Ok(None)` means the page
    /// produced no reply.
    fn run_in_page(
        &self,
        tab_id: TabId,
        action: LockAction,
    ) -> impl Future<Output = Result<Option<LockReply>, HostError>> + Send;

    /// Put an ungrouped tab into a new group.
    fn group_tab(&self, tab_id: TabId) -> impl Future<Output = Result<GroupId, HostError>> + Send;

    fn get_group(&self, group_id: GroupId)
    -> impl Future<Output = Result<GroupInfo, HostError>> + Send;

    fn update_group(
        &self,
        group_id: GroupId,
        update: GroupUpdate,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Replace the extension's context-menu items with `item`.
    fn install_menu_item(&self, item: MenuItem) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Open the rename surface, in `window_id` or the current window.
    fn open_surface(
        &self,
        window_id: Option<WindowId>,
    ) -> impl Future<Output = Result<(), HostError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Cannot access a chrome:// URL", "Chrome internal pages cannot be renamed.")]
    #[case(
        "Error: The extensions gallery cannot be scripted.",
        "Chrome Web Store pages cannot be renamed."
    )]
    #[case("No tab with id: 42.", "That tab is no longer available.")]
    #[case("", "Unknown error.")]
    #[case("Frame with ID 0 was removed.", "Frame with ID 0 was removed.")]
    fn host_errors_map_to_stable_messages(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(describe_host_error(&HostError::new(raw)), expected);
    }

    #[test]
    fn classify_recognises_gone_tabs() {
        assert_eq!(
            UnreachableCause::classify(&HostError::new("No tab with id: 3.")),
            UnreachableCause::TabGone
        );
    }

    #[test]
    fn window_ids_order_numerically() {
        let mut active = std::collections::BTreeMap::new();
        active.insert(WindowId(7), TabId(1));
        active.insert(WindowId(2), TabId(3));
        assert_eq!(active.keys().copied().collect::<Vec<_>>(), vec![WindowId(2), WindowId(7)]);
    }
}
