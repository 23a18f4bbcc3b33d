/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Routes host events and surface requests into the core.
//!
//! - Navigation: a `complete` tab update looks up the saved rule for the tab's
//!   address and locks the title in that page. Failures are logged only.
//! - Context menu: the rename item publishes the acting tab to the
//!   [`LaunchContextBroker`] and opens the rename surface.
//! - Requests: a closed [`Request`] set, each answered with exactly one
//!   [`Response`]. [`Orchestrator::dispatch`] is the single boundary where
//!   handler errors become `{ok: false, error}` replies.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::address_key::{self, AddressKey};
use crate::groups::{GroupAssignment, GroupColor, GroupState, GroupUpdate};
use crate::host::{
    HostError, LoadStatus, MenuItem, TabChange, TabHost, TabId, TabInfo, describe_host_error,
};
use crate::launch_context::LaunchContextBroker;
use crate::rules::{RuleStore, RuleStoreError};
use crate::title_lock::{LockAction, LockReply};

pub const RENAME_MENU_ITEM: MenuItem = MenuItem {
    id: "rename-current-tab-context",
    title: "Rename current tab",
};

const UNSUPPORTED_ADDRESS: &str = "This page URL is not supported.";
const EMPTY_TITLE: &str = "Title cannot be empty.";
const INVALID_COLOR: &str = "Invalid group color.";
const NO_PAGE_REPLY: &str = "No response from page script.";
const UNKNOWN_REQUEST: &str = "Unknown request type.";

/// Inbound request, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Request {
    #[serde(rename = "get-tab-state", alias = "getTabState")]
    GetTabState {
        #[serde(default, alias = "url")]
        address: String,
    },
    #[serde(rename = "apply-once", alias = "applyOnce")]
    ApplyOnce {
        tab_id: i64,
        #[serde(default)]
        title: String,
    },
    #[serde(rename = "save-rule", alias = "saveRule")]
    SaveRule {
        #[serde(default, alias = "url")]
        address: String,
        #[serde(default)]
        title: String,
    },
    #[serde(rename = "clear-rule", alias = "clearRule")]
    ClearRule {
        #[serde(default, alias = "url")]
        address: String,
    },
    #[serde(rename = "restore-tab", alias = "restoreTab")]
    RestoreTab { tab_id: i64 },
    #[serde(rename = "consume-launch-context", alias = "consumeLaunchContext")]
    ConsumeLaunchContext,
    #[serde(rename = "get-group-state", alias = "getGroupState")]
    GetGroupState { tab_id: i64 },
    #[serde(rename = "assign-group", alias = "assignGroup")]
    AssignGroup {
        tab_id: i64,
        #[serde(default)]
        title: String,
        #[serde(default)]
        color: String,
    },
}

impl Request {
    const TYPES: [(&'static str, &'static str); 8] = [
        ("get-tab-state", "getTabState"),
        ("apply-once", "applyOnce"),
        ("save-rule", "saveRule"),
        ("clear-rule", "clearRule"),
        ("restore-tab", "restoreTab"),
        ("consume-launch-context", "consumeLaunchContext"),
        ("get-group-state", "getGroupState"),
        ("assign-group", "assignGroup"),
    ];

    pub fn is_known_type(name: &str) -> bool {
        Self::TYPES
            .iter()
            .any(|(canonical, legacy)| *canonical == name || *legacy == name)
    }
}

/// `get-tab-state` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    pub supported: bool,
    pub key: Option<AddressKey>,
    pub saved_title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    TabState(TabState),
    Title { title: String },
    RuleSaved { key: AddressKey, title: String },
    RuleCleared { key: AddressKey },
    LaunchContext { tab_id: Option<TabId> },
    GroupState(GroupState),
    GroupAssigned(GroupAssignment),
    /// Auto-reapply found nothing to do.
    Skipped,
    Failed { error: String },
}

impl Response {
    pub fn failed(error: impl Into<String>) -> Self {
        Response::Failed {
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Response::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Response::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Wire shape: `{ok: true, ...fields}` or `{ok: false, error}`.
    pub fn to_json(&self) -> Value {
        match self {
            Response::TabState(state) => json!({
                "ok": true,
                "supported": state.supported,
                "key": state.key,
                "savedTitle": state.saved_title,
            }),
            Response::Title { title } => json!({ "ok": true, "title": title }),
            Response::RuleSaved { key, title } => json!({ "ok": true, "key": key, "title": title }),
            Response::RuleCleared { key } => json!({ "ok": true, "key": key }),
            Response::LaunchContext { tab_id } => json!({ "ok": true, "tabId": tab_id }),
            Response::GroupState(state) => json!({
                "ok": true,
                "inGroup": state.in_group,
                "groupId": state.group_id,
                "title": state.title,
                "color": state.color,
            }),
            Response::GroupAssigned(assignment) => json!({
                "ok": true,
                "groupId": assignment.group_id,
                "title": assignment.title,
                "color": assignment.color,
                "createdGroup": assignment.created_group,
            }),
            Response::Skipped => json!({ "ok": true, "skipped": true }),
            Response::Failed { error } => json!({ "ok": false, "error": error }),
        }
    }
}

/// Why a handler could not produce a successful reply.
#[derive(Debug)]
enum HandlerError {
    Validation(&'static str),
    Page(String),
    Host(HostError),
    Rules(RuleStoreError),
}

impl From<HostError> for HandlerError {
    fn from(e: HostError) -> Self {
        HandlerError::Host(e)
    }
}

impl From<RuleStoreError> for HandlerError {
    fn from(e: RuleStoreError) -> Self {
        match e {
            RuleStoreError::EmptyTitle => HandlerError::Validation(EMPTY_TITLE),
            other => HandlerError::Rules(other),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Validation(message) => f.write_str(message),
            HandlerError::Page(message) => f.write_str(message),
            HandlerError::Host(e) => f.write_str(&describe_host_error(e)),
            HandlerError::Rules(e) => write!(f, "{e}"),
        }
    }
}

pub struct Orchestrator<H> {
    host: H,
    rules: RuleStore,
    launch: LaunchContextBroker,
}

impl<H: TabHost> Orchestrator<H> {
    pub fn new(host: H, rules: RuleStore, launch: LaunchContextBroker) -> Self {
        Self {
            host,
            rules,
            launch,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn launch_context(&self) -> &LaunchContextBroker {
        &self.launch
    }

    /// Install the context-menu entry. Called on install and on every startup.
    pub async fn start(&self) {
        if let Err(e) = self.host.install_menu_item(RENAME_MENU_ITEM).await {
            debug!("orchestrator: context menu not installed ({e})");
        }
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let result = match request {
            Request::GetTabState { address } => self.tab_state(&address),
            Request::ApplyOnce { tab_id, title } => self.apply_once(TabId(tab_id), &title).await,
            Request::SaveRule { address, title } => self.save_rule(&address, &title),
            Request::ClearRule { address } => self.clear_rule(&address),
            Request::RestoreTab { tab_id } => self.restore_tab(TabId(tab_id)).await,
            Request::ConsumeLaunchContext => Ok(Response::LaunchContext {
                tab_id: self.launch.consume(),
            }),
            Request::GetGroupState { tab_id } => self
                .group_state(TabId(tab_id))
                .await
                .map(Response::GroupState),
            Request::AssignGroup {
                tab_id,
                title,
                color,
            } => self.assign_group(TabId(tab_id), &title, &color).await,
        };
        result.unwrap_or_else(|e| Response::failed(e.to_string()))
    }

    /// JSON entry point used by message-based surfaces.
    pub async fn handle_json(&self, message: &Value) -> Value {
        let known = message
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(Request::is_known_type);
        if !known {
            return Response::failed(UNKNOWN_REQUEST).to_json();
        }
        match serde_json::from_value::<Request>(message.clone()) {
            Ok(request) => self.dispatch(request).await.to_json(),
            Err(e) => Response::failed(format!("Malformed request: {e}")).to_json(),
        }
    }

    /// Tab update from the host. Only completed loads with an address reapply
    /// a saved rule.
    pub async fn on_tab_updated(&self, tab_id: TabId, change: &TabChange, tab: &TabInfo) {
        if change.status != Some(LoadStatus::Complete) {
            return;
        }
        let Some(url) = tab.url.as_deref().filter(|url| !url.is_empty()) else {
            return;
        };
        match self.apply_saved_rule(tab_id, url).await {
            Ok(Response::Skipped) => {},
            Ok(Response::Failed { error }) => {
                debug!("orchestrator: saved title not applied to tab {tab_id}: {error}")
            },
            Ok(_) => debug!("orchestrator: reapplied saved title to tab {tab_id}"),
            Err(e) => debug!("orchestrator: saved title not applied to tab {tab_id}: {e}"),
        }
    }

    pub async fn on_menu_clicked(&self, menu_item_id: &str, tab: Option<TabInfo>) {
        if menu_item_id != RENAME_MENU_ITEM.id {
            return;
        }
        self.open_rename_surface(tab).await;
    }

    /// Remember which tab asked for the rename surface, then open it.
    pub async fn open_rename_surface(&self, tab_from_event: Option<TabInfo>) {
        let tab = match tab_from_event {
            Some(tab) => Some(tab),
            None => match self.host.active_tab().await {
                Ok(tab) => tab,
                Err(e) => {
                    debug!("orchestrator: no active tab for rename ({e})");
                    None
                },
            },
        };
        if let Some(tab) = &tab {
            self.launch.publish(tab.id.0);
        }
        let window_id = tab.as_ref().map(|tab| tab.window_id);
        if let Err(e) = self.host.open_surface(window_id).await {
            info!("orchestrator: rename surface could not be opened ({e})");
        }
    }

    async fn apply_saved_rule(&self, tab_id: TabId, url: &str) -> Result<Response, HandlerError> {
        let Some(key) = address_key::derive_key(url) else {
            return Ok(Response::Skipped);
        };
        let Some(saved_title) = self.rules.get(&key)? else {
            return Ok(Response::Skipped);
        };
        Ok(self
            .apply_once(tab_id, &saved_title)
            .await
            .unwrap_or_else(|e| Response::failed(e.to_string())))
    }

    fn tab_state(&self, address: &str) -> Result<Response, HandlerError> {
        let supported = address_key::is_supported(address);
        let Some(key) = address_key::derive_key(address) else {
            return Ok(Response::TabState(TabState {
                supported,
                key: None,
                saved_title: String::new(),
            }));
        };
        let saved_title = self.rules.get(&key)?.unwrap_or_default();
        Ok(Response::TabState(TabState {
            supported,
            key: Some(key),
            saved_title,
        }))
    }

    async fn apply_once(&self, tab_id: TabId, title: &str) -> Result<Response, HandlerError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(HandlerError::Validation(EMPTY_TITLE));
        }
        self.run_in_page(
            tab_id,
            LockAction::Set {
                title: title.to_string(),
            },
        )
        .await
    }

    async fn restore_tab(&self, tab_id: TabId) -> Result<Response, HandlerError> {
        self.run_in_page(tab_id, LockAction::Clear).await
    }

    async fn run_in_page(
        &self,
        tab_id: TabId,
        action: LockAction,
    ) -> Result<Response, HandlerError> {
        match self.host.run_in_page(tab_id, action).await? {
            Some(LockReply::Title(title)) => Ok(Response::Title { title }),
            Some(LockReply::Rejected(error)) => Err(HandlerError::Page(error)),
            None => Err(HandlerError::Page(NO_PAGE_REPLY.to_string())),
        }
    }

    fn save_rule(&self, address: &str, title: &str) -> Result<Response, HandlerError> {
        let key =
            address_key::derive_key(address).ok_or(HandlerError::Validation(UNSUPPORTED_ADDRESS))?;
        let title = self.rules.set(&key, title)?;
        info!("orchestrator: saved rule for {key}");
        Ok(Response::RuleSaved { key, title })
    }

    fn clear_rule(&self, address: &str) -> Result<Response, HandlerError> {
        let key =
            address_key::derive_key(address).ok_or(HandlerError::Validation(UNSUPPORTED_ADDRESS))?;
        self.rules.delete(&key)?;
        info!("orchestrator: cleared rule for {key}");
        Ok(Response::RuleCleared { key })
    }

    async fn group_state(&self, tab_id: TabId) -> Result<GroupState, HandlerError> {
        let tab = self.host.get_tab(tab_id).await?;
        let Some(group_id) = tab.group_id else {
            return Ok(GroupState::ungrouped());
        };
        let group = self.host.get_group(group_id).await?;
        Ok(GroupState::from_group(&group))
    }

    async fn assign_group(
        &self,
        tab_id: TabId,
        title: &str,
        color: &str,
    ) -> Result<Response, HandlerError> {
        let color = GroupColor::parse(color).ok_or(HandlerError::Validation(INVALID_COLOR))?;
        let tab = self.host.get_tab(tab_id).await?;
        let title = title.trim().to_string();

        let (group_id, created_group) = match tab.group_id {
            Some(group_id) => (group_id, false),
            None => (self.host.group_tab(tab_id).await?, true),
        };
        let update = GroupUpdate {
            title: title.clone(),
            color,
            collapsed: false,
        };
        if let Err(e) = self.host.update_group(group_id, update).await {
            warn!("orchestrator: group {group_id} update failed after grouping tab {tab_id}");
            return Err(e.into());
        }

        Ok(Response::GroupAssigned(GroupAssignment {
            group_id: group_id.0,
            title,
            color,
            created_group,
        }))
    }
}
