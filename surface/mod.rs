/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Rename surface controller.
//!
//! Headless model of the rename popup. It talks to the [`Orchestrator`] only
//! through [`Request`]s, and exposes the derived view state (control
//! enablement, badges, preview, status line) for a renderer or a test to read.

use log::debug;

use crate::address_key;
use crate::groups::GroupColor;
use crate::host::{TabHost, TabId, TabInfo};
use crate::orchestrator::{Orchestrator, Request, Response};

const GROUP_LABEL_MAX_CHARS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

/// Which controls accept input. `true` means enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub title_input: bool,
    pub apply_once: bool,
    pub save_rule: bool,
    pub restore: bool,
    pub clear_rule: bool,
    pub group_title_input: bool,
    pub group_color: bool,
    pub apply_group: bool,
    pub apply_title_and_group: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preview {
    pub title: String,
    pub group_name: String,
    pub swatch: &'static str,
}

pub struct RenameSurface<'a, H> {
    orchestrator: &'a Orchestrator<H>,
    tab: Option<TabInfo>,
    supported: bool,
    saved_title: String,
    in_group: bool,
    current_group_title: String,
    current_group_color: GroupColor,
    title_input: String,
    group_title_input: String,
    group_color: GroupColor,
    status: Status,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{kept}...")
}

impl<'a, H: TabHost> RenameSurface<'a, H> {
    /// Open the surface for `requested_tab`, or for the tab named by the
    /// launch context, or for the active tab.
    pub async fn open(orchestrator: &'a Orchestrator<H>, requested_tab: Option<i64>) -> Self {
        let mut surface = Self {
            orchestrator,
            tab: None,
            supported: false,
            saved_title: String::new(),
            in_group: false,
            current_group_title: String::new(),
            current_group_color: GroupColor::default(),
            title_input: String::new(),
            group_title_input: String::new(),
            group_color: GroupColor::default(),
            status: Status {
                message: String::new(),
                kind: StatusKind::Info,
            },
        };
        surface.initialize(requested_tab).await;
        surface
    }

    async fn resolve_initial_tab(&self, requested_tab: Option<i64>) -> Option<TabInfo> {
        let host = self.orchestrator.host();
        if let Some(tab_id) = requested_tab.filter(|id| *id > 0) {
            match host.get_tab(TabId(tab_id)).await {
                Ok(tab) => return Some(tab),
                Err(e) => debug!("surface: requested tab {tab_id} unavailable ({e})"),
            }
        }

        if let Response::LaunchContext {
            tab_id: Some(tab_id),
        } = self.send(Request::ConsumeLaunchContext).await
            && tab_id.0 > 0
        {
            match host.get_tab(tab_id).await {
                Ok(tab) => return Some(tab),
                Err(e) => debug!("surface: launch-context tab {tab_id} unavailable ({e})"),
            }
        }

        match host.active_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                debug!("surface: active tab lookup failed ({e})");
                None
            },
        }
    }

    async fn initialize(&mut self, requested_tab: Option<i64>) {
        let Some(tab) = self.resolve_initial_tab(requested_tab).await else {
            self.set_status("No active tab found.", StatusKind::Error);
            return;
        };
        let address = tab.url.clone().unwrap_or_default();
        let tab_title = tab.title.clone().unwrap_or_default();
        let tab_id = tab.id;
        self.tab = Some(tab);

        let mut message = "Enter a title, then apply title and group together.".to_string();
        let mut kind = StatusKind::Info;

        match self.send(Request::GetTabState { address }).await {
            Response::TabState(state) => {
                self.supported = state.supported;
                self.saved_title = state.saved_title;
                self.title_input = if self.saved_title.is_empty() {
                    tab_title
                } else {
                    self.saved_title.clone()
                };
                if !self.saved_title.is_empty() {
                    message = "Loaded saved rename rule for this page path.".to_string();
                }
                if !self.supported {
                    message = "Rename is disabled on this page type, but group controls still work."
                        .to_string();
                    kind = StatusKind::Error;
                }
            },
            other => {
                self.supported = false;
                self.saved_title.clear();
                self.title_input = tab_title;
                message = format!(
                    "Rename controls unavailable: {}",
                    other.error().unwrap_or("unknown error.")
                );
                kind = StatusKind::Error;
            },
        }

        match self.send(Request::GetGroupState { tab_id: tab_id.0 }).await {
            Response::GroupState(state) if state.in_group => {
                self.in_group = true;
                self.current_group_title = state.title;
                self.current_group_color = state.color;
            },
            Response::GroupState(_) => self.reset_group(),
            other => {
                self.reset_group();
                if kind != StatusKind::Error {
                    message = format!(
                        "Group state unavailable: {}",
                        other.error().unwrap_or("unknown error.")
                    );
                    kind = StatusKind::Error;
                }
            },
        }
        self.group_title_input = self.current_group_title.clone();
        self.group_color = self.current_group_color;

        self.set_status(message, kind);
    }

    fn reset_group(&mut self) {
        self.in_group = false;
        self.current_group_title.clear();
        self.current_group_color = GroupColor::default();
    }

    async fn send(&self, request: Request) -> Response {
        self.orchestrator.dispatch(request).await
    }

    fn set_status(&mut self, message: impl Into<String>, kind: StatusKind) {
        self.status = Status {
            message: message.into(),
            kind,
        };
    }

    fn fail(&mut self, response: &Response, fallback: &str) {
        let message = response.error().unwrap_or(fallback).to_string();
        self.set_status(message, StatusKind::Error);
    }

    pub fn tab(&self) -> Option<&TabInfo> {
        self.tab.as_ref()
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn title_input(&self) -> &str {
        &self.title_input
    }

    pub fn group_title_input(&self) -> &str {
        &self.group_title_input
    }

    pub fn group_color(&self) -> GroupColor {
        self.group_color
    }

    pub fn set_title_input(&mut self, value: impl Into<String>) {
        self.title_input = value.into();
    }

    pub fn set_group_title_input(&mut self, value: impl Into<String>) {
        self.group_title_input = value.into();
    }

    pub fn set_group_color(&mut self, color: GroupColor) {
        self.group_color = color;
    }

    pub fn url_label(&self) -> String {
        self.tab
            .as_ref()
            .and_then(|tab| tab.url.clone())
            .unwrap_or_else(|| "(no URL)".to_string())
    }

    pub fn host_label(&self) -> String {
        let address = self.tab.as_ref().and_then(|tab| tab.url.as_deref());
        address_key::host_label(address.unwrap_or_default())
    }

    fn trimmed_title(&self) -> &str {
        self.title_input.trim()
    }

    fn trimmed_group_title(&self) -> &str {
        self.group_title_input.trim()
    }

    pub fn controls(&self) -> Controls {
        let has_tab = self.tab.is_some();
        let has_rename_input = !self.trimmed_title().is_empty();
        let rename = has_tab && self.supported;
        let group = has_tab;
        Controls {
            title_input: rename,
            apply_once: rename && has_rename_input,
            save_rule: rename && has_rename_input,
            restore: rename,
            clear_rule: rename && !self.saved_title.is_empty(),
            group_title_input: group,
            group_color: group,
            apply_group: group,
            apply_title_and_group: group && self.supported && has_rename_input,
        }
    }

    pub fn rule_badge(&self) -> &'static str {
        let draft = self.trimmed_title();
        if !self.supported {
            "Rename locked"
        } else if self.saved_title.is_empty() {
            "Rule: none"
        } else if !draft.is_empty() && draft != self.saved_title {
            "Rule: saved, edited"
        } else {
            "Rule: saved"
        }
    }

    pub fn group_badge(&self) -> String {
        let draft = self.trimmed_group_title();
        if self.in_group && draft != self.current_group_title {
            "Group: edited".to_string()
        } else if self.in_group {
            match self.current_group_title.as_str() {
                "" => "Group: Untitled".to_string(),
                title => format!("Group: {}", truncate(title, GROUP_LABEL_MAX_CHARS)),
            }
        } else if !draft.is_empty() {
            "Group: new".to_string()
        } else {
            "Ungrouped".to_string()
        }
    }

    pub fn preview(&self) -> Preview {
        let title = match self.trimmed_title() {
            "" => "Tab title preview",
            title => title,
        };
        let group_name = [self.trimmed_group_title(), self.current_group_title.as_str()]
            .into_iter()
            .find(|name| !name.is_empty())
            .unwrap_or("Ungrouped");
        Preview {
            title: title.to_string(),
            group_name: group_name.to_string(),
            swatch: self.group_color.hex(),
        }
    }

    /// Enter in the title field.
    pub async fn submit_title(&mut self) {
        let controls = self.controls();
        if controls.apply_title_and_group {
            self.apply_title_and_group().await;
        } else if controls.apply_once {
            self.apply_once().await;
        }
    }

    /// Enter in the group title field.
    pub async fn submit_group_title(&mut self) {
        if self.controls().apply_group {
            self.apply_group().await;
        }
    }

    pub async fn apply_once(&mut self) {
        let title = self.trimmed_title().to_string();
        if title.is_empty() {
            self.set_status("Title cannot be empty.", StatusKind::Error);
            return;
        }
        let Some(tab_id) = self.tab_id() else {
            self.set_status("Failed to apply title.", StatusKind::Error);
            return;
        };

        let response = self.send(Request::ApplyOnce { tab_id, title }).await;
        if response.is_ok() {
            self.set_status("Applied title to the active tab.", StatusKind::Success);
        } else {
            self.fail(&response, "Failed to apply title.");
        }
    }

    /// Save the title as this page's rule, then apply it.
    pub async fn save_rule(&mut self) {
        let title = self.trimmed_title().to_string();
        if title.is_empty() {
            self.set_status("Title cannot be empty.", StatusKind::Error);
            return;
        }
        let Some(tab_id) = self.tab_id() else {
            self.set_status("Failed to save rule.", StatusKind::Error);
            return;
        };

        let saved = self
            .send(Request::SaveRule {
                address: self.address(),
                title: title.clone(),
            })
            .await;
        if !saved.is_ok() {
            self.fail(&saved, "Failed to save rule.");
            return;
        }
        let applied = self
            .send(Request::ApplyOnce {
                tab_id,
                title: title.clone(),
            })
            .await;
        self.saved_title = title;
        match applied.error() {
            None => self.set_status("Saved and applied rule for this page path.", StatusKind::Success),
            Some(error) => {
                let message = format!("Saved rule, but applying title failed: {error}");
                self.set_status(message, StatusKind::Error);
            },
        }
    }

    /// Remove this page's rule. `confirmed` is the user's answer to the
    /// confirmation prompt.
    pub async fn clear_rule(&mut self, confirmed: bool) {
        if self.saved_title.is_empty() {
            self.set_status("No saved rule exists for this page path.", StatusKind::Info);
            return;
        }
        if !confirmed {
            return;
        }

        let response = self
            .send(Request::ClearRule {
                address: self.address(),
            })
            .await;
        if response.is_ok() {
            self.saved_title.clear();
            self.set_status("Cleared saved rename rule.", StatusKind::Success);
        } else {
            self.fail(&response, "Failed to clear rule.");
        }
    }

    pub async fn restore(&mut self) {
        let Some(tab_id) = self.tab_id() else {
            self.set_status("Failed to restore tab title.", StatusKind::Error);
            return;
        };
        let response = self.send(Request::RestoreTab { tab_id }).await;
        if response.is_ok() {
            self.set_status(
                "Restored the active tab to its original title.",
                StatusKind::Success,
            );
        } else {
            self.fail(&response, "Failed to restore tab title.");
        }
    }

    pub async fn apply_group(&mut self) {
        let Some(tab_id) = self.tab_id() else {
            self.set_status("Failed to apply group settings.", StatusKind::Error);
            return;
        };
        let response = self.send(self.assign_group_request(tab_id)).await;
        match response {
            Response::GroupAssigned(assignment) => {
                let created = assignment.created_group;
                self.adopt_group(assignment.title, assignment.color);
                if created {
                    self.set_status("Created tab group and applied color/name.", StatusKind::Success);
                } else {
                    self.set_status("Updated tab group name and color.", StatusKind::Success);
                }
            },
            other => self.fail(&other, "Failed to apply group settings."),
        }
    }

    pub async fn apply_title_and_group(&mut self) {
        let title = self.trimmed_title().to_string();
        if title.is_empty() {
            self.set_status("Title cannot be empty.", StatusKind::Error);
            return;
        }
        let Some(tab_id) = self.tab_id() else {
            self.set_status("Failed to apply title and group settings.", StatusKind::Error);
            return;
        };

        let renamed = self.send(Request::ApplyOnce { tab_id, title }).await;
        if !renamed.is_ok() {
            self.fail(&renamed, "Failed to apply title.");
            return;
        }
        let grouped = self.send(self.assign_group_request(tab_id)).await;
        match grouped {
            Response::GroupAssigned(assignment) => {
                self.adopt_group(assignment.title, assignment.color);
                self.set_status("Applied title and group settings together.", StatusKind::Success);
            },
            other => {
                let message = format!(
                    "Title applied, but group update failed: {}",
                    other.error().unwrap_or("unknown error.")
                );
                self.set_status(message, StatusKind::Error);
            },
        }
    }

    fn tab_id(&self) -> Option<i64> {
        self.tab.as_ref().map(|tab| tab.id.0)
    }

    fn address(&self) -> String {
        self.tab
            .as_ref()
            .and_then(|tab| tab.url.clone())
            .unwrap_or_default()
    }

    fn assign_group_request(&self, tab_id: i64) -> Request {
        Request::AssignGroup {
            tab_id,
            title: self.trimmed_group_title().to_string(),
            color: self.group_color.as_str().to_string(),
        }
    }

    fn adopt_group(&mut self, title: String, color: GroupColor) {
        self.in_group = true;
        self.current_group_title = title;
        self.current_group_color = color;
        self.group_title_input = self.current_group_title.clone();
        self.group_color = color;
    }
}
