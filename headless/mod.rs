/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! In-process browser host.
//!
//! Each tab owns a [`PageDocument`] and the [`TitleLockEngine`] of its current
//! page. Navigating replaces both, which cancels any running reassertion the
//! way a real page unload would. Script injection refuses the same pages the
//! browser refuses, with the browser's own error text.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use url::Url;

use crate::groups::{GroupId, GroupInfo, GroupUpdate};
use crate::host::{
    HostError, LoadStatus, MenuItem, TabChange, TabHost, TabId, TabInfo, WindowId,
};
use crate::title_lock::{DocumentTitle, LockAction, LockReply, PageDocument, TitleLockEngine};

struct HeadlessTab {
    window_id: WindowId,
    url: String,
    page: Arc<PageDocument>,
    engine: TitleLockEngine,
    group_id: Option<GroupId>,
}

impl HeadlessTab {
    fn info(&self, id: TabId) -> TabInfo {
        TabInfo {
            id,
            window_id: self.window_id,
            url: Some(self.url.clone()).filter(|url| !url.is_empty()),
            title: Some(self.page.title()),
            group_id: self.group_id,
        }
    }
}

struct BrowserState {
    tabs: BTreeMap<TabId, HeadlessTab>,
    groups: BTreeMap<GroupId, GroupInfo>,
    active: BTreeMap<WindowId, TabId>,
    current_window: WindowId,
    next_tab: i64,
    next_group: i64,
    next_window: i64,
    menu_items: Vec<MenuItem>,
    surface_opens: Vec<Option<WindowId>>,
}

pub struct HeadlessBrowser {
    reassert_interval: Duration,
    state: Mutex<BrowserState>,
}

impl HeadlessBrowser {
    pub fn new(reassert_interval: Duration) -> Self {
        Self {
            reassert_interval,
            state: Mutex::new(BrowserState {
                tabs: BTreeMap::new(),
                groups: BTreeMap::new(),
                active: BTreeMap::new(),
                current_window: WindowId(1),
                next_tab: 1,
                next_group: 1,
                next_window: 2,
                menu_items: Vec::new(),
                surface_opens: Vec::new(),
            }),
        }
    }

    fn new_page(&self, title: &str) -> (Arc<PageDocument>, TitleLockEngine) {
        let page = Arc::new(PageDocument::new(title));
        let engine = TitleLockEngine::new(page.clone(), self.reassert_interval);
        (page, engine)
    }

    /// Open a window and make it current.
    pub fn open_window(&self) -> WindowId {
        let mut state = self.state.lock();
        let window_id = WindowId(state.next_window);
        state.next_window += 1;
        state.current_window = window_id;
        window_id
    }

    /// Open a tab in the current window and activate it.
    pub fn open_tab(&self, url: &str, title: &str) -> TabId {
        let (page, engine) = self.new_page(title);
        let mut state = self.state.lock();
        let id = TabId(state.next_tab);
        state.next_tab += 1;
        let window_id = state.current_window;
        state.tabs.insert(
            id,
            HeadlessTab {
                window_id,
                url: url.to_string(),
                page,
                engine,
                group_id: None,
            },
        );
        state.active.insert(window_id, id);
        debug!("headless: opened tab {id} at {url}");
        id
    }

    /// Load a new page in `tab_id`. Returns the completed-load update the host
    /// would report.
    pub fn navigate(
        &self,
        tab_id: TabId,
        url: &str,
        title: &str,
    ) -> Result<(TabChange, TabInfo), HostError> {
        let (page, engine) = self.new_page(title);
        let mut state = self.state.lock();
        let tab = state.tabs.get_mut(&tab_id).ok_or_else(|| no_tab(tab_id))?;
        tab.url = url.to_string();
        tab.page = page;
        tab.engine = engine;
        let change = TabChange {
            status: Some(LoadStatus::Complete),
            url: Some(url.to_string()),
            title: None,
        };
        Ok((change, tab.info(tab_id)))
    }

    /// Change the title from the page's own side, as page scripts do.
    pub fn set_page_title(&self, tab_id: TabId, title: &str) -> Result<(), HostError> {
        let state = self.state.lock();
        let tab = state.tabs.get(&tab_id).ok_or_else(|| no_tab(tab_id))?;
        tab.page.set_title(title);
        Ok(())
    }

    pub fn page_title(&self, tab_id: TabId) -> Option<String> {
        self.state.lock().tabs.get(&tab_id).map(|tab| tab.page.title())
    }

    pub fn live_reassertions(&self, tab_id: TabId) -> Option<usize> {
        self.state
            .lock()
            .tabs
            .get(&tab_id)
            .map(|tab| tab.engine.live_reassertions())
    }

    pub fn activate(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let window_id = state
            .tabs
            .get(&tab_id)
            .map(|tab| tab.window_id)
            .ok_or_else(|| no_tab(tab_id))?;
        state.active.insert(window_id, tab_id);
        state.current_window = window_id;
        Ok(())
    }

    pub fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let tab = state.tabs.remove(&tab_id).ok_or_else(|| no_tab(tab_id))?;
        if state.active.get(&tab.window_id) == Some(&tab_id) {
            state.active.remove(&tab.window_id);
        }
        debug!("headless: closed tab {tab_id}");
        Ok(())
    }

    pub fn menu_items(&self) -> Vec<MenuItem> {
        self.state.lock().menu_items.clone()
    }

    /// Windows the rename surface was opened in, in order. `None` is the
    /// current window.
    pub fn surface_opens(&self) -> Vec<Option<WindowId>> {
        self.state.lock().surface_opens.clone()
    }
}

fn no_tab(tab_id: TabId) -> HostError {
    HostError::new(format!("No tab with id: {tab_id}."))
}

fn check_scriptable(url: &str) -> Result<(), HostError> {
    let parsed = Url::parse(url).ok();
    let web = parsed
        .as_ref()
        .filter(|parsed| matches!(parsed.scheme(), "http" | "https"));
    let Some(parsed) = web else {
        return Err(HostError::new("Cannot access a chrome:// URL"));
    };
    let gallery = match parsed.host_str() {
        Some("chromewebstore.google.com") => true,
        Some("chrome.google.com") => parsed.path().starts_with("/webstore"),
        _ => false,
    };
    if gallery {
        return Err(HostError::new("The extensions gallery cannot be scripted."));
    }
    Ok(())
}

impl TabHost for HeadlessBrowser {
    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        let state = self.state.lock();
        state
            .tabs
            .get(&tab_id)
            .map(|tab| tab.info(tab_id))
            .ok_or_else(|| no_tab(tab_id))
    }

    async fn active_tab(&self) -> Result<Option<TabInfo>, HostError> {
        let state = self.state.lock();
        let active = state
            .active
            .get(&state.current_window)
            .and_then(|id| state.tabs.get(id).map(|tab| tab.info(*id)));
        Ok(active)
    }

    async fn run_in_page(
        &self,
        tab_id: TabId,
        action: LockAction,
    ) -> Result<Option<LockReply>, HostError> {
        let mut state = self.state.lock();
        let tab = state.tabs.get_mut(&tab_id).ok_or_else(|| no_tab(tab_id))?;
        check_scriptable(&tab.url)?;
        Ok(Some(tab.engine.run(&action)))
    }

    async fn group_tab(&self, tab_id: TabId) -> Result<GroupId, HostError> {
        let mut state = self.state.lock();
        let group_id = GroupId(state.next_group);
        let tab = state.tabs.get_mut(&tab_id).ok_or_else(|| no_tab(tab_id))?;
        tab.group_id = Some(group_id);
        state.next_group += 1;
        state.groups.insert(
            group_id,
            GroupInfo {
                id: group_id,
                title: None,
                color: None,
                collapsed: false,
            },
        );
        Ok(group_id)
    }

    async fn get_group(&self, group_id: GroupId) -> Result<GroupInfo, HostError> {
        self.state
            .lock()
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| HostError::new(format!("No group with id: {group_id}.")))
    }

    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| HostError::new(format!("No group with id: {group_id}.")))?;
        group.title = Some(update.title);
        group.color = Some(update.color);
        group.collapsed = update.collapsed;
        Ok(())
    }

    async fn install_menu_item(&self, item: MenuItem) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.menu_items.clear();
        state.menu_items.push(item);
        Ok(())
    }

    async fn open_surface(&self, window_id: Option<WindowId>) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if let Some(window_id) = window_id
            && !state.tabs.values().any(|tab| tab.window_id == window_id)
        {
            return Err(HostError::new(format!("No window with id: {}.", window_id.0)));
        }
        state.surface_opens.push(window_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::describe_host_error;
    use crate::title_lock::DEFAULT_REASSERT_INTERVAL;
    use rstest::rstest;

    #[rstest]
    #[case("https://example.com/", true)]
    #[case("http://example.com/a", true)]
    #[case("https://chrome.google.com/search", true)]
    #[case("chrome://extensions", false)]
    #[case("about:blank", false)]
    #[case("https://chromewebstore.google.com/detail/abc", false)]
    #[case("https://chrome.google.com/webstore/detail/abc", false)]
    fn scriptable_pages(#[case] url: &str, #[case] scriptable: bool) {
        assert_eq!(check_scriptable(url).is_ok(), scriptable);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_discards_the_page_lock() {
        let browser = HeadlessBrowser::new(DEFAULT_REASSERT_INTERVAL);
        let tab = browser.open_tab("https://a.com/", "A");
        let reply = browser
            .run_in_page(
                tab,
                LockAction::Set {
                    title: "Locked".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply, Some(LockReply::Title("Locked".to_string())));
        assert_eq!(browser.live_reassertions(tab), Some(1));

        browser.navigate(tab, "https://a.com/next", "Next").unwrap();
        assert_eq!(browser.live_reassertions(tab), Some(0));
        tokio::time::sleep(DEFAULT_REASSERT_INTERVAL * 3).await;
        assert_eq!(browser.page_title(tab).as_deref(), Some("Next"));
    }

    #[tokio::test(start_paused = true)]
    async fn locked_title_survives_page_resets() {
        let browser = HeadlessBrowser::new(DEFAULT_REASSERT_INTERVAL);
        let tab = browser.open_tab("https://a.com/", "A");
        browser
            .run_in_page(
                tab,
                LockAction::Set {
                    title: "Mine".to_string(),
                },
            )
            .await
            .unwrap();
        browser.set_page_title(tab, "(1) New message").unwrap();
        tokio::time::sleep(DEFAULT_REASSERT_INTERVAL + Duration::from_millis(5)).await;
        assert_eq!(browser.page_title(tab).as_deref(), Some("Mine"));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_tabs_report_the_browser_error() {
        let browser = HeadlessBrowser::new(DEFAULT_REASSERT_INTERVAL);
        let tab = browser.open_tab("https://a.com/", "A");
        browser.close_tab(tab).unwrap();
        let error = browser.get_tab(tab).await.unwrap_err();
        assert_eq!(describe_host_error(&error), "That tab is no longer available.");
        assert_eq!(browser.active_tab().await.unwrap(), None);
    }

    #[tokio::test]
    async fn active_tab_follows_the_current_window() {
        let browser = HeadlessBrowser::new(DEFAULT_REASSERT_INTERVAL);
        let first = browser.open_tab("https://a.com/", "A");
        let window = browser.open_window();
        let second = browser.open_tab("https://b.com/", "B");

        let active = browser.active_tab().await.unwrap().unwrap();
        assert_eq!(active.id, second);
        assert_eq!(active.window_id, window);

        browser.activate(first).unwrap();
        let active = browser.active_tab().await.unwrap().unwrap();
        assert_eq!(active.id, first);
        assert_eq!(active.window_id, WindowId(1));
    }

    #[tokio::test]
    async fn surface_needs_an_existing_window() {
        let browser = HeadlessBrowser::new(DEFAULT_REASSERT_INTERVAL);
        browser.open_tab("https://a.com/", "A");
        assert!(browser.open_surface(Some(WindowId(1))).await.is_ok());
        assert!(browser.open_surface(None).await.is_ok());
        assert!(browser.open_surface(Some(WindowId(9))).await.is_err());
        assert_eq!(browser.surface_opens(), vec![Some(WindowId(1)), None]);
    }
}
