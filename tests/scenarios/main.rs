use retitle::VERSION;
use retitle::cli::build_orchestrator;
use retitle::host::TabHost;
use retitle::orchestrator::{RENAME_MENU_ITEM, Request, Response};
use retitle::prefs::Preferences;
use retitle::surface::RenameSurface;
use retitle::title_lock::DEFAULT_REASSERT_INTERVAL;
use serde_json::json;
use tempfile::TempDir;

fn prefs_in(dir: &TempDir) -> Preferences {
    Preferences::default().with_overrides(Some(dir.path().to_path_buf()), None)
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[tokio::test(start_paused = true)]
async fn saved_rule_is_reapplied_after_restart() {
    let dir = TempDir::new().unwrap();
    {
        let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
        let reply = orchestrator
            .handle_json(&json!({
                "type": "save-rule",
                "address": "https://mail.example.com/inbox?page=2",
                "title": "Mail",
            }))
            .await;
        assert_eq!(reply["ok"], true);
    }

    let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
    let tab = orchestrator.host().open_tab("about:blank", "");
    let (change, info) = orchestrator
        .host()
        .navigate(tab, "https://mail.example.com/inbox#unread", "Inbox (4)")
        .unwrap();
    orchestrator.on_tab_updated(tab, &change, &info).await;
    assert_eq!(orchestrator.host().page_title(tab).as_deref(), Some("Mail"));

    orchestrator
        .host()
        .set_page_title(tab, "Inbox (5)")
        .unwrap();
    tokio::time::sleep(DEFAULT_REASSERT_INTERVAL * 2).await;
    assert_eq!(orchestrator.host().page_title(tab).as_deref(), Some("Mail"));
    assert_eq!(orchestrator.host().live_reassertions(tab), Some(1));
}

#[tokio::test(start_paused = true)]
async fn context_menu_rename_targets_the_clicked_tab() {
    let dir = TempDir::new().unwrap();
    let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
    orchestrator.start().await;

    let clicked = orchestrator.host().open_tab("https://docs.example.com/a", "Doc A");
    let info = orchestrator.host().get_tab(clicked).await.unwrap();
    orchestrator
        .on_menu_clicked(RENAME_MENU_ITEM.id, Some(info))
        .await;

    // Focus moves before the surface finishes starting.
    orchestrator.host().open_tab("https://other.example.com/", "Other");

    let mut surface = RenameSurface::open(&orchestrator, None).await;
    assert_eq!(surface.tab().map(|tab| tab.id), Some(clicked));
    surface.set_title_input("Design notes");
    surface.save_rule().await;
    assert_eq!(
        orchestrator.host().page_title(clicked).as_deref(),
        Some("Design notes")
    );

    let second = RenameSurface::open(&orchestrator, None).await;
    assert_ne!(second.tab().map(|tab| tab.id), Some(clicked));
}

#[tokio::test(start_paused = true)]
async fn pending_launch_context_does_not_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
        let tab = orchestrator.host().open_tab("https://a.com/", "A");
        let info = orchestrator.host().get_tab(tab).await.unwrap();
        orchestrator.open_rename_surface(Some(info)).await;
    }
    let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
    assert_eq!(
        orchestrator.dispatch(Request::ConsumeLaunchContext).await,
        Response::LaunchContext { tab_id: None }
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_session_storage_uses_in_memory_handoff() {
    let dir = TempDir::new().unwrap();
    let mut prefs = prefs_in(&dir);
    prefs.session_storage = false;
    let orchestrator = build_orchestrator(&prefs).unwrap();
    let tab = orchestrator.host().open_tab("https://a.com/", "A");
    orchestrator
        .on_menu_clicked(RENAME_MENU_ITEM.id, None)
        .await;

    let reply = orchestrator
        .handle_json(&json!({ "type": "consumeLaunchContext" }))
        .await;
    assert_eq!(reply, json!({ "ok": true, "tabId": tab.0 }));
}

#[tokio::test(start_paused = true)]
async fn title_and_group_applied_together() {
    let dir = TempDir::new().unwrap();
    let orchestrator = build_orchestrator(&prefs_in(&dir)).unwrap();
    let tab = orchestrator.host().open_tab("https://a.com/", "A");

    let reply = orchestrator
        .handle_json(&json!({ "type": "assign-group", "tabId": tab.0, "title": "", "color": "purple" }))
        .await;
    assert_eq!(reply["createdGroup"], true);
    assert_eq!(reply["color"], "purple");
    assert_eq!(reply["title"], "");

    let reply = orchestrator
        .handle_json(&json!({ "type": "assign-group", "tabId": tab.0, "title": "Team", "color": "orange" }))
        .await;
    assert_eq!(reply["createdGroup"], false);

    let reply = orchestrator
        .handle_json(&json!({ "type": "get-group-state", "tabId": tab.0 }))
        .await;
    assert_eq!(
        reply,
        json!({ "ok": true, "inGroup": true, "groupId": 1, "title": "Team", "color": "orange" })
    );
}
