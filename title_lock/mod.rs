/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A per-page title override that keeps reasserting itself.
//!
//! Pages reset their own title asynchronously (in-page navigation, analytics
//! callbacks), so a one-shot write does not stick. While a page is
//! [`LockState::Locked`] a single repeating task rewrites the title whenever it
//! drifts from the session's current custom title.
//!
//! One engine exists per page context and is owned by whoever owns that page.
//! Dropping the engine (page unload or navigation) cancels its reassertion task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REASSERT_INTERVAL: Duration = Duration::from_millis(500);

/// The displayed title of one page.
pub trait DocumentTitle: Send + Sync + 'static {
    fn title(&self) -> String;
    fn set_title(&self, title: &str);
}

/// Instruction carried into a page context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum LockAction {
    Set { title: String },
    Clear,
}

/// Reply produced inside the page context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockReply {
    /// The displayed title after the action.
    Title(String),
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
}

/// Cancels its reassertion task when dropped, so a session can never orphan a
/// running loop.
#[derive(Debug)]
struct ReassertHandle {
    cancel: CancellationToken,
}

impl Drop for ReassertHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
struct LockSession {
    original_title: String,
    custom_title: Arc<Mutex<String>>,
    reassert: ReassertHandle,
}

/// Decrements the live-loop count when a reassertion task ends.
struct LiveLoopGuard(Arc<AtomicUsize>);

impl Drop for LiveLoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TitleLockEngine {
    document: Arc<dyn DocumentTitle>,
    interval: Duration,
    session: Option<LockSession>,
    live_loops: Arc<AtomicUsize>,
}

impl TitleLockEngine {
    pub fn new(document: Arc<dyn DocumentTitle>, interval: Duration) -> Self {
        Self {
            document,
            interval,
            session: None,
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> LockState {
        match self.session {
            Some(_) => LockState::Locked,
            None => LockState::Unlocked,
        }
    }

    /// Title captured before the first override of the current session.
    pub fn original_title(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.original_title.as_str())
    }

    /// Reassertion tasks that have been started and have not yet exited.
    pub fn live_reassertions(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    pub fn run(&mut self, action: &LockAction) -> LockReply {
        match action {
            LockAction::Set { title } => match self.apply(title) {
                Ok(title) => LockReply::Title(title),
                Err(error) => LockReply::Rejected(error),
            },
            LockAction::Clear => LockReply::Title(self.clear()),
        }
    }

    /// Lock the page to `custom_title`. Must be called inside a tokio runtime
    /// the first time a session starts.
    pub fn apply(&mut self, custom_title: &str) -> Result<String, String> {
        let custom_title = custom_title.trim();
        if custom_title.is_empty() {
            return Err("Title cannot be empty.".to_string());
        }

        match &self.session {
            Some(session) => {
                *session.custom_title.lock() = custom_title.to_string();
            },
            None => {
                let original_title = self.document.title();
                let shared_title = Arc::new(Mutex::new(custom_title.to_string()));
                let reassert = self.start_reassertion(Arc::clone(&shared_title));
                self.session = Some(LockSession {
                    original_title,
                    custom_title: shared_title,
                    reassert,
                });
            },
        }

        reassert_title(self.document.as_ref(), custom_title);
        Ok(custom_title.to_string())
    }

    /// Stop reasserting and put back the title recorded when the session
    /// started. Returns the displayed title afterwards.
    pub fn clear(&mut self) -> String {
        if let Some(session) = self.session.take() {
            let LockSession {
                original_title,
                reassert,
                ..
            } = session;
            drop(reassert);
            if !original_title.is_empty() {
                self.document.set_title(&original_title);
            }
        }
        self.document.title()
    }

    fn start_reassertion(&self, custom_title: Arc<Mutex<String>>) -> ReassertHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let document = Arc::clone(&self.document);
        let interval = self.interval;
        self.live_loops.fetch_add(1, Ordering::SeqCst);
        let guard = LiveLoopGuard(Arc::clone(&self.live_loops));

        tokio::spawn(async move {
            let _guard = guard;
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("title_lock: reassertion cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let wanted = custom_title.lock().clone();
                        reassert_title(document.as_ref(), &wanted);
                    }
                }
            }
        });

        ReassertHandle { cancel }
    }
}

fn reassert_title(document: &dyn DocumentTitle, wanted: &str) {
    if document.title() != wanted {
        document.set_title(wanted);
    }
}

/// A plain in-memory page title.
#[derive(Debug, Default)]
pub struct PageDocument {
    title: Mutex<String>,
    writes: AtomicUsize,
}

impl PageDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Mutex::new(title.into()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set_title` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DocumentTitle for PageDocument {
    fn title(&self) -> String {
        self.title.lock().clone()
    }

    fn set_title(&self, title: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.title.lock() = title.to_string();
    }
}
