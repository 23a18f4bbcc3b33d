/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab retitling core.
//!
//! Locks a tab's displayed title against the page's own resets, remembers
//! per-page rename rules and reapplies them on navigation, hands the
//! triggering tab to a lazily opened rename surface, and assigns tabs to
//! coloured groups. The browser itself sits behind [`host::TabHost`].

use tracing_subscriber::EnvFilter;

pub mod address_key;
pub mod cli;
pub mod groups;
pub mod headless;
pub mod host;
pub mod launch_context;
pub mod orchestrator;
pub mod persistence;
pub mod prefs;
pub mod rules;
pub mod surface;
pub mod title_lock;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_FILTER: &str = "warn";

/// Install the stderr log subscriber. `filter` wins over `RUST_LOG`.
pub fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = installed {
        eprintln!("retitle: logging not initialised: {e}");
    }
}
