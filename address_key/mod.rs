/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Page identity for saved rename rules.
//!
//! A key is `scheme://host[:port]/path`: query and fragment are dropped so every
//! variant of a page collapses to the same rule. Only `http` and `https`
//! addresses get a key; internal and privileged pages never acquire one.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// Canonical rule-store identity of a page address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressKey(String);

impl AddressKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_supported(raw_address: &str) -> Option<Url> {
    let url = Url::parse(raw_address).ok()?;
    SUPPORTED_SCHEMES
        .contains(&url.scheme())
        .then_some(url)
}

/// Derive the rule key for `raw_address`, or `None` for malformed or
/// non-web addresses.
pub fn derive_key(raw_address: &str) -> Option<AddressKey> {
    let url = parse_supported(raw_address)?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(AddressKey(format!(
        "{}{}",
        origin.ascii_serialization(),
        url.path()
    )))
}

/// Whether the page at `raw_address` may be renamed at all.
pub fn is_supported(raw_address: &str) -> bool {
    parse_supported(raw_address).is_some()
}

/// Short label for a page: its hostname without a leading `www.`.
pub fn host_label(raw_address: &str) -> String {
    let Some(host) = Url::parse(raw_address)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
    else {
        return "Current page".to_string();
    };
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => host[4..].to_string(),
        _ => host,
    }
}
