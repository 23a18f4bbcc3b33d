/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Group id reported for a tab that belongs to no group.
pub const NO_GROUP: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The host's fixed group palette.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    Grey,
    #[default]
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    pub const ALL: [GroupColor; 9] = [
        GroupColor::Grey,
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
        GroupColor::Orange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
            GroupColor::Orange => "orange",
        }
    }

    /// Swatch used by the rename surface preview.
    pub fn hex(self) -> &'static str {
        match self {
            GroupColor::Grey => "#7e8791",
            GroupColor::Blue => "#4b82ff",
            GroupColor::Red => "#e34b4e",
            GroupColor::Yellow => "#c7a117",
            GroupColor::Green => "#2da56b",
            GroupColor::Pink => "#d75ba7",
            GroupColor::Purple => "#8a63db",
            GroupColor::Cyan => "#1ba8ba",
            GroupColor::Orange => "#e98a37",
        }
    }

    /// Parse user input: surrounding whitespace and case are ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for GroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidGroupColor;

impl fmt::Display for InvalidGroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid group color.")
    }
}

impl std::error::Error for InvalidGroupColor {}

impl FromStr for GroupColor {
    type Err = InvalidGroupColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(InvalidGroupColor)
    }
}

/// A group as the host reports it. Title and colour may be unset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: GroupId,
    pub title: Option<String>,
    pub color: Option<GroupColor>,
    pub collapsed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupUpdate {
    pub title: String,
    pub color: GroupColor,
    pub collapsed: bool,
}

/// `get-group-state` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupState {
    pub in_group: bool,
    pub group_id: i64,
    pub title: String,
    pub color: GroupColor,
}

impl GroupState {
    pub fn ungrouped() -> Self {
        Self {
            in_group: false,
            group_id: NO_GROUP,
            title: String::new(),
            color: GroupColor::default(),
        }
    }

    pub fn from_group(group: &GroupInfo) -> Self {
        Self {
            in_group: true,
            group_id: group.id.0,
            title: group.title.clone().unwrap_or_default(),
            color: group.color.unwrap_or_default(),
        }
    }
}

/// `assign-group` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAssignment {
    pub group_id: i64,
    pub title: String,
    pub color: GroupColor,
    pub created_group: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("purple", GroupColor::Purple)]
    #[case("  Purple ", GroupColor::Purple)]
    #[case("GREY", GroupColor::Grey)]
    #[case("cyan", GroupColor::Cyan)]
    #[case("orange", GroupColor::Orange)]
    fn parses_palette_names(#[case] raw: &str, #[case] expected: GroupColor) {
        assert_eq!(GroupColor::parse(raw), Some(expected));
        assert_eq!(raw.parse::<GroupColor>(), Ok(expected));
    }

    #[rstest]
    #[case("gray")]
    #[case("magenta")]
    #[case("")]
    #[case("#4b82ff")]
    fn rejects_colors_outside_the_palette(#[case] raw: &str) {
        assert_eq!(GroupColor::parse(raw), None);
        assert_eq!(raw.parse::<GroupColor>(), Err(InvalidGroupColor));
    }

    #[test]
    fn names_round_trip_through_parse() {
        for color in GroupColor::ALL {
            assert_eq!(GroupColor::parse(color.as_str()), Some(color));
        }
    }

    #[test]
    fn serializes_as_lowercase_name() {
        assert_eq!(
            serde_json::to_value(GroupColor::Yellow).unwrap(),
            serde_json::json!("yellow")
        );
    }

    #[test]
    fn unset_group_fields_fall_back() {
        let state = GroupState::from_group(&GroupInfo {
            id: GroupId(4),
            title: None,
            color: None,
            collapsed: true,
        });
        assert!(state.in_group);
        assert_eq!(state.group_id, 4);
        assert_eq!(state.title, "");
        assert_eq!(state.color, GroupColor::Blue);
    }

    #[test]
    fn ungrouped_state_uses_sentinel_id() {
        let state = GroupState::ungrouped();
        assert!(!state.in_group);
        assert_eq!(state.group_id, NO_GROUP);
    }
}
