use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::pagination::{PageParams, SortDirection};
use super::Coordinates;
use crate::{Error, Result};

/// Weapon kinds, declared in ordinal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weapon {
    HeavyBoltgun,
    BoltPistol,
    PlasmaGun,
    HeavyFlamer,
}

impl Weapon {
    pub const ALL: [Self; 4] = [
        Self::HeavyBoltgun,
        Self::BoltPistol,
        Self::PlasmaGun,
        Self::HeavyFlamer,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HeavyBoltgun => "HEAVY_BOLTGUN",
            Self::BoltPistol => "BOLT_PISTOL",
            Self::PlasmaGun => "PLASMA_GUN",
            Self::HeavyFlamer => "HEAVY_FLAMER",
        }
    }

    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Weapons ordered strictly before `self`
    #[must_use]
    pub fn lesser(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|w| w.ordinal() < self.ordinal())
            .collect()
    }
}

impl fmt::Display for Weapon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weapon {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown weapon: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceMarine {
    pub id: i64,
    pub name: String,
    pub coordinates: Coordinates,
    pub creation_date: DateTime<Utc>,
    pub chapter_id: i64,
    pub health: i64,
    pub achievements: Option<String>,
    pub height: f64,
    pub weapon_type: Option<Weapon>,
}

/// Create/update payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarineInput {
    #[serde(default)]
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub chapter_id: Option<i64>,
    pub health: Option<i64>,
    pub achievements: Option<String>,
    #[serde(default)]
    pub height: f64,
    pub weapon_type: Option<Weapon>,
}

/// Validated marine ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NewMarine {
    pub name: String,
    pub coordinates: Coordinates,
    pub chapter_id: i64,
    pub health: i64,
    pub achievements: Option<String>,
    pub height: f64,
    pub weapon_type: Option<Weapon>,
}

/// Row of the group-by-achievements report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementGroup {
    pub achievements: Option<String>,
    pub cnt: i64,
}

/// Sortable marine field and direction, parsed from `field[,desc]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarineSort {
    column: &'static str,
    pub direction: SortDirection,
}

impl MarineSort {
    /// Whitelisted API field names and the columns they sort on
    const FIELDS: [(&'static str, &'static str); 10] = [
        ("id", "id"),
        ("name", "name"),
        ("creationDate", "creation_date"),
        ("health", "health"),
        ("achievements", "achievements"),
        ("height", "height"),
        ("weaponType", "weapon_type"),
        ("chapterId", "chapter_id"),
        ("coordinates.x", "coord_x"),
        ("coordinates.y", "coord_y"),
    ];

    /// Parse `sortBy`. Blank means by id ascending; unknown fields are rejected.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let (field, direction) = match raw.split_once(',') {
            Some((field, dir)) => {
                let direction = match dir.trim().to_ascii_lowercase().as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => {
                        return Err(Error::InvalidInput(format!(
                            "Unknown sort direction: {other}"
                        )))
                    }
                };
                (field.trim(), direction)
            }
            None => (raw, SortDirection::Asc),
        };

        Self::FIELDS
            .iter()
            .find(|(name, _)| *name == field)
            .map(|&(_, column)| Self { column, direction })
            .ok_or_else(|| Error::InvalidInput(format!("Cannot sort by field: {field}")))
    }

    #[must_use]
    pub const fn column(&self) -> &'static str {
        self.column
    }
}

impl Default for MarineSort {
    fn default() -> Self {
        Self {
            column: "id",
            direction: SortDirection::Asc,
        }
    }
}

/// Exact-match filter of the marine listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarineFilter {
    None,
    Name(String),
    Achievements(String),
}

#[derive(Debug, Clone)]
pub struct MarineListQuery {
    pub params: PageParams,
    pub sort: MarineSort,
    pub name: Option<String>,
    pub achievements: Option<String>,
}

impl MarineListQuery {
    /// Active filter. A name filter wins over an achievements filter.
    #[must_use]
    pub fn filter(&self) -> MarineFilter {
        let non_blank = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        if let Some(name) = non_blank(&self.name) {
            MarineFilter::Name(name)
        } else if let Some(achievements) = non_blank(&self.achievements) {
            MarineFilter::Achievements(achievements)
        } else {
            MarineFilter::None
        }
    }
}
