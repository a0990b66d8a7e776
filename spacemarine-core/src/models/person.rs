use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::pagination::{PageParams, SortDirection};
use super::{Coordinates, Location};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Color {
    Green,
    Red,
    Black,
    White,
    Brown,
}

impl Color {
    pub const ALL: [Self; 5] = [Self::Green, Self::Red, Self::Black, Self::White, Self::Brown];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Red => "RED",
            Self::Black => "BLACK",
            Self::White => "WHITE",
            Self::Brown => "BROWN",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown color: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Country {
    UnitedKingdom,
    Germany,
    France,
    India,
    Vatican,
    NorthKorea,
}

impl Country {
    pub const ALL: [Self; 6] = [
        Self::UnitedKingdom,
        Self::Germany,
        Self::France,
        Self::India,
        Self::Vatican,
        Self::NorthKorea,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnitedKingdom => "UNITED_KINGDOM",
            Self::Germany => "GERMANY",
            Self::France => "FRANCE",
            Self::India => "INDIA",
            Self::Vatican => "VATICAN",
            Self::NorthKorea => "NORTH_KOREA",
        }
    }
}

impl FromStr for Country {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown country: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub coordinates: Coordinates,
    pub creation_date: DateTime<Utc>,
    pub eye_color: Option<Color>,
    pub hair_color: Color,
    pub location: Location,
    pub height: f32,
    pub birthday: DateTime<Utc>,
    pub nationality: Country,
}

/// Create/update payload. `id` only matters for updates, where it must
/// match the path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInput {
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub coordinates: Coordinates,
    pub eye_color: Option<Color>,
    pub hair_color: Color,
    pub location: Location,
    pub height: f32,
    pub birthday: DateTime<Utc>,
    pub nationality: Country,
}

/// Validated person ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NewPerson {
    pub name: String,
    pub coordinates: Coordinates,
    pub eye_color: Option<Color>,
    pub hair_color: Color,
    pub location: Location,
    pub height: f32,
    pub birthday: DateTime<Utc>,
    pub nationality: Country,
}

/// Person listing request with whitelisted sort and filter columns
#[derive(Debug, Clone)]
pub struct PersonListQuery {
    pub params: PageParams,
    sort_column: Option<&'static str>,
    pub direction: SortDirection,
    filter: Option<(&'static str, String)>,
}

impl PersonListQuery {
    /// API field name -> SQL expression
    const SORT_FIELDS: [(&'static str, &'static str); 8] = [
        ("id", "p.id"),
        ("name", "p.name"),
        ("creationDate", "p.creation_date"),
        ("eyeColor", "p.eye_color"),
        ("hairColor", "p.hair_color"),
        ("height", "p.height"),
        ("birthday", "p.birthday"),
        ("nationality", "p.nationality"),
    ];

    /// Text columns that accept an exact-match filter
    const FILTER_FIELDS: [(&'static str, &'static str); 5] = [
        ("name", "p.name"),
        ("eyeColor", "p.eye_color"),
        ("hairColor", "p.hair_color"),
        ("nationality", "p.nationality"),
        ("locationName", "l.name"),
    ];

    pub fn new(
        params: PageParams,
        sort: Option<&str>,
        ascending: bool,
        filter_column: Option<&str>,
        filter_value: Option<String>,
    ) -> Result<Self> {
        let sort_column = match sort.map(str::trim).filter(|s| !s.is_empty()) {
            Some(field) => Some(Self::lookup(&Self::SORT_FIELDS, field).ok_or_else(|| {
                Error::InvalidInput(format!("Cannot sort by field: {field}"))
            })?),
            None => None,
        };

        let filter = match (filter_column.map(str::trim).filter(|s| !s.is_empty()), filter_value) {
            (Some(field), Some(value)) => {
                let column = Self::lookup(&Self::FILTER_FIELDS, field).ok_or_else(|| {
                    Error::InvalidInput(format!("Cannot filter by field: {field}"))
                })?;
                Some((column, value))
            }
            _ => None,
        };

        Ok(Self {
            params,
            sort_column,
            direction: if ascending {
                SortDirection::Asc
            } else {
                SortDirection::Desc
            },
            filter,
        })
    }

    fn lookup(fields: &[(&'static str, &'static str)], name: &str) -> Option<&'static str> {
        fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|&(_, column)| column)
    }

    /// SQL expression to order by; defaults to the id
    #[must_use]
    pub fn sort_column(&self) -> &'static str {
        self.sort_column.unwrap_or("p.id")
    }

    #[must_use]
    pub fn filter(&self) -> Option<(&'static str, &str)> {
        self.filter
            .as_ref()
            .map(|(column, value)| (*column, value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!("BROWN".parse::<Color>().unwrap(), Color::Brown);
        assert!("PURPLE".parse::<Color>().is_err());
        assert_eq!(
            serde_json::to_value(Country::NorthKorea).unwrap(),
            serde_json::json!("NORTH_KOREA")
        );
        assert_eq!("VATICAN".parse::<Country>().unwrap(), Country::Vatican);
    }

    #[test]
    fn test_list_query_whitelists() {
        let query = PersonListQuery::new(
            PageParams::default(),
            Some("birthday"),
            false,
            Some("hairColor"),
            Some("RED".to_string()),
        )
        .unwrap();
        assert_eq!(query.sort_column(), "p.birthday");
        assert_eq!(query.direction, SortDirection::Desc);
        assert_eq!(query.filter(), Some(("p.hair_color", "RED")));

        assert!(PersonListQuery::new(PageParams::default(), Some("1;--"), true, None, None).is_err());
        assert!(PersonListQuery::new(
            PageParams::default(),
            None,
            true,
            Some("height"),
            Some("3".to_string())
        )
        .is_err());
    }

    #[test]
    fn test_list_query_defaults() {
        let query = PersonListQuery::new(PageParams::default(), None, true, Some("name"), None).unwrap();
        assert_eq!(query.sort_column(), "p.id");
        assert_eq!(query.filter(), None);
    }

    #[test]
    fn test_person_input_parses_offset_birthday() {
        let input: PersonInput = serde_json::from_value(serde_json::json!({
            "name": "Sarah",
            "coordinates": {"x": 1, "y": 2},
            "hairColor": "BLACK",
            "location": {"x": 1.0, "y": 2, "z": 3, "name": "Home"},
            "height": 170.0,
            "birthday": "1990-05-01T03:00:00+03:00",
            "nationality": "FRANCE"
        }))
        .unwrap();
        assert_eq!(input.birthday.to_rfc3339(), "1990-05-01T00:00:00+00:00");
        assert_eq!(input.eye_color, None);
    }
}
