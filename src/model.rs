//! Nursery records as they are stored: domes and the trees planted in them.

use crate::core::{EntityId, NamespaceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a tree in propagation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantType {
    #[default]
    Mother,
    Cutting,
}

impl PlantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mother => "mother",
            Self::Cutting => "cutting",
        }
    }

    /// Parse a stored value. Unknown or missing values read as `Mother`,
    /// the column default.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("cutting") => Self::Cutting,
            _ => Self::Mother,
        }
    }
}

impl fmt::Display for PlantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age bracket derived from `life_days`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LifeStage {
    Seedling,
    Young,
    Mature,
    Adult,
    Ancient,
}

impl LifeStage {
    pub fn from_life_days(days: i64) -> Self {
        match days {
            d if d < 7 => Self::Seedling,
            d if d < 30 => Self::Young,
            d if d < 90 => Self::Mature,
            d if d < 365 => Self::Adult,
            _ => Self::Ancient,
        }
    }

    /// Display colour used by the grid views
    pub fn color(&self) -> &'static str {
        match self {
            Self::Seedling => "#90EE90",
            Self::Young => "#32CD32",
            Self::Mature => "#228B22",
            Self::Adult => "#006400",
            Self::Ancient => "#8B4513",
        }
    }
}

impl fmt::Display for LifeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Seedling => "Seedling",
            Self::Young => "Young",
            Self::Mature => "Mature",
            Self::Adult => "Adult",
            Self::Ancient => "Ancient",
        };
        f.write_str(name)
    }
}

/// A dome: the grid a tree is planted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dome {
    pub id: NamespaceId,
    pub name: String,
    pub internal_rows: i64,
    pub internal_cols: i64,
    pub farm_id: Option<i64>,
}

/// A stored tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub id: EntityId,
    pub dome_id: NamespaceId,
    pub name: String,
    pub breed: Option<String>,
    pub info: Option<String>,
    pub internal_row: i64,
    pub internal_col: i64,
    /// Legacy rows may hold NULL here
    pub life_days: Option<i64>,
    pub plant_type: PlantType,
    pub mother_plant_id: Option<EntityId>,
    /// Raw JSON written by the remapper
    pub paste_metadata: Option<String>,
}

impl Tree {
    pub fn life_stage(&self) -> LifeStage {
        LifeStage::from_life_days(self.life_days.unwrap_or(0))
    }

    pub fn is_cutting(&self) -> bool {
        self.plant_type == PlantType::Cutting
    }

    /// Draft of a copy of this tree at another position, without a parent
    ///
    /// A NULL counter is copied as 0.
    pub fn draft_copy(&self, dome_id: NamespaceId, row: i64, col: i64) -> NewTree {
        NewTree {
            dome_id,
            name: self.name.clone(),
            breed: self.breed.clone(),
            info: self.info.clone(),
            internal_row: row,
            internal_col: col,
            life_days: Some(self.life_days.unwrap_or(0)),
            plant_type: self.plant_type,
            mother_plant_id: None,
        }
    }
}

/// A tree that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTree {
    pub dome_id: NamespaceId,
    pub name: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    pub internal_row: i64,
    pub internal_col: i64,
    #[serde(default)]
    pub life_days: Option<i64>,
    #[serde(default)]
    pub plant_type: PlantType,
    #[serde(default)]
    pub mother_plant_id: Option<EntityId>,
}

impl NewTree {
    pub fn new(dome_id: NamespaceId, name: impl Into<String>, row: i64, col: i64) -> Self {
        Self {
            dome_id,
            name: name.into(),
            breed: None,
            info: None,
            internal_row: row,
            internal_col: col,
            life_days: Some(0),
            plant_type: PlantType::Mother,
            mother_plant_id: None,
        }
    }

    pub fn breed(mut self, breed: impl Into<String>) -> Self {
        self.breed = Some(breed.into());
        self
    }

    pub fn life_days(mut self, days: Option<i64>) -> Self {
        self.life_days = days;
        self
    }

    /// Mark as a cutting taken from `mother`
    pub fn cutting_of(mut self, mother: EntityId) -> Self {
        self.plant_type = PlantType::Cutting;
        self.mother_plant_id = Some(mother);
        self
    }
}
