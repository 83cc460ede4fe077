use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::validation::{self, FieldErrors, REQUIRED};

pub const NAME_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 10_000;

/// The two kinds of global lookup data. Both share one row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    FarmType,
    Crop,
}

impl ReferenceKind {
    /// Returns the table backing this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ReferenceKind::FarmType => "farm_types",
            ReferenceKind::Crop => "crops",
        }
    }

    /// Returns the column on `farmer_data` that points at this kind.
    pub fn farmer_data_column(&self) -> &'static str {
        match self {
            ReferenceKind::FarmType => "farm_type",
            ReferenceKind::Crop => "crop",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::FarmType => write!(f, "farm type"),
            ReferenceKind::Crop => write!(f, "crop"),
        }
    }
}

/// A farm type or crop.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferenceItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Cleared when the creating user is removed.
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub type FarmType = ReferenceItem;
pub type Crop = ReferenceItem;

/// Writable fields of a reference item. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ReferencePatch {
    /// Reads the writable fields. `created_by`, `created_at` and `id` are ignored.
    pub fn from_json(obj: &Map<String, Value>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = validation::text(obj, "name", NAME_MAX_LEN, false, &mut errors)
            .non_null("name", &mut errors);
        let description =
            validation::text(obj, "description", DESCRIPTION_MAX_LEN, true, &mut errors)
                .non_null("description", &mut errors);

        errors.into_result(Self { name, description })
    }

    /// Turns the patch into a full create/replace payload.
    pub fn into_input(self) -> Result<ReferenceInput, FieldErrors> {
        match self.name {
            Some(name) => Ok(ReferenceInput {
                name,
                description: self.description.unwrap_or_default(),
            }),
            None => Err(FieldErrors::single("name", REQUIRED)),
        }
    }

    pub fn apply(&self, item: &mut ReferenceItem) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
    }
}

/// A complete, validated reference item payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceInput {
    pub name: String,
    pub description: String,
}

impl ReferenceInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn from_json(obj: &Map<String, Value>) -> Result<Self, FieldErrors> {
        ReferencePatch::from_json(obj)?.into_input()
    }
}
