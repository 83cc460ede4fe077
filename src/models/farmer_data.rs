use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::validation::{self, FieldErrors, REQUIRED};

pub const FARMER_NAME_MAX_LEN: usize = 255;
pub const NATIONAL_ID_MAX_LEN: usize = 50;
pub const LOCATION_MAX_LEN: usize = 255;
pub const LOCAL_ID_MAX_LEN: usize = 100;

/// A farmer record as stored and returned on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FarmerData {
    pub id: i64,
    pub farmer_name: String,
    pub national_id: String,
    pub farm_type: i64,
    pub crop: i64,
    pub location: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Client-assigned identifier for records created offline.
    pub local_id: Option<String>,
    pub is_synced: bool,
}

/// The writable fields of a farmer record, each optional.
///
/// This is the single merge point for partial updates, whether they come from
/// `PATCH`, `PUT` or a sync batch. Read-only fields (`created_by`,
/// `created_at`, `updated_at`, `is_synced`) have no slot here and are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmerDataPatch {
    pub farmer_name: Option<String>,
    pub national_id: Option<String>,
    pub farm_type: Option<i64>,
    pub crop: Option<i64>,
    pub location: Option<String>,
    /// `Some(None)` clears the local id.
    pub local_id: Option<Option<String>>,
}

impl FarmerDataPatch {
    pub fn from_json(obj: &Map<String, Value>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let patch = Self::read(obj, &mut errors);
        errors.into_result(patch)
    }

    fn read(obj: &Map<String, Value>, errors: &mut FieldErrors) -> Self {
        let farmer_name = validation::text(obj, "farmer_name", FARMER_NAME_MAX_LEN, false, errors)
            .non_null("farmer_name", errors);
        let national_id = validation::text(obj, "national_id", NATIONAL_ID_MAX_LEN, false, errors)
            .non_null("national_id", errors);
        let farm_type = validation::integer(obj, "farm_type", errors).non_null("farm_type", errors);
        let crop = validation::integer(obj, "crop", errors).non_null("crop", errors);
        let location = validation::text(obj, "location", LOCATION_MAX_LEN, false, errors)
            .non_null("location", errors);
        let local_id = validation::text(obj, "local_id", LOCAL_ID_MAX_LEN, true, errors)
            .nullable()
            .map(|v| v.filter(|s| !s.is_empty()));

        Self {
            farmer_name,
            national_id,
            farm_type,
            crop,
            location,
            local_id,
        }
    }

    /// Names the required fields the patch leaves unset.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("farmer_name", self.farmer_name.is_none()),
            ("national_id", self.national_id.is_none()),
            ("farm_type", self.farm_type.is_none()),
            ("crop", self.crop.is_none()),
            ("location", self.location.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect()
    }

    /// Errors for a patch used as a full replacement (`PUT`).
    pub fn require_complete(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for field in self.missing_required() {
            errors.add(field, REQUIRED);
        }
        errors.into_result(())
    }

    /// Overwrites every supplied field on `record`.
    pub fn apply(&self, record: &mut FarmerData) {
        if let Some(v) = &self.farmer_name {
            record.farmer_name = v.clone();
        }
        if let Some(v) = &self.national_id {
            record.national_id = v.clone();
        }
        if let Some(v) = self.farm_type {
            record.farm_type = v;
        }
        if let Some(v) = self.crop {
            record.crop = v;
        }
        if let Some(v) = &self.location {
            record.location = v.clone();
        }
        if let Some(v) = &self.local_id {
            record.local_id = v.clone();
        }
    }

    pub fn into_input(self) -> Result<FarmerDataInput, FieldErrors> {
        let complete = self.require_complete();
        match (
            self.farmer_name,
            self.national_id,
            self.farm_type,
            self.crop,
            self.location,
        ) {
            (Some(farmer_name), Some(national_id), Some(farm_type), Some(crop), Some(location)) => {
                Ok(FarmerDataInput {
                    farmer_name,
                    national_id,
                    farm_type,
                    crop,
                    location,
                    local_id: self.local_id.flatten(),
                })
            }
            _ => Err(complete.err().unwrap_or_default()),
        }
    }
}

/// A complete farmer record payload, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmerDataInput {
    pub farmer_name: String,
    pub national_id: String,
    pub farm_type: i64,
    pub crop: i64,
    pub location: String,
    pub local_id: Option<String>,
}

impl FarmerDataInput {
    pub fn new(
        farmer_name: impl Into<String>,
        national_id: impl Into<String>,
        farm_type: i64,
        crop: i64,
        location: impl Into<String>,
    ) -> Self {
        Self {
            farmer_name: farmer_name.into(),
            national_id: national_id.into(),
            farm_type,
            crop,
            location: location.into(),
            local_id: None,
        }
    }

    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Validates a full create payload, reporting type and presence errors together.
    pub fn from_json(obj: &Map<String, Value>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let patch = FarmerDataPatch::read(obj, &mut errors);

        // A field that failed its type check already carries an error.
        for field in patch.missing_required() {
            if errors.get(field).is_none() {
                errors.add(field, REQUIRED);
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        patch.into_input()
    }
}
