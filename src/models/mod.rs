mod farmer_data;
mod reference;
mod role;
mod user;
pub mod validation;

pub use farmer_data::{FarmerData, FarmerDataInput, FarmerDataPatch, LOCAL_ID_MAX_LEN};
pub use reference::{Crop, FarmType, ReferenceInput, ReferenceItem, ReferenceKind, ReferencePatch};
pub use role::Role;
pub use user::{User, UserUpdate};
pub use validation::FieldErrors;
