//! Role-based permission gate and record scoping.
//!
//! | resource            | read          | write  |
//! |---------------------|---------------|--------|
//! | farm types, crops   | authenticated | admin  |
//! | farmer data, sync   | authenticated | authenticated (scoped) |
//! | users (`me`)        | authenticated | -      |
//! | users (others)      | admin         | admin  |

use super::auth::RequestContext;
use super::error::ApiError;
use crate::db::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    FarmType,
    Crop,
    FarmerData,
    Users,
    CurrentUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    PartialUpdate,
    Destroy,
    Sync,
}

impl Action {
    pub fn is_read(&self) -> bool {
        matches!(self, Action::List | Action::Retrieve)
    }
}

/// Whether `ctx` may perform `action` on `resource`.
pub fn allows(ctx: &RequestContext, resource: Resource, action: Action) -> bool {
    match resource {
        Resource::FarmType | Resource::Crop => action.is_read() || ctx.is_admin(),
        Resource::FarmerData | Resource::CurrentUser => true,
        Resource::Users => ctx.is_admin(),
    }
}

/// Runs the gate, turning a refusal into `403`.
pub fn check(ctx: &RequestContext, resource: Resource, action: Action) -> Result<(), ApiError> {
    if allows(ctx, resource, action) {
        Ok(())
    } else {
        tracing::warn!(
            username = %ctx.username,
            ?resource,
            ?action,
            "Permission denied"
        );
        Err(ApiError::Forbidden)
    }
}

/// Admins see every farmer record; clerks only their own.
pub fn farmer_data_scope(ctx: &RequestContext) -> Scope {
    if ctx.is_admin() {
        Scope::All
    } else {
        Scope::Owner(ctx.user_id)
    }
}
