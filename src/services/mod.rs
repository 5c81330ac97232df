pub mod availability;
pub mod orders;
pub mod reconciliation;
pub mod reservations;
pub mod sweeper;

use uuid::Uuid;

/// Identity context for mutating calls.
///
/// The engine trusts the supplied user id; authorization is enforced
/// upstream before any call reaches these services.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: Option<Uuid>,
}

impl RequestContext {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// Context for background processes (sweeper, reconciliation).
    pub fn system() -> Self {
        Self { user_id: None }
    }
}
