//! Example entities built on [`PersistenceService`](crate::model::PersistenceService).

pub mod alerts;
pub mod rooms;
pub mod tvs;
pub mod users;

use crate::model::EntityDefinition;

pub use alerts::{Alert, AlertService, AlertStatus};
pub use rooms::{Room, RoomService};
pub use tvs::{Tv, TvService};
pub use users::{User, UserService, UserType};

/// Definitions of the entities stored in the shared namespace.
pub fn shared_definitions(hash_rounds: u32) -> Vec<EntityDefinition> {
    vec![users::definition(hash_rounds), alerts::definition(), tvs::definition()]
}

/// Definitions of the entities stored once per tenant.
pub fn tenant_definitions() -> Vec<EntityDefinition> {
    vec![rooms::definition()]
}
