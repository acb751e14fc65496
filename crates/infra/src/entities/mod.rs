//! Entities served by the repositories.
//!
//! Each entity is a domain-shaped struct plus its [`EntitySchema`]; the
//! generic engine does the rest.

mod account;
mod annotation;
mod customer_payment;
mod document;
mod presence;
mod project;
mod session;
mod threshold;
mod user;
mod webhook;

pub use account::Account;
pub use annotation::Annotation;
pub use customer_payment::CustomerPayment;
pub use document::DocumentRecord;
pub use presence::{Presence, PresenceStatus};
pub use project::Project;
pub use session::Session;
pub use threshold::Threshold;
pub use user::User;
pub use webhook::Webhook;

use docrepo_core::{EntityId, Identified};

use crate::registry::{ModelRegistry, RegistryError};

macro_rules! impl_identified {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Identified for $ty {
                fn identity(&self) -> Option<EntityId> {
                    EntityId::parse(&self.id).ok()
                }
            }
        )+
    };
}

impl_identified!(
    Account,
    Annotation,
    CustomerPayment,
    DocumentRecord,
    Presence,
    Project,
    Session,
    Threshold,
    User,
    Webhook,
);

/// Register every shipped entity.
pub fn register_all(registry: &mut ModelRegistry) -> Result<(), RegistryError> {
    registry.register::<Account>()?;
    registry.register::<User>()?;
    registry.register::<Session>()?;
    registry.register::<Webhook>()?;
    registry.register::<Project>()?;
    registry.register::<DocumentRecord>()?;
    registry.register::<Annotation>()?;
    registry.register::<Presence>()?;
    registry.register::<Threshold>()?;
    registry.register::<CustomerPayment>()?;
    Ok(())
}

/// A frozen registry holding every shipped entity.
pub fn registry() -> Result<ModelRegistry, RegistryError> {
    let mut registry = ModelRegistry::new();
    register_all(&mut registry)?;
    registry.freeze()?;
    Ok(registry)
}
