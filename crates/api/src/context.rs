use stockline_auth::{Actor, PrincipalId, Role};

/// Authenticated caller of a request, taken from verified token claims.
///
/// Handlers never read the role from the request body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    actor: Actor,
}

impl PrincipalContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.actor.principal_id
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }
}
