use onboard_auth::Principal;

/// Authenticated principal for a request.
///
/// Inserted by the auth middleware from a verified token; roles are derived
/// server-side and never read from the request body.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
