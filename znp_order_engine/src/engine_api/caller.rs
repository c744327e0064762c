use std::{collections::HashSet, time::Duration};

use tokio::time::Instant;

use crate::{db_types::Role, engine_api::errors::EngineError};

/// The authenticated identity an engine operation runs on behalf of.
///
/// Authentication happens at the transport edge. By the time a `Caller` exists the user id, email and roles have been
/// verified. The optional deadline bounds the whole operation, including every database round trip.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i64,
    pub email: String,
    pub roles: HashSet<Role>,
    pub deadline: Option<Instant>,
}

impl Caller {
    pub fn new<S: Into<String>>(user_id: i64, email: S, roles: &[Role]) -> Self {
        Self { user_id, email: email.into(), roles: roles.iter().copied().collect(), deadline: None }
    }

    pub fn user<S: Into<String>>(user_id: i64, email: S) -> Self {
        Self::new(user_id, email, &[Role::User])
    }

    pub fn admin<S: Into<String>>(user_id: i64, email: S) -> Self {
        Self::new(user_id, email, &[Role::User, Role::Admin])
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn require_admin(&self) -> Result<(), EngineError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!("{} does not have the admin role", self.email)))
        }
    }
}
