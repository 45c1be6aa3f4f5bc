use std::sync::RwLock;

use crate::models::SessionUser;

/// Source of the authenticated local user
pub trait IdentityProvider {
    fn current_user(&self) -> Option<SessionUser>;
}

/// Identity fixed by the embedding application, e.g. after login
#[derive(Debug, Default)]
pub struct StaticIdentity(RwLock<Option<SessionUser>>);

impl StaticIdentity {
    pub fn new(user: Option<SessionUser>) -> Self {
        Self(RwLock::new(user))
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self::new(Some(user))
    }

    pub fn set(&self, user: Option<SessionUser>) {
        let mut guard = self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = user;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<SessionUser> {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for &P {
    fn current_user(&self) -> Option<SessionUser> {
        (**self).current_user()
    }
}
