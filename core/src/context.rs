//! Single access point for the session in scope.
//!
//! Code running under [`SessionProvider::scope`] reaches the session through
//! [`use_session`]; anywhere else that call fails immediately. Tasks spawned
//! from inside a scope do not inherit it and must be given the session
//! explicitly.

use crate::error::SessionError;
use crate::session::Session;
use std::future::Future;

tokio::task_local! {
    static CURRENT_SESSION: Session;
}

pub struct SessionProvider {
    session: Session,
}

impl SessionProvider {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn scope<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_SESSION.scope(self.session.clone(), future).await
    }

    pub fn sync_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_SESSION.sync_scope(self.session.clone(), f)
    }
}

/// The session provided to the current task.
pub fn use_session() -> Result<Session, SessionError> {
    CURRENT_SESSION
        .try_with(Session::clone)
        .map_err(|_| SessionError::OutsideProvider {
            accessor: "use_session",
        })
}
