use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::client::{ApiClient, SessionEvent};
use crate::guard::{Navigation, Route, RouteGuard};
use crate::session::SessionStore;

/// Top-level application state: where the user is, and the reaction to the
/// client dropping the session.
pub struct Shell {
    location: Route,
    store: Arc<SessionStore>,
    guard: RouteGuard,
    events: broadcast::Receiver<SessionEvent>,
}

impl Shell {
    pub fn new(client: &ApiClient, store: Arc<SessionStore>) -> Self {
        Self {
            location: Route::Login,
            guard: RouteGuard::new(store.clone()),
            store,
            events: client.subscribe(),
        }
    }

    pub fn location(&self) -> Route {
        self.location
    }

    /// Drains pending session events. Returns true if the session was invalidated.
    pub fn poll_session_events(&mut self) -> bool {
        let mut invalidated = false;
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::Invalidated) | Err(TryRecvError::Lagged(_)) => invalidated = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if invalidated {
            tracing::info!("session invalidated, back to login");
            self.location = Route::Login;
        }
        invalidated
    }

    pub async fn navigate(&mut self, path: &str) -> anyhow::Result<Route> {
        self.poll_session_events();
        let target = match Route::parse(path) {
            Some(Route::Root) => Route::Main,
            Some(Route::Logout) => {
                self.store.clear().await?;
                Route::Login
            }
            Some(route) => route,
            None => Route::Login,
        };
        self.location = match self.guard.check(target).await? {
            Navigation::Render(route) => route,
            Navigation::Redirect(route) => route,
        };
        Ok(self.location)
    }
}
