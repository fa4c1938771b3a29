use std::fmt;
use std::sync::Arc;

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Root,
    Login,
    Logout,
    Register,
    ForgotPassword,
    ResetPassword,
    Main,
    AdminDashboard,
}

impl Route {
    /// Unknown paths resolve to `None`; the shell sends those to the login view.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let route = match trimmed {
            "" => Route::Root,
            "/login" => Route::Login,
            "/logout" => Route::Logout,
            "/register" => Route::Register,
            "/forgot-password" => Route::ForgotPassword,
            "/reset-password" => Route::ResetPassword,
            "/main" => Route::Main,
            "/admin/dashboard" => Route::AdminDashboard,
            _ => return None,
        };
        Some(route)
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Root => "/",
            Route::Login => "/login",
            Route::Logout => "/logout",
            Route::Register => "/register",
            Route::ForgotPassword => "/forgot-password",
            Route::ResetPassword => "/reset-password",
            Route::Main => "/main",
            Route::AdminDashboard => "/admin/dashboard",
        }
    }

    pub fn is_guarded(self) -> bool {
        matches!(self, Route::Main | Route::AdminDashboard)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
}

/// Decides per navigation whether a guarded route may render.
///
/// Only checks that a token is persisted; it never asks the backend, so a
/// stale token is caught later by the client's 401 handling.
#[derive(Clone)]
pub struct RouteGuard {
    session: Arc<dyn SessionState>,
}

impl RouteGuard {
    pub fn new(session: Arc<dyn SessionState>) -> Self {
        Self { session }
    }

    pub async fn check(&self, route: Route) -> anyhow::Result<Navigation> {
        if !route.is_guarded() {
            return Ok(Navigation::Render(route));
        }
        if self.session.is_persisted().await? {
            Ok(Navigation::Render(route))
        } else {
            tracing::debug!(route = %route, "no session token, redirecting to login");
            Ok(Navigation::Redirect(Route::Login))
        }
    }
}
