//! Port for the "send the user to the login screen" side effect.

use tracing::warn;

/// Invoked once per torn-down session with the configured login route.
pub trait LoginNavigator: Send + Sync {
    fn redirect_to_login(&self, route: &str);
}

impl<F> LoginNavigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect_to_login(&self, route: &str) {
        self(route)
    }
}

/// Default navigator for headless callers: records the event in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNavigator;

impl LoginNavigator for LogNavigator {
    fn redirect_to_login(&self, route: &str) {
        warn!(route = %route, "Session ended; login required");
    }
}
