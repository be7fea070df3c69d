//! Port holding whether the device currently believes it is online.

/// Platform connectivity signal (`navigator.onLine` equivalent).
///
/// The value is advisory: it only decides whether cached schedules may be
/// served past their TTL. Network calls are still attempted when offline.
/// The session writes host transitions through [`Self::set_online`], so
/// every reader sees the same state.
pub trait ConnectivityProbe: Send + Sync {
    /// Return `true` when the platform reports a network connection.
    fn is_online(&self) -> bool;

    /// Record a connectivity transition; returns the previous state.
    fn set_online(&self, online: bool) -> bool;
}
