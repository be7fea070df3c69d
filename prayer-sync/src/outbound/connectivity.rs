//! Connectivity flag shared between the host and the sync core.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::ports::ConnectivityProbe;

/// Online/offline switch flipped by the host.
#[derive(Debug)]
pub struct SharedConnectivity(AtomicBool);

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set_online(&self, online: bool) -> bool {
        self.0.swap(online, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(true, false)]
    #[case(false, true)]
    fn set_online_reports_the_previous_state(#[case] initial: bool, #[case] next: bool) {
        let connectivity = SharedConnectivity::new(initial);

        assert_eq!(connectivity.set_online(next), initial);
        assert_eq!(connectivity.is_online(), next);
    }
}
