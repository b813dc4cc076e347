/// Flow-control state of one connection.
///
/// Owned by the worker driving the connection; never shared across tasks.
#[derive(Debug, Clone)]
pub struct PeerState {
    /// The remote peer is choking us.
    choked: bool,
}

impl PeerState {
    pub fn new() -> Self {
        Self { choked: true }
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn choke(&mut self) {
        self.choked = true;
    }

    pub fn unchoke(&mut self) {
        self.choked = false;
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_choked() {
        let mut state = PeerState::default();
        assert!(state.is_choked());
        state.unchoke();
        assert!(!state.is_choked());
        state.choke();
        assert!(state.is_choked());
    }
}
