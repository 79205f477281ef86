//! Lock state shared by the backends.

/// Whether a lock instance currently owns its resource identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unheld,
    Held,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unheld => "unheld",
            LockState::Held => "held",
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, LockState::Held)
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
