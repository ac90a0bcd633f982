use crate::fault::TrapCause;

/// Control-unit execution states.
///
/// One step walks `Ready -> Fetching -> Decoding -> Executing -> Ready`
/// unless a fault or halt intervenes. The transient pipeline states are
/// observable through trace hooks; between steps the simulator rests in
/// `Ready`, `Trapped`, or `Halted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Ready to execute the next instruction.
    #[default]
    Ready,
    /// Reading the instruction word(s) at the PC.
    Fetching,
    /// Validating and decoding the fetched word(s).
    Decoding,
    /// Applying the decoded instruction's effects.
    Executing,
    /// A trap was dispatched to its handler vector; the next step resumes
    /// from the handler.
    Trapped(TrapCause),
    /// Terminal. No further steps are possible.
    Halted,
}

impl RunState {
    /// Returns the dispatched trap cause when this state is `Trapped`.
    #[must_use]
    pub const fn trapped_cause(self) -> Option<TrapCause> {
        match self {
            Self::Trapped(cause) => Some(cause),
            Self::Ready | Self::Fetching | Self::Decoding | Self::Executing | Self::Halted => None,
        }
    }

    /// Returns `true` for the terminal `Halted` state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Halted)
    }
}
