use crate::output::OutputNode;

/// Sink for committed output.
///
/// `apply` receives the whole committed tree with `dirty` set on every node
/// whose host representation changed since the previous commit. Clean nodes
/// must be kept as they are; fragments are structural and never displayed.
pub trait HostSync {
    type Error: std::error::Error;

    fn apply(&mut self, patch: &OutputNode) -> Result<(), Self::Error>;
}
