use crate::error::EngineError;
use crate::writer::Writer;

/// A unit of work executed on the writer thread.
///
/// Any `FnOnce(&mut Writer) -> Result<T, EngineError>` is a command, so
/// one-off work can be submitted as a closure. Compound commands call
/// [`Command::execute`] on other commands inside [`Writer::transact`] to
/// stay atomic as a group.
pub trait Command: Send + 'static {
    type Output: Send + 'static;

    fn execute(self, writer: &mut Writer) -> Result<Self::Output, EngineError>;
}

impl<F, T> Command for F
where
    F: FnOnce(&mut Writer) -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn execute(self, writer: &mut Writer) -> Result<T, EngineError> {
        self(writer)
    }
}
