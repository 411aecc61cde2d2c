//! Error types for wire message access.

/// Failures raised by [`FieldAccessor`](crate::FieldAccessor) operations.
///
/// Callers distinguish [`Hl7Error::InvalidLocator`], which points at a schema
/// defect, from everything else, which is a problem with the value or the message.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Hl7Error {
    /// The field locator does not follow the `[/GROUP(n)]*/SEG(n)-F(r)-C-S` grammar.
    #[error("Invalid field locator '{0}'")]
    InvalidLocator(String),

    /// MSH-1 and MSH-2 hold the message delimiters and cannot be assigned.
    #[error("Field {0} is fixed by the message encoding and cannot be set")]
    ReadOnlyField(String),

    /// The message holds MSH as its first segment only.
    #[error("Segment {0} may only appear once at the start of the message")]
    MisplacedHeader(String),
}
