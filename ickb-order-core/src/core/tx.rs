use crate::core::data::{CellOutput, FixedPoint, Script};

/// One pending output of a [`TransactionSkeleton`] under construction: the same triple accepted
/// by `add_output`, with `capacity` addressable after the fact via [`TransactionSkeleton::outputs_mut`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOutput {
    pub lock: Script,
    pub type_: Option<Script>,
    pub capacity: FixedPoint,
    pub data: Vec<u8>,
}

/// The transaction-under-construction contract consumed by `mint`/`add_match`/`melt`.
///
/// Exclusively owned by the calling flow: every mutating method takes `&mut self`, so the borrow
/// checker rejects concurrent mutation at compile time rather than leaving "don't call this from
/// two places at once" as a documented caller obligation. A transaction must be considered
/// poisoned after any mutating call returns an error; this crate never attempts to undo a
/// partially-applied input/output list.
pub trait TransactionSkeleton {
    /// Registers a cell dependency. Idempotent: registering the same dependency twice is not an
    /// error.
    fn add_cell_dep(&mut self, dep: CellOutput);

    /// Registers a UDT type-script handler. Idempotent.
    fn add_udt_handler(&mut self, handler: Script);

    /// Appends `cell` as a consumed input.
    fn add_input(&mut self, out_point: crate::core::data::OutPoint);

    /// Appends a new output, returning its positional index within the outputs list.
    fn add_output(&mut self, output: CellOutput, data: Vec<u8>) -> usize;

    /// Read-write access to the outputs appended so far, keyed by the index `add_output`
    /// returned. Used by flows that must fix up a capacity field after the fact (mint's master
    /// cell, whose capacity is only known once the sibling order cell's occupied size is final).
    fn outputs_mut(&mut self) -> &mut [PendingOutput];
}
