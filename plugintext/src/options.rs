//! Conversion options shared by the decoder and both text traversals.
//!
//! These mirror the CLI flags in spec.md section 6 one-to-one; the CLI
//! crate only parses arguments into this struct, it does not interpret
//! them.

/// Options that change conversion behaviour without changing the format
/// itself - every combination round-trips, these just pick between
/// otherwise-equivalent representations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Include each record's `[21 Mar 2020]` timestamp line in the text
    /// output, when the timestamp is non-zero.
    pub export_timestamp: bool,
    /// Skip the ascending-by-form-id sort normally applied to the children
    /// of `CellPersistentChildren`/`CellTemporaryChildren` groups.
    pub preserve_record_order: bool,
    /// Skip `Filter` type kinds' `preprocess` step, writing/reading the
    /// field's raw bytes instead of the canonicalised form.
    pub preserve_junk: bool,
}
