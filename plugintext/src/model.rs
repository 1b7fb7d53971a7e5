//! The in-memory object tree produced by the binary decoder (C3) and walked
//! by the text writer (C4), or built directly by the text reader (C5).
//!
//! The tree is owned outright: a [`Record`] owns its [`Field`]s, a [`Group`]
//! owns its children, and there are no back-references. This mirrors the
//! spec's "ownership" rule directly - in safe Rust that's just normal
//! `Vec`/`String` ownership, so there is no separate arena type for the
//! object tree itself (only the byte-level arenas in [`crate::arena`] are
//! needed, for the text reader's output buffer and scratch workspace).

/// A unique identifier for a record: an opaque 32-bit value printed and
/// parsed as `[XXXXXXXX]`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u32);

impl FormId {
    pub fn from_hex(s: &str) -> Option<FormId> {
        u32::from_str_radix(s, 16).ok().map(FormId)
    }

    pub fn to_hex(self) -> String {
        format!("{:08X}", self.0)
    }
}

impl std::fmt::Display for FormId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.to_hex())
    }
}

/// Bit position of the "compressed" flag, common to every record type.
pub const COMPRESSED_BIT: u32 = 0x0004_0000;

/// A record's 32-bit flag word.
///
/// Individual flag *names* are schema data (a record type's list of
/// `(bit, name)` pairs), not hardcoded accessors, so this is a thin wrapper
/// rather than a `bitflags!` struct with one method per bit - the type
/// registry (`schema` module) is what knows what each bit means for a given
/// record type. Only the compressed bit is privileged here, since the
/// decoder and both text traversals need to branch on it directly.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordFlags(pub u32);

impl RecordFlags {
    pub fn is_compressed(self) -> bool {
        self.0 & COMPRESSED_BIT != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.0 |= COMPRESSED_BIT;
        } else {
            self.0 &= !COMPRESSED_BIT;
        }
    }
}

/// A field's 4-ASCII-byte tag and raw payload bytes.
///
/// The payload is always the *decompressed*, already-destructured bytes;
/// compression is a record-level concern handled by the decoder and the
/// text reader/writer, not by `Field` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

impl Field {
    pub fn new(tag: &[u8; 4], data: Vec<u8>) -> Field {
        Field { tag: *tag, data }
    }

    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// A record: a typed container of fields, optionally nesting child groups
/// (used for `CELL` and `WRLD` records, whose children are their own
/// top-level `GRUP` blocks in the binary stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub tag: [u8; 4],
    pub flags: RecordFlags,
    pub form_id: FormId,
    pub timestamp: u16,
    pub unknown_version: u16,
    pub version: u16,
    pub unknown: u16,
    pub fields: Vec<Field>,
    pub groups: Vec<Group>,
}

impl Record {
    pub fn new(tag: [u8; 4], form_id: FormId) -> Record {
        Record {
            tag,
            flags: RecordFlags::default(),
            form_id,
            timestamp: 0,
            unknown_version: 0,
            version: 44,
            unknown: 0,
            fields: vec![],
            groups: vec![],
        }
    }

    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// The discriminator and label carried by a [`Group`], whose interpretation
/// of the raw 4-byte label depends on which variant this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Top([u8; 4]),
    WorldChildren(FormId),
    InteriorCellBlock(i32),
    InteriorCellSubBlock(i32),
    ExteriorCellBlock(i16, i16),
    ExteriorCellSubBlock(i16, i16),
    CellChildren(FormId),
    TopicChildren(FormId),
    CellPersistentChildren(FormId),
    CellTemporaryChildren(FormId),
    CellVisibleDistantChildren(FormId),
}

impl GroupKind {
    /// The raw `group_type` discriminator written in the binary header.
    pub fn discriminator(self) -> u32 {
        match self {
            GroupKind::Top(_) => 0,
            GroupKind::WorldChildren(_) => 1,
            GroupKind::InteriorCellBlock(_) => 2,
            GroupKind::InteriorCellSubBlock(_) => 3,
            GroupKind::ExteriorCellBlock(_, _) => 4,
            GroupKind::ExteriorCellSubBlock(_, _) => 5,
            GroupKind::CellChildren(_) => 6,
            GroupKind::TopicChildren(_) => 7,
            GroupKind::CellPersistentChildren(_) => 8,
            GroupKind::CellTemporaryChildren(_) => 9,
            GroupKind::CellVisibleDistantChildren(_) => 10,
        }
    }

    /// Human name used in the text format's group header line, e.g.
    /// `Top`, `Interior Cell Block`, `Cell Persistent Children`.
    pub fn human_name(self) -> &'static str {
        match self {
            GroupKind::Top(_) => "Top",
            GroupKind::WorldChildren(_) => "World Children",
            GroupKind::InteriorCellBlock(_) => "Interior Cell Block",
            GroupKind::InteriorCellSubBlock(_) => "Interior Cell Sub-Block",
            GroupKind::ExteriorCellBlock(_, _) => "Exterior Cell Block",
            GroupKind::ExteriorCellSubBlock(_, _) => "Exterior Cell Sub-Block",
            GroupKind::CellChildren(_) => "Cell Children",
            GroupKind::TopicChildren(_) => "Topic Children",
            GroupKind::CellPersistentChildren(_) => "Cell Persistent Children",
            GroupKind::CellTemporaryChildren(_) => "Cell Temporary Children",
            GroupKind::CellVisibleDistantChildren(_) => "Cell Visible Distant Children",
        }
    }

    pub fn from_human_name(name: &str) -> Option<&'static str> {
        [
            "Top",
            "World Children",
            "Interior Cell Block",
            "Interior Cell Sub-Block",
            "Exterior Cell Block",
            "Exterior Cell Sub-Block",
            "Cell Children",
            "Topic Children",
            "Cell Persistent Children",
            "Cell Temporary Children",
            "Cell Visible Distant Children",
        ]
        .iter()
        .find(|n| **n == name)
        .copied()
    }

    /// True for the two group kinds whose children get sorted ascending by
    /// form id after a binary decode (unless the caller preserves order).
    pub fn is_ordered_cell_children(self) -> bool {
        matches!(
            self,
            GroupKind::CellPersistentChildren(_) | GroupKind::CellTemporaryChildren(_)
        )
    }
}

/// One entry in a group's child list: either a plain record or a nested
/// group. Order matters and is preserved exactly as encountered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChild {
    Record(Record),
    Group(Group),
}

/// A `GRUP` container: its kind/label, timestamp metadata, and an ordered
/// list of children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub kind: GroupKind,
    pub timestamp: u16,
    pub unknown_version: u16,
    pub version: u16,
    pub unknown: u16,
    pub children: Vec<GroupChild>,
}

impl Group {
    pub fn new(kind: GroupKind) -> Group {
        Group {
            kind,
            timestamp: 0,
            unknown_version: 0,
            version: 44,
            unknown: 0,
            children: vec![],
        }
    }

    /// Iterates over every record in this group, recursing into nested
    /// groups and each record's own nested groups, in document order.
    pub fn iter_records(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        Box::new(self.children.iter().flat_map(|c| match c {
            GroupChild::Record(r) => {
                let nested: Box<dyn Iterator<Item = &Record>> =
                    Box::new(r.groups.iter().flat_map(|g| g.iter_records()));
                Box::new(std::iter::once(r).chain(nested)) as Box<dyn Iterator<Item = &Record>>
            }
            GroupChild::Group(g) => g.iter_records(),
        }))
    }
}

/// The top-level model: an ordered sequence of top-level items (records or
/// groups), exactly as they appear in the plugin's document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plugin {
    pub items: Vec<GroupChild>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_id_formats_as_bracketed_hex() {
        assert_eq!(FormId(0x51a8).to_string(), "[000051A8]");
    }

    #[test]
    fn form_id_parses_bracketed_hex_body() {
        assert_eq!(FormId::from_hex("000051A8"), Some(FormId(0x51a8)));
    }

    #[test]
    fn record_flags_compressed_bit() {
        let mut flags = RecordFlags(0);
        assert!(!flags.is_compressed());
        flags.set_compressed(true);
        assert!(flags.is_compressed());
        assert_eq!(flags.0, COMPRESSED_BIT);
    }

    #[test]
    fn group_kind_discriminators_match_spec_table() {
        assert_eq!(GroupKind::Top(*b"WEAP").discriminator(), 0);
        assert_eq!(GroupKind::CellTemporaryChildren(FormId(1)).discriminator(), 9);
        assert_eq!(
            GroupKind::CellVisibleDistantChildren(FormId(1)).discriminator(),
            10
        );
    }
}
