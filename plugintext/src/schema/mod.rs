//! The type registry (C2): type kinds, field/record schemas, and the static
//! registry that dispatches on `(record_type, field_type)`.
//!
//! Every variant below is a closed, tagged enumeration with its payload
//! inline, per the spec's "static polymorphism by tagged variant" design
//! note - there is no dynamic dispatch table, and registry entries are
//! built once (via `lazy_static!`, following the teacher's own use of that
//! crate for process-wide static data) and never mutated.

mod registry;
mod vmad;

pub use registry::{common_flags, common_schema, record_schema};
pub use vmad::{
    read_vmad, write_vmad, VmadData, VmadFragment, VmadInfoExtension, VmadProperty,
    VmadQuestAlias, VmadQuestExtension, VmadQuestFragment, VmadScript, VmadValue,
};

/// Every primitive and composite shape a field payload can have.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// NUL-terminated ASCII.
    ZString,
    /// Localized-string id if the plugin is localized, otherwise the same
    /// as `ZString`. The core assumes non-localized plugins (see the
    /// open question in the design notes).
    LString,
    /// 16-bit length prefix followed by that many bytes, no NUL.
    WString,
    /// Opaque bytes, written as lowercase hex.
    ByteArray,
    /// Opaque bytes, written as base64 of a `deflate` stream of the bytes.
    ByteArrayCompressed,
    /// Opaque bytes of exactly the wrapped length.
    ByteArrayFixed(usize),
    /// Opaque bytes, hex with a run-length escape for `0x00`/`0xFF` runs.
    ByteArrayRLE,
    /// A little-endian integer; `size` is 1, 2, 4, or 8 bytes.
    Integer { size: u8, signed: bool },
    /// An IEEE-754 float; `size` is 4 or 8 bytes.
    Float { size: u8 },
    /// A single byte, 0 or 1.
    Boolean,
    /// A 32-bit form id.
    FormID,
    /// A contiguous run of 32-bit form ids filling the whole field.
    FormIDArray,
    /// A fixed-layout sequence of named inner fields.
    Struct(Vec<StructField>),
    /// A value drawn from (or masking) a fixed dictionary of named values.
    Enum {
        size: u8,
        entries: Vec<(u32, &'static str)>,
        flags: bool,
    },
    /// A fixed byte sequence: written from the schema, checked on read,
    /// never appears in text.
    Constant(Vec<u8>),
    /// Masks reserved bits of the payload via `preprocess` before
    /// delegating to `inner`, unless the caller asked to preserve junk.
    Filter {
        inner: Box<TypeKind>,
        preprocess: fn(&[u8]) -> Vec<u8>,
    },
    /// Three consecutive 32-bit floats.
    Vector3,
    /// The structured Papyrus "virtual machine attached data" sub-format;
    /// see [`crate::schema::vmad`].
    Vmad,
}

/// One named field inside a [`TypeKind::Struct`].
#[derive(Debug, Clone)]
pub struct StructField {
    pub name: &'static str,
    pub kind: TypeKind,
}

impl StructField {
    pub fn new(name: &'static str, kind: TypeKind) -> StructField {
        StructField { name, kind }
    }
}

/// A field schema entry: either a single named field, or an ordered run of
/// sibling fields that must appear together, in that exact order (some
/// entries of which may be [`TypeKind::Constant`] fillers).
#[derive(Debug, Clone)]
pub enum FieldSchema {
    Leaf {
        tag: [u8; 4],
        kind: TypeKind,
        comment: &'static str,
    },
    Subrecord(Vec<FieldSchema>),
}

impl FieldSchema {
    /// Finds the leaf schema for `tag` within this entry, recursing into
    /// subrecords.
    pub fn find(&self, tag: &[u8; 4]) -> Option<&FieldSchema> {
        match self {
            FieldSchema::Leaf { tag: t, .. } if t == tag => Some(self),
            FieldSchema::Leaf { .. } => None,
            FieldSchema::Subrecord(entries) => entries.iter().find_map(|e| e.find(tag)),
        }
    }

    /// If `tag` names a leaf inside a [`FieldSchema::Subrecord`], returns
    /// the `Constant` entries that immediately follow it in that
    /// subrecord, in order - the binary layout carries them as real
    /// sibling fields, but they never appear in text, so the reader must
    /// synthesize them itself rather than read a tag line for each.
    pub fn constants_after(&self, tag: &[u8; 4]) -> Option<Vec<([u8; 4], Vec<u8>)>> {
        match self {
            FieldSchema::Leaf { .. } => None,
            FieldSchema::Subrecord(entries) => {
                let pos = entries
                    .iter()
                    .position(|e| matches!(e, FieldSchema::Leaf { tag: t, .. } if t == tag));
                if let Some(pos) = pos {
                    let mut out = Vec::new();
                    for e in &entries[pos + 1..] {
                        match e {
                            FieldSchema::Leaf {
                                tag,
                                kind: TypeKind::Constant(bytes),
                                ..
                            } => out.push((*tag, bytes.clone())),
                            _ => break,
                        }
                    }
                    Some(out)
                } else {
                    entries.iter().find_map(|e| e.constants_after(tag))
                }
            }
        }
    }
}

/// The schema for one record type: a human comment, its ordered field
/// schemas, and the record type's flag dictionary (bit position -> name).
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub comment: &'static str,
    pub fields: Vec<FieldSchema>,
    pub flags: Vec<(u32, &'static str)>,
}

impl RecordSchema {
    /// Looks up the schema for `tag`, first in this record's own fields,
    /// then falling back to the common schema shared by every record type.
    pub fn find_field(&self, tag: &[u8; 4]) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find_map(|f| f.find(tag))
            .or_else(|| common_schema().iter().find_map(|f| f.find(tag)))
    }

    /// The `Constant` siblings that immediately follow `tag` inside a
    /// `Subrecord`, own fields first, falling back to the common schema.
    pub fn constants_after(&self, tag: &[u8; 4]) -> Vec<([u8; 4], Vec<u8>)> {
        self.fields
            .iter()
            .find_map(|f| f.constants_after(tag))
            .or_else(|| common_schema().iter().find_map(|f| f.constants_after(tag)))
            .unwrap_or_default()
    }
}

/// Like [`RecordSchema::constants_after`], but also covers record types
/// with no registry entry at all (which still share the common schema).
pub fn constants_after(record_tag: &[u8; 4], field_tag: &[u8; 4]) -> Vec<([u8; 4], Vec<u8>)> {
    match record_schema(record_tag) {
        Some(record) => record.constants_after(field_tag),
        None => common_schema()
            .iter()
            .find_map(|f| f.constants_after(field_tag))
            .unwrap_or_default(),
    }
}

// -- schema-construction helpers, mirroring the rf_/sf_/type_ helper macros
// the format was originally specified with, one function per type kind --

pub fn zstring(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::ZString, comment)
}

pub fn lstring(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::LString, comment)
}

pub fn wstring(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::WString, comment)
}

pub fn bytes(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::ByteArray, comment)
}

pub fn bytes_fixed(tag: &[u8; 4], size: usize, comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::ByteArrayFixed(size), comment)
}

pub fn bytes_compressed(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::ByteArrayCompressed, comment)
}

pub fn bytes_rle(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::ByteArrayRLE, comment)
}

pub fn int(tag: &[u8; 4], size: u8, signed: bool, comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::Integer { size, signed }, comment)
}

pub fn float(tag: &[u8; 4], size: u8, comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::Float { size }, comment)
}

pub fn boolean(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::Boolean, comment)
}

pub fn formid(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::FormID, comment)
}

pub fn formid_array(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::FormIDArray, comment)
}

pub fn vmad(tag: &[u8; 4], comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::Vmad, comment)
}

pub fn constant(tag: &[u8; 4], bytes: Vec<u8>, comment: &'static str) -> FieldSchema {
    leaf(tag, TypeKind::Constant(bytes), comment)
}

pub fn struct_field(
    tag: &[u8; 4],
    fields: Vec<StructField>,
    comment: &'static str,
) -> FieldSchema {
    leaf(tag, TypeKind::Struct(fields), comment)
}

pub fn enum_field(
    tag: &[u8; 4],
    size: u8,
    entries: Vec<(u32, &'static str)>,
    comment: &'static str,
) -> FieldSchema {
    leaf(
        tag,
        TypeKind::Enum {
            size,
            entries,
            flags: false,
        },
        comment,
    )
}

pub fn flags_field(
    tag: &[u8; 4],
    size: u8,
    entries: Vec<(u32, &'static str)>,
    comment: &'static str,
) -> FieldSchema {
    leaf(
        tag,
        TypeKind::Enum {
            size,
            entries,
            flags: true,
        },
        comment,
    )
}

pub fn subrecord(entries: Vec<FieldSchema>) -> FieldSchema {
    FieldSchema::Subrecord(entries)
}

fn leaf(tag: &[u8; 4], kind: TypeKind, comment: &'static str) -> FieldSchema {
    FieldSchema::Leaf {
        tag: *tag,
        kind,
        comment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_leaf_by_tag() {
        let schema = zstring(b"EDID", "Editor ID");
        assert!(schema.find(b"EDID").is_some());
        assert!(schema.find(b"FULL").is_none());
    }

    #[test]
    fn finds_leaf_inside_subrecord() {
        let schema = subrecord(vec![
            zstring(b"MAST", "Master File"),
            constant(b"DATA", vec![0; 8], "Unused"),
        ]);
        assert!(schema.find(b"DATA").is_some());
    }

    #[test]
    fn finds_constant_following_a_subrecord_leaf() {
        let schema = subrecord(vec![
            zstring(b"MAST", "Master File"),
            constant(b"DATA", vec![0; 8], "Unused"),
        ]);
        let after = schema.constants_after(b"MAST").unwrap();
        assert_eq!(after, vec![(*b"DATA", vec![0; 8])]);
        assert!(schema.constants_after(b"DATA").unwrap().is_empty());
    }
}
