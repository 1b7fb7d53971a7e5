//! Concrete record schemas (C2's static data).
//!
//! Each function below corresponds to one `RECORD(...)` definition in the
//! original tool's `typeinfo.cpp`; the field tags, comments, struct layouts
//! and flag/enum dictionaries are carried over directly; only the C macros
//! (`rf_zstring`, `sf_flags_uint32`, ...) become the builder functions in
//! `super` (`zstring`, `flags_field`, ...). Record types with no entry here
//! fall back to opaque `ByteArray` fields end to end, which is the spec's
//! own policy for unrecognised record types - the registry does not need to
//! be exhaustive to be correct.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::{
    bytes, bytes_compressed, constant, enum_field, flags_field, float, formid, formid_array, int,
    lstring, struct_field, subrecord, vmad, zstring, FieldSchema, RecordSchema, StructField,
    TypeKind,
};

/// Masks `CELL`'s `XCLC.Flags` word down to its four genuinely-used low
/// bits, discarding reserved/junk high bits the game itself never clears -
/// ported from the original's lambda in `typeinfo.cpp`'s `sf_filter` call
/// for `XCLC`.
fn mask_xclc_flags(bytes: &[u8]) -> Vec<u8> {
    debug_assert_eq!(bytes.len(), 4);
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    (value & 0x0000_000f).to_le_bytes().to_vec()
}

fn xclc_flags_field() -> StructField {
    StructField::new(
        "Flags",
        TypeKind::Filter {
            inner: Box::new(TypeKind::Enum {
                size: 4,
                entries: vec![
                    (0x1, "Force Hide Land Quad 1"),
                    (0x2, "Force Hide Land Quad 2"),
                    (0x4, "Force Hide Land Quad 3"),
                    (0x8, "Force Hide Land Quad 4"),
                ],
                flags: true,
            }),
            preprocess: mask_xclc_flags,
        },
    )
}

/// Fields valid on every record type, checked after a record's own schema.
pub fn common_schema() -> &'static [FieldSchema] {
    &COMMON_SCHEMA
}

fn build_common_schema() -> Vec<FieldSchema> {
    vec![
        zstring(b"EDID", "Editor ID"),
        lstring(b"FULL", "Name"),
        struct_field(
            b"OBND",
            vec![
                StructField::new("X1", TypeKind::Integer { size: 2, signed: true }),
                StructField::new("Y1", TypeKind::Integer { size: 2, signed: true }),
                StructField::new("Z1", TypeKind::Integer { size: 2, signed: true }),
                StructField::new("X2", TypeKind::Integer { size: 2, signed: true }),
                StructField::new("Y2", TypeKind::Integer { size: 2, signed: true }),
                StructField::new("Z2", TypeKind::Integer { size: 2, signed: true }),
            ],
            "Object Bounds",
        ),
        int(b"COCT", 4, false, "Item Count"),
        bytes(b"CNTO", "Items"),
        vmad(b"VMAD", "Script"),
        int(b"KSIZ", 4, false, "Keyword Count"),
        formid_array(b"KWDA", "Keywords"),
        zstring(b"FLTR", "Object Window Filter"),
    ]
}

/// Header flag bits named for every record type, checked after a record's
/// own `flags` dictionary - ported from `Record_Common`'s `record_flags(...)`
/// block in the original's `typeinfo.cpp`.
pub fn common_flags() -> &'static [(u32, &'static str)] {
    &[
        (0x20, "Deleted"),
        (crate::model::COMPRESSED_BIT, "Compressed"),
        (0x800000, "Is Marker"),
        (0x8000000, "NavMesh Generation - Bounding Box"),
    ]
}

fn tes4_schema() -> RecordSchema {
    RecordSchema {
        comment: "File Header",
        fields: vec![
            struct_field(
                b"HEDR",
                vec![
                    StructField::new("Version", TypeKind::Float { size: 4 }),
                    StructField::new("Number Of Records", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Next Object ID", TypeKind::FormID),
                ],
                "Header",
            ),
            subrecord(vec![
                zstring(b"MAST", "Master File"),
                constant(b"DATA", vec![0; 8], "Unused"),
            ]),
            zstring(b"CNAM", "Author"),
            int(b"INTV", 4, false, "Tagified Strings"),
            zstring(b"SNAM", "Description"),
        ],
        flags: vec![
            (0x1, "Master"),
            (0x80, "Localized"),
            (0x200, "Light Master"),
        ],
    }
}

fn weap_schema() -> RecordSchema {
    RecordSchema {
        comment: "Weapon",
        fields: vec![
            formid(b"ETYP", "Equipment Type"),
            formid(b"BIDS", "Block Bash Impact Data Set"),
            formid(b"BAMT", "Alternate Block Material"),
            lstring(b"DESC", "Description"),
            formid(b"INAM", "Impact Data Set"),
            formid(b"WNAM", "1st Person Model Object"),
            formid(b"TNAM", "Attack Fail Sound"),
            formid(b"NAM9", "Equip Sound"),
            formid(b"NAM8", "Unequip Sound"),
            struct_field(
                b"DATA",
                vec![
                    StructField::new("Value", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Weight", TypeKind::Float { size: 4 }),
                    StructField::new("Damage", TypeKind::Integer { size: 2, signed: true }),
                ],
                "Game Data",
            ),
            struct_field(
                b"DNAM",
                vec![
                    StructField::new("Animation Type", TypeKind::Integer { size: 1, signed: false }),
                    StructField::new("Unknown 0", TypeKind::Integer { size: 1, signed: true }),
                    StructField::new("Unknown 1", TypeKind::Integer { size: 2, signed: true }),
                    StructField::new("Speed", TypeKind::Float { size: 4 }),
                    StructField::new("Reach", TypeKind::Float { size: 4 }),
                    StructField::new("Flags", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Flags?", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Sight FOV", TypeKind::Float { size: 4 }),
                    StructField::new("Unused0", TypeKind::Constant(vec![0, 0, 0, 0])),
                    StructField::new("VATS to hit", TypeKind::Integer { size: 1, signed: false }),
                    StructField::new("Unused1", TypeKind::Constant(vec![0xff])),
                    StructField::new("Projectiles", TypeKind::Integer { size: 1, signed: false }),
                    StructField::new("Embedded Weapon", TypeKind::Integer { size: 1, signed: true }),
                    StructField::new("Min Range", TypeKind::Float { size: 4 }),
                    StructField::new("Max Range", TypeKind::Float { size: 4 }),
                    StructField::new("Unused2", TypeKind::Constant(vec![0, 0, 0, 0])),
                    StructField::new("Flags", TypeKind::Integer { size: 4, signed: false }),
                    StructField::new("Unused3", TypeKind::Constant(1.0f32.to_le_bytes().to_vec())),
                    StructField::new("Unknown", TypeKind::Float { size: 4 }),
                    StructField::new("Rumble Left", TypeKind::Float { size: 4 }),
                    StructField::new("Rumble Right", TypeKind::Float { size: 4 }),
                    StructField::new("Rumble Duration", TypeKind::Float { size: 4 }),
                    StructField::new("Unused4", TypeKind::Constant(vec![0; 12])),
                    StructField::new("Skill", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Unused5", TypeKind::Constant(vec![0; 8])),
                    StructField::new("Resist", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Unused6", TypeKind::Constant(vec![0, 0, 0, 0])),
                    StructField::new("Stagger", TypeKind::Float { size: 4 }),
                ],
                "Weapon Data",
            ),
            struct_field(
                b"CRDT",
                vec![
                    StructField::new("Critical Damage", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Unknown", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Critical % Mult", TypeKind::Float { size: 4 }),
                    StructField::new("Flags", TypeKind::Integer { size: 4, signed: false }),
                    StructField::new("Unknown2", TypeKind::Integer { size: 4, signed: false }),
                    StructField::new("Critical Spell Effect", TypeKind::FormID),
                    StructField::new("Unknown3", TypeKind::Integer { size: 4, signed: false }),
                ],
                "Critical Data",
            ),
            int(b"VNAM", 4, true, "Detection Sound Level"),
            zstring(b"MODL", "Model File Name"),
        ],
        flags: vec![],
    }
}

fn qust_schema() -> RecordSchema {
    RecordSchema {
        comment: "Quest",
        fields: vec![
            struct_field(
                b"DNAM",
                vec![
                    StructField::new(
                        "Flags",
                        TypeKind::Enum {
                            size: 2,
                            entries: vec![
                                (0x001, "Start Game Enabled"),
                                (0x004, "Wilderness Encounter"),
                                (0x008, "Allow Repeated Stages"),
                                (0x100, "Run Once"),
                                (0x200, "Exclude From Dialogue Export"),
                                (0x400, "Warn On Alias Fill Failure"),
                            ],
                            flags: true,
                        },
                    ),
                    StructField::new("Priority", TypeKind::Integer { size: 1, signed: false }),
                    StructField::new("Unknown", TypeKind::Integer { size: 1, signed: false }),
                    StructField::new("Unused", TypeKind::Constant(vec![0, 0, 0, 0])),
                    StructField::new(
                        "Type",
                        TypeKind::Enum {
                            size: 4,
                            entries: vec![
                                (0x0, "None"),
                                (0x1, "Main Quest"),
                                (0x2, "Mages Guild"),
                                (0x3, "Thieves Guild"),
                                (0x4, "Dark Brotherhood"),
                                (0x5, "Companion Quests"),
                                (0x6, "Miscellaneous"),
                                (0x7, "Daedric Quests"),
                                (0x8, "Side Quests"),
                                (0x9, "Civil War"),
                                (0xa, "DLC01 - Vampire"),
                                (0xb, "DLC02 - Dragonborn"),
                            ],
                            flags: false,
                        },
                    ),
                ],
                "Quest Data",
            ),
            struct_field(
                b"INDX",
                vec![
                    StructField::new("Journal Index", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new(
                        "Flags",
                        TypeKind::Enum {
                            size: 1,
                            entries: vec![
                                (0x2, "Start Up Stage"),
                                (0x4, "Shut Down Stage"),
                                (0x8, "Keep Instance Data From Here On"),
                            ],
                            flags: true,
                        },
                    ),
                    StructField::new("Unknown", TypeKind::Integer { size: 1, signed: true }),
                ],
                "Index",
            ),
            lstring(b"CNAM", "Journal Entry"),
            flags_field(b"QSDT", 1, vec![(0x1, "Complete Quest"), (0x2, "Fail Quest")], "Flags"),
            int(b"QOBJ", 2, true, "Objective Index"),
            int(b"FNAM", 4, false, "Objective Flags"),
            lstring(b"NNAM", "Objective Text"),
            struct_field(
                b"QSTA",
                vec![
                    StructField::new("Target Alias", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Flags", TypeKind::Integer { size: 4, signed: true }),
                ],
                "Quest Target",
            ),
            int(b"ANAM", 4, false, "Next Alias ID"),
            int(b"ALST", 4, false, "Alias ID"),
            int(b"ALLS", 4, false, "Location Alias ID"),
            zstring(b"ALID", "Alias Name"),
            formid(b"ALFR", "Alias Forced Reference"),
            formid(b"ALUA", "Alias Unique Actor"),
            formid(b"VTCK", "Voice Type"),
        ],
        flags: vec![],
    }
}

fn cell_schema() -> RecordSchema {
    RecordSchema {
        comment: "Cell",
        fields: vec![
            flags_field(
                b"DATA",
                2,
                vec![
                    (0x001, "Interior"),
                    (0x002, "Has Water"),
                    (0x004, "Can't Travel From Here"),
                    (0x008, "No LOD Water"),
                    (0x020, "Public Area"),
                    (0x040, "Hand Changed"),
                    (0x080, "Show Sky"),
                    (0x100, "Use Sky Lighting"),
                ],
                "Flags",
            ),
            struct_field(
                b"XCLC",
                vec![
                    StructField::new("X", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Y", TypeKind::Integer { size: 4, signed: true }),
                    xclc_flags_field(),
                ],
                "Data",
            ),
            formid(b"LTMP", "Lighting Template"),
            formid_array(b"XCLR", "Regions Containing Cell"),
            formid(b"XLCN", "Location"),
            formid(b"XCWT", "Water"),
            bytes_compressed(b"TVDT", "TVDT"),
            bytes_compressed(b"MHDT", "MHDT"),
            struct_field(
                b"XCLL",
                vec![
                    StructField::new("Ambient Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Directional Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Fog Near Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Fog Near", TypeKind::Float { size: 4 }),
                    StructField::new("Fog Far", TypeKind::Float { size: 4 }),
                    StructField::new("Rotation XY", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Rotation Z", TypeKind::Integer { size: 4, signed: true }),
                    StructField::new("Directional Fade", TypeKind::Float { size: 4 }),
                    StructField::new("Fog Clip Distance", TypeKind::Float { size: 4 }),
                    StructField::new("Fog Pow", TypeKind::Float { size: 4 }),
                    StructField::new("Ambient X+ Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Ambient X- Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Ambient Y+ Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Ambient Y- Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Ambient Z+ Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Ambient Z- Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Specular Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Fresnel Power", TypeKind::Float { size: 4 }),
                    StructField::new("Fog Far Color", TypeKind::ByteArrayFixed(4)),
                    StructField::new("Fog Max", TypeKind::Float { size: 4 }),
                    StructField::new("Light Fade Distance Start", TypeKind::Float { size: 4 }),
                    StructField::new("Light Fade Distance End", TypeKind::Float { size: 4 }),
                    StructField::new(
                        "Inheritance Flags",
                        TypeKind::Enum {
                            size: 4,
                            entries: vec![
                                (0x001, "Ambient Color"),
                                (0x002, "Directional Color"),
                                (0x004, "Fog Color"),
                                (0x008, "Fog Near"),
                                (0x010, "Fog Far"),
                                (0x020, "Directional Rotation"),
                                (0x040, "Directional Fade"),
                                (0x080, "Clip Distance"),
                                (0x100, "Fog Power"),
                                (0x200, "Fog Max"),
                                (0x400, "Light Fade Distance"),
                            ],
                            flags: true,
                        },
                    ),
                ],
                "Lighting",
            ),
        ],
        flags: vec![(0x400, "Persistent")],
    }
}

fn npc_schema() -> RecordSchema {
    RecordSchema {
        comment: "Non-Player Character",
        fields: vec![
            struct_field(
                b"ACBS",
                vec![
                    StructField::new(
                        "Flags",
                        TypeKind::Enum {
                            size: 4,
                            entries: vec![
                                (0x00000001, "Female"),
                                (0x00000002, "Essential"),
                                (0x00000004, "Is CharGen Face Preset"),
                                (0x00000008, "Respawn"),
                                (0x00000010, "Auto Calc Stats"),
                                (0x00000020, "Unique"),
                                (0x00000040, "Doesn't Affect Stealth Meter"),
                                (0x00000080, "PC Level Mult"),
                                (0x00000100, "Audio Template"),
                                (0x00000800, "Protected"),
                                (0x00004000, "Summonable"),
                                (0x00010000, "Doesn't Bleed"),
                                (0x00040000, "Owned/Follow"),
                                (0x00080000, "Opposite Gender Anims"),
                                (0x00100000, "Simple Actor"),
                                (0x00200000, "Looped Script"),
                                (0x10000000, "Looped Audio"),
                                (0x20000000, "Ghost/Non-Interactable"),
                                (0x80000000, "Invulnerable"),
                            ],
                            flags: true,
                        },
                    ),
                    StructField::new("Magicka Offset", TypeKind::Integer { size: 2, signed: true }),
                    StructField::new("Stamina Offset", TypeKind::Integer { size: 2, signed: true }),
                    StructField::new("Level", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Calc Min Level", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Calc Max Level", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Speed Multiplier", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new("Disposition Base", TypeKind::Integer { size: 2, signed: false }),
                    StructField::new(
                        "Template Data Flags",
                        TypeKind::Enum {
                            size: 2,
                            entries: vec![
                                (0x0001, "Use Traits"),
                                (0x0002, "Use Stats"),
                                (0x0004, "Use Factions"),
                                (0x0008, "Use Spell List"),
                                (0x0010, "Use AI Data"),
                                (0x0020, "Use AI Packages"),
                                (0x0040, "Unknown 0x40"),
                                (0x0080, "Use Base Data"),
                                (0x0100, "Use Inventory"),
                                (0x0200, "Use Script"),
                                (0x0400, "Use Def Pack List"),
                                (0x0800, "Use Attack Data"),
                                (0x1000, "Use Keywords"),
                            ],
                            flags: true,
                        },
                    ),
                    StructField::new("Health Offset", TypeKind::Integer { size: 2, signed: true }),
                    StructField::new("Bleedout Override", TypeKind::Integer { size: 2, signed: false }),
                ],
                "Base Stats",
            ),
            formid(b"VTCK", "Voice Type"),
            formid(b"TPLT", "Template"),
            formid(b"RACE", "Race"),
            formid(b"ATKR", "Attack Race"),
            formid(b"PNAM", "Head Part"),
            formid(b"HCLF", "Hair Color"),
            formid(b"ZNAM", "Combat Style"),
            float(b"NAM6", 4, "Height"),
            float(b"NAM7", 4, "Weight"),
            enum_field(
                b"NAM8",
                4,
                vec![(0, "Loud"), (1, "Normal"), (2, "Silent"), (3, "Very Loud")],
                "Sound Level",
            ),
            formid(b"DOFT", "Default Outfit"),
            formid(b"DPLT", "Default Package List"),
            formid(b"FTST", "Face Texture Set"),
        ],
        flags: vec![],
    }
}

fn info_schema() -> RecordSchema {
    RecordSchema {
        comment: "Topic Info",
        fields: vec![
            struct_field(
                b"ENAM",
                vec![
                    StructField::new(
                        "Flags",
                        TypeKind::Enum {
                            size: 2,
                            entries: vec![
                                (0x0001, "Goodbye"),
                                (0x0002, "Random"),
                                (0x0004, "Say Once"),
                                (0x0010, "On Activation"),
                                (0x0020, "Random End"),
                                (0x0040, "Invisible Continue"),
                                (0x0080, "Walk Away"),
                                (0x0100, "Walk Away Invisible In Menu"),
                                (0x0200, "Force Subtitle"),
                                (0x0400, "Can Move While Greeting"),
                                (0x0800, "Has No Lip File"),
                                (0x1000, "Requires Post-Processing"),
                                (0x4000, "Has Audio Output Override"),
                                (0x8000, "Spends Favor Points"),
                            ],
                            flags: true,
                        },
                    ),
                    StructField::new("Hours Until Reset", TypeKind::Integer { size: 2, signed: false }),
                ],
                "Data",
            ),
            formid(b"PNAM", "Previous Info"),
            int(b"CNAM", 1, false, "Favor Level"),
            formid(b"TCLT", "Topic Links"),
            lstring(b"NAM1", "Response"),
            zstring(b"NAM2", "Notes"),
            zstring(b"NAM3", "Edits"),
            lstring(b"RNAM", "Player Response"),
            struct_field(
                b"TRDT",
                vec![
                    StructField::new(
                        "Emotion",
                        TypeKind::Enum {
                            size: 4,
                            entries: vec![
                                (0, "Neutral"),
                                (1, "Anger"),
                                (2, "Disgust"),
                                (3, "Fear"),
                                (4, "Sad"),
                                (5, "Happy"),
                                (6, "Surprise"),
                                (7, "Puzzled"),
                            ],
                            flags: false,
                        },
                    ),
                    StructField::new("Emotion Value", TypeKind::Integer { size: 4, signed: false }),
                    StructField::new("Unused0", TypeKind::Constant(vec![0, 0, 0, 0])),
                    StructField::new("Response Index", TypeKind::Integer { size: 1, signed: false }),
                    StructField::new("Unused1", TypeKind::Constant(vec![0, 0, 0])),
                    StructField::new("Sound", TypeKind::FormID),
                    StructField::new("Use Emotion Animation", TypeKind::Boolean),
                    StructField::new("Unused2", TypeKind::Constant(vec![0, 0, 0])),
                ],
                "Response",
            ),
        ],
        flags: vec![],
    }
}

lazy_static! {
    static ref COMMON_SCHEMA: Vec<FieldSchema> = build_common_schema();
    static ref RECORD_SCHEMAS: HashMap<[u8; 4], RecordSchema> = {
        let mut m = HashMap::new();
        m.insert(*b"TES4", tes4_schema());
        m.insert(*b"WEAP", weap_schema());
        m.insert(*b"QUST", qust_schema());
        m.insert(*b"CELL", cell_schema());
        m.insert(*b"NPC_", npc_schema());
        m.insert(*b"INFO", info_schema());
        m
    };
}

/// Looks up the registered schema for `tag`, if any. Record types without
/// an entry are "unknown but tolerable" (spec.md section 7): callers fall
/// back to treating every field as opaque `ByteArray`.
pub fn record_schema(tag: &[u8; 4]) -> Option<&'static RecordSchema> {
    RECORD_SCHEMAS.get(tag)
}
