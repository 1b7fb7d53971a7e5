//! End-to-end binary -> text -> binary scenarios, each covering one shape
//! of the format that a single-module unit test can't exercise on its own.

use std::io::Write as _;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use plugintext::model::COMPRESSED_BIT;
use plugintext::schema::{record_schema, FieldSchema, TypeKind};
use plugintext::ConversionOptions;

fn zstring_bytes(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn record_bytes(
    tag: &[u8; 4],
    form_id: u32,
    flags: u32,
    timestamp: u16,
    version: u16,
    fields: &[([u8; 4], Vec<u8>)],
) -> Vec<u8> {
    let mut payload = Vec::new();
    for (field_tag, data) in fields {
        payload.extend_from_slice(field_tag);
        payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
        payload.extend_from_slice(data);
    }
    let mut out = Vec::new();
    out.extend_from_slice(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&form_id.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // unknown_version
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // unknown
    out.extend_from_slice(&payload);
    out
}

fn compressed_record_bytes(
    tag: &[u8; 4],
    form_id: u32,
    version: u16,
    fields: &[([u8; 4], Vec<u8>)],
) -> Vec<u8> {
    let mut payload = Vec::new();
    for (field_tag, data) in fields {
        payload.extend_from_slice(field_tag);
        payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
        payload.extend_from_slice(data);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(7));
    encoder.write_all(&payload).unwrap();
    let deflated = encoder.finish().unwrap();

    let mut compressed_payload = Vec::new();
    compressed_payload.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    compressed_payload.extend_from_slice(&deflated);

    let mut out = Vec::new();
    out.extend_from_slice(tag);
    out.extend_from_slice(&(compressed_payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&COMPRESSED_BIT.to_le_bytes());
    out.extend_from_slice(&form_id.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // timestamp
    out.extend_from_slice(&0u16.to_le_bytes()); // unknown_version
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // unknown
    out.extend_from_slice(&compressed_payload);
    out
}

/// A schema-driven, round-trip-safe filler for a leaf field's raw bytes.
/// Picks concrete, non-pathological values (no NaN/Inf floats) so the
/// written text is guaranteed to parse back to the exact same bytes.
fn fixture_bytes(kind: &TypeKind) -> Vec<u8> {
    match kind {
        TypeKind::Constant(bytes) => bytes.clone(),
        TypeKind::Struct(fields) => fields.iter().flat_map(|f| fixture_bytes(&f.kind)).collect(),
        TypeKind::Integer { size, .. } => 7i64.to_le_bytes()[..*size as usize].to_vec(),
        TypeKind::Float { size: 4 } => 1.5f32.to_le_bytes().to_vec(),
        TypeKind::Float { size: 8 } => 1.5f64.to_le_bytes().to_vec(),
        TypeKind::Boolean => vec![1],
        TypeKind::FormID => 0x0010_2030u32.to_le_bytes().to_vec(),
        TypeKind::Enum { size, .. } => vec![0u8; *size as usize],
        TypeKind::ByteArrayFixed(n) => vec![0xab; *n],
        TypeKind::Vector3 => [1.0f32, 2.0, 3.0].iter().flat_map(|f| f.to_le_bytes()).collect(),
        TypeKind::Filter { inner, .. } => fixture_bytes(inner),
        other => panic!("fixture_bytes: unsupported kind for this fixture: {:?}", other),
    }
}

fn leaf_kind<'a>(schema_fields: &'a [FieldSchema], tag: &[u8; 4]) -> &'a TypeKind {
    match schema_fields.iter().find_map(|f| f.find(tag)) {
        Some(FieldSchema::Leaf { kind, .. }) => kind,
        _ => panic!("no leaf schema for tag {:?}", tag),
    }
}

#[test]
fn empty_plugin_with_seven_header_fields_round_trips() {
    let hedr = {
        let mut bytes = 1.0f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&123i32.to_le_bytes());
        bytes.extend_from_slice(&0x0000_1000u32.to_le_bytes());
        bytes
    };
    let fields = vec![
        (*b"EDID", zstring_bytes("TestHeader")),
        (*b"HEDR", hedr),
        (*b"MAST", zstring_bytes("Skyrim.esm")),
        (*b"DATA", vec![0u8; 8]),
        (*b"CNAM", zstring_bytes("Test Author")),
        (*b"INTV", 5u32.to_le_bytes().to_vec()),
        (*b"SNAM", zstring_bytes("Test description")),
    ];
    assert_eq!(fields.len(), 7);
    let bytes = record_bytes(b"TES4", 0, 0, 0, 44, &fields);

    let options = ConversionOptions::default();
    let text = plugintext::binary_to_text(&bytes, options).unwrap();
    assert!(text.starts_with("plugin2text version 1.00\n---\n"));
    assert!(text.contains("TES4 [00000000]"));

    let round_tripped = plugintext::text_to_binary(&text, options).unwrap();
    assert_eq!(round_tripped, bytes);

    assert!(text.contains("MAST"));
    assert!(!text.contains("DATA"));
}

#[test]
fn tes4_master_with_non_zero_data_payload_is_rejected() {
    let fields = vec![
        (*b"MAST", zstring_bytes("Skyrim.esm")),
        (*b"DATA", vec![1u8; 8]),
    ];
    let bytes = record_bytes(b"TES4", 0, 0, 0, 44, &fields);

    let options = ConversionOptions::default();
    assert!(plugintext::binary_to_text(&bytes, options).is_err());
}

#[test]
fn weapon_dnam_struct_round_trips_without_emitting_its_constant_fillers() {
    let schema = record_schema(b"WEAP").unwrap();
    let tags: [[u8; 4]; 5] = [*b"ETYP", *b"DATA", *b"DNAM", *b"CRDT", *b"VNAM"];
    let fields: Vec<([u8; 4], Vec<u8>)> = tags
        .iter()
        .map(|tag| (*tag, fixture_bytes(leaf_kind(&schema.fields, tag))))
        .collect();
    let bytes = record_bytes(b"WEAP", 0x0001_2345, 0, 0, 44, &fields);

    let options = ConversionOptions::default();
    let text = plugintext::binary_to_text(&bytes, options).unwrap();
    assert!(text.contains("WEAP [00012345]"));
    // the Constant fillers inside DNAM (Unused0..Unused6) never surface as
    // lines of their own
    assert!(!text.contains("Unused0"));
    assert!(!text.contains("Unused6"));

    let round_tripped = plugintext::text_to_binary(&text, options).unwrap();
    assert_eq!(round_tripped, bytes);
}

#[test]
fn compressed_cell_with_nested_byte_array_compressed_field_round_trips() {
    let fields = vec![
        (*b"DATA", 1u16.to_le_bytes().to_vec()), // Interior bit set
        (*b"TVDT", vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03]),
    ];
    let bytes = compressed_record_bytes(b"CELL", 0x0000_0099, 44, &fields);

    let options = ConversionOptions::default();
    let text = plugintext::binary_to_text(&bytes, options).unwrap();
    assert!(text.contains("CELL [00000099]"));

    let round_tripped = plugintext::text_to_binary(&text, options).unwrap();
    assert_eq!(round_tripped, bytes);
}

#[test]
fn npc_timestamp_prints_and_parses_exactly_when_export_timestamp_is_set() {
    let timestamp = plugintext::timestamp::Timestamp {
        year: 2020,
        month: 3,
        day: 21,
    }
    .to_bits();
    let bytes = record_bytes(b"NPC_", 0x0000_00aa, 0, timestamp, 44, &[]);

    let options = ConversionOptions {
        export_timestamp: true,
        ..Default::default()
    };
    let text = plugintext::binary_to_text(&bytes, options).unwrap();
    assert!(text.contains("21 Mar 2020"));

    let round_tripped = plugintext::text_to_binary(&text, options).unwrap();
    assert_eq!(round_tripped, bytes);
}

#[test]
fn multiline_dialogue_field_round_trips_through_triple_quoted_form() {
    let edid = zstring_bytes("line one\nline \"two\"");
    let bytes = record_bytes(b"TES4", 0, 0, 0, 44, &[(*b"EDID", edid)]);

    let options = ConversionOptions::default();
    let text = plugintext::binary_to_text(&bytes, options).unwrap();
    assert!(text.contains("\"\"\""));
    assert!(text.contains("line \\\"two\\\""));

    let round_tripped = plugintext::text_to_binary(&text, options).unwrap();
    assert_eq!(round_tripped, bytes);
}

#[test]
fn vmad_on_info_round_trips_begin_and_end_fragment_markers() {
    use plugintext::schema::{VmadData, VmadFragment, VmadInfoExtension, VmadProperty, VmadScript, VmadValue};

    let vmad = VmadData {
        version: 5,
        object_format: 2,
        scripts: vec![VmadScript {
            name: String::from("TIF__000123"),
            status: Some(1),
            properties: vec![VmadProperty {
                name: String::from("Target"),
                status: Some(1),
                value: VmadValue::Object {
                    form_id: plugintext::model::FormId(0x0001_2345),
                    alias: 0,
                },
            }],
        }],
        info_extension: Some(VmadInfoExtension {
            flags: 0x3,
            script_name: String::from("TIF__000123"),
            begin_fragment: Some(VmadFragment {
                script_name: String::from("TIF__000123"),
                fragment_name: String::from("Fragment_0"),
            }),
            end_fragment: Some(VmadFragment {
                script_name: String::from("TIF__000123"),
                fragment_name: String::from("Fragment_1"),
            }),
        }),
        quest_extension: None,
    };
    let vmad_bytes = plugintext::schema::write_vmad(&vmad);
    let bytes = record_bytes(b"INFO", 0x0000_00bb, 0, 0, 44, &[(*b"VMAD", vmad_bytes)]);

    let options = ConversionOptions::default();
    let text = plugintext::binary_to_text(&bytes, options).unwrap();
    assert!(text.contains("Fragment_0"));
    assert!(text.contains("Fragment_1"));

    let round_tripped = plugintext::text_to_binary(&text, options).unwrap();
    assert_eq!(round_tripped, bytes);
}
