//! Text writer (C4): renders the decoded object tree as indented text using
//! the type registry.
//!
//! Every emission rule here has a mirror-image parsing rule in
//! [`crate::reader`]; the two modules are meant to be read side by side.

use crate::error::{decode_failed, PluginError};
use crate::model::{FormId, Group, GroupChild, GroupKind, Plugin, Record};
use crate::options::ConversionOptions;
use crate::rle::rle_encode;
use crate::schema::{self, FieldSchema, RecordSchema, StructField, TypeKind};

const HEADER: &str = "plugin2text version 1.00\n---\n";
const INDENT_UNIT: &str = "  ";

/// The fixed byte width of a [`TypeKind`] that has one, independent of the
/// bytes it is applied to. Every `TypeKind` actually nested inside a
/// registry `Struct` has a fixed width - variable-length kinds only ever
/// appear as a whole field's own top-level kind.
fn kind_size(kind: &TypeKind) -> Option<usize> {
    match kind {
        TypeKind::Integer { size, .. } => Some(*size as usize),
        TypeKind::Float { size } => Some(*size as usize),
        TypeKind::Boolean => Some(1),
        TypeKind::FormID => Some(4),
        TypeKind::ByteArrayFixed(n) => Some(*n),
        TypeKind::Constant(bytes) => Some(bytes.len()),
        TypeKind::Enum { size, .. } => Some(*size as usize),
        TypeKind::Vector3 => Some(12),
        TypeKind::Filter { inner, .. } => kind_size(inner),
        _ => None,
    }
}

fn format_hex(value: u64, byte_size: usize) -> String {
    format!("{:0width$X}", value, width = byte_size * 2)
}

fn read_uint(data: &[u8], size: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf[..size].copy_from_slice(&data[..size]);
    u64::from_le_bytes(buf)
}

fn read_int(data: &[u8], size: usize) -> i64 {
    match size {
        1 => data[0] as i8 as i64,
        2 => i16::from_le_bytes([data[0], data[1]]) as i64,
        4 => i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as i64,
        8 => i64::from_le_bytes(data[..8].try_into().unwrap()),
        _ => unreachable!("integer size must be 1, 2, 4, or 8"),
    }
}

/// Finds the field schema's type kind, first in the record's own schema,
/// then the common schema, returning `None` for an unrecognised field - the
/// caller then treats it as opaque `ByteArray`, per spec.md section 7.
fn field_kind(record_tag: &[u8; 4], field_tag: &[u8; 4]) -> Option<TypeKind> {
    if let Some(record) = schema::record_schema(record_tag) {
        if let Some(FieldSchema::Leaf { kind, .. }) = record.find_field(field_tag) {
            return Some(kind.clone());
        }
    }
    let common = schema::common_schema();
    common.iter().find_map(|f| match f.find(field_tag) {
        Some(FieldSchema::Leaf { kind, .. }) => Some(kind.clone()),
        _ => None,
    })
}

struct Writer {
    out: String,
    options: ConversionOptions,
}

impl Writer {
    fn push_line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str(INDENT_UNIT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn write_string_value(&mut self, text: &str, indent: usize) {
        if text.contains('"') || text.contains('\r') || text.contains('\n') {
            self.push_line(indent, "\"\"\"");
            let escaped = text.replace('"', "\\\"");
            self.out.push_str(&escaped);
            // always add a line break before the closing marker, even if
            // the text itself ends in one - the reader subtracts exactly
            // one on the way back in, so this round-trips either way
            self.out.push('\n');
            self.push_line(indent, "\"\"\"");
        } else {
            self.push_line(indent, &format!("\"{}\"", text));
        }
    }

    fn zstring_text<'a>(&self, data: &'a [u8], localized_label: &str) -> Result<String, PluginError> {
        if data.last() != Some(&0) {
            return Err(decode_failed(format!(
                "{}: expected a NUL-terminated string, core only supports non-localized plugins",
                localized_label
            )));
        }
        Ok(String::from_utf8_lossy(&data[..data.len() - 1]).into_owned())
    }

    fn write_items(&mut self, items: &[GroupChild], indent: usize) -> Result<(), PluginError> {
        for item in items {
            match item {
                GroupChild::Record(r) => self.write_record(r, indent)?,
                GroupChild::Group(g) => self.write_group(g, indent)?,
            }
        }
        Ok(())
    }

    fn write_group(&mut self, group: &Group, indent: usize) -> Result<(), PluginError> {
        let qualifier = match group.kind {
            GroupKind::Top(tag) => String::from_utf8_lossy(&tag).into_owned(),
            GroupKind::WorldChildren(id)
            | GroupKind::CellChildren(id)
            | GroupKind::CellPersistentChildren(id)
            | GroupKind::CellTemporaryChildren(id)
            | GroupKind::CellVisibleDistantChildren(id)
            | GroupKind::TopicChildren(id) => id.to_string(),
            GroupKind::InteriorCellBlock(i) | GroupKind::InteriorCellSubBlock(i) => i.to_string(),
            GroupKind::ExteriorCellBlock(x, y) | GroupKind::ExteriorCellSubBlock(x, y) => {
                format!("({}; {})", x, y)
            }
        };
        self.push_line(indent, &format!("GRUP - {} {}", group.kind.human_name(), qualifier));
        let body_indent = indent + 1;
        if self.options.export_timestamp && group.timestamp != 0 {
            let ts = crate::timestamp::Timestamp::from_bits(group.timestamp).format()?;
            self.push_line(body_indent, &ts);
        }
        if group.unknown != 0 {
            self.push_line(body_indent, &format!("Unknown = {}", format_hex(group.unknown as u64, 2)));
        }
        self.write_items(&group.children, body_indent)?;
        Ok(())
    }

    fn write_record(&mut self, record: &Record, indent: usize) -> Result<(), PluginError> {
        let schema = schema::record_schema(&record.tag);
        let mut header = format!("{} {}", record.tag_str(), record.form_id);
        if record.version != 44 {
            header.push_str(&format!(",v{}", record.version));
        }
        self.push_line(indent, &header);

        let body_indent = indent + 1;
        if let Some(s) = schema {
            if !s.comment.is_empty() {
                self.push_line(body_indent, s.comment);
            }
        }
        if self.options.export_timestamp && record.timestamp != 0 {
            let ts = crate::timestamp::Timestamp::from_bits(record.timestamp).format()?;
            self.push_line(body_indent, &ts);
        }
        if record.unknown != 0 {
            self.push_line(body_indent, &format!("Unknown = {}", format_hex(record.unknown as u64, 2)));
        }
        self.write_flag_lines(record.flags.0, schema, body_indent);

        for field in &record.fields {
            let kind = field_kind(&record.tag, &field.tag).unwrap_or(TypeKind::ByteArray);
            if let TypeKind::Constant(bytes) = &kind {
                if &field.data != bytes {
                    return Err(decode_failed(format!(
                        "{}'s constant payload does not match the schema",
                        field.tag_str()
                    )));
                }
                continue;
            }
            let tag_str = field.tag_str();
            self.push_line(body_indent, &tag_str);
            self.write_value(&kind, &field.data, body_indent + 1, record.tag)?;
        }

        for group in &record.groups {
            self.write_group(group, body_indent)?;
        }
        Ok(())
    }

    fn write_flag_lines(&mut self, value: u32, schema: Option<&RecordSchema>, indent: usize) {
        let mut residual = value;
        if let Some(s) = schema {
            for (bit, name) in &s.flags {
                if *bit != 0 && value & bit == *bit {
                    self.push_line(indent, &format!("+ {}", name));
                    residual &= !bit;
                }
            }
        }
        for (bit, name) in schema::common_flags() {
            if residual & bit == *bit {
                self.push_line(indent, &format!("+ {}", name));
                residual &= !bit;
            }
        }
        if residual != 0 {
            self.push_line(indent, &format!("+ {}", format_hex(residual as u64, 4)));
        }
    }

    fn write_value(
        &mut self,
        kind: &TypeKind,
        data: &[u8],
        indent: usize,
        record_tag: [u8; 4],
    ) -> Result<(), PluginError> {
        match kind {
            TypeKind::ZString => {
                let text = self.zstring_text(data, "ZString")?;
                self.write_string_value(&text, indent);
            }
            TypeKind::LString => {
                let text = self.zstring_text(data, "LString")?;
                self.write_string_value(&text, indent);
            }
            TypeKind::WString => {
                if data.len() < 2 {
                    return Err(decode_failed("WString payload shorter than its length prefix"));
                }
                let len = u16::from_le_bytes([data[0], data[1]]) as usize;
                if data.len() != 2 + len {
                    return Err(decode_failed("WString length prefix does not match payload size"));
                }
                let text = String::from_utf8_lossy(&data[2..]).into_owned();
                self.write_string_value(&text, indent);
            }
            TypeKind::ByteArray | TypeKind::ByteArrayFixed(_) => {
                self.push_line(indent, &hex_encode(data));
            }
            TypeKind::ByteArrayCompressed => {
                self.push_line(indent, &base64::encode(data));
            }
            TypeKind::ByteArrayRLE => {
                self.push_line(indent, &rle_encode(data));
            }
            TypeKind::Integer { size, signed } => {
                let size = *size as usize;
                if data.len() != size {
                    return Err(decode_failed("integer field size does not match its schema"));
                }
                let text = if *signed {
                    read_int(data, size).to_string()
                } else {
                    read_uint(data, size).to_string()
                };
                self.push_line(indent, &text);
            }
            TypeKind::Float { size } => {
                self.push_line(indent, &format_float(data, *size as usize)?);
            }
            TypeKind::Boolean => {
                if data.len() != 1 {
                    return Err(decode_failed("Boolean field is not one byte"));
                }
                self.push_line(indent, if data[0] != 0 { "True" } else { "False" });
            }
            TypeKind::FormID => {
                if data.len() != 4 {
                    return Err(decode_failed("FormID field is not four bytes"));
                }
                let id = FormId(u32::from_le_bytes(data.try_into().unwrap()));
                self.push_line(indent, &id.to_string());
            }
            TypeKind::FormIDArray => {
                if data.len() % 4 != 0 {
                    return Err(decode_failed("FormIDArray length is not a multiple of four"));
                }
                for chunk in data.chunks(4) {
                    let id = FormId(u32::from_le_bytes(chunk.try_into().unwrap()));
                    self.push_line(indent, &id.to_string());
                }
            }
            TypeKind::Struct(fields) => {
                self.write_struct(fields, data, indent, record_tag)?;
            }
            TypeKind::Enum { size, entries, flags } => {
                let size = *size as usize;
                if data.len() != size {
                    return Err(decode_failed("enum field size does not match its schema"));
                }
                let value = read_uint(data, size);
                if *flags {
                    self.write_enum_flags(value, entries, size, indent);
                } else if let Some((_, name)) = entries.iter().find(|(v, _)| *v as u64 == value) {
                    self.push_line(indent, name);
                } else {
                    self.push_line(indent, &value.to_string());
                }
            }
            TypeKind::Constant(_) => {
                // write_record already filters these out before calling write_value;
                // reachable only if a future schema nests one outside a Struct/Subrecord.
            }
            TypeKind::Filter { inner, preprocess } => {
                let processed = if self.options.preserve_junk {
                    data.to_vec()
                } else {
                    preprocess(data)
                };
                self.write_value(inner, &processed, indent, record_tag)?;
            }
            TypeKind::Vector3 => {
                if data.len() != 12 {
                    return Err(decode_failed("Vector3 field is not twelve bytes"));
                }
                for chunk in data.chunks(4) {
                    self.push_line(indent, &format_float(chunk, 4)?);
                }
            }
            TypeKind::Vmad => {
                self.write_vmad(data, indent, record_tag)?;
            }
        }
        Ok(())
    }

    fn write_struct(
        &mut self,
        fields: &[StructField],
        data: &[u8],
        indent: usize,
        record_tag: [u8; 4],
    ) -> Result<(), PluginError> {
        let mut pos = 0;
        for field in fields {
            let size = kind_size(&field.kind).ok_or_else(|| {
                decode_failed(format!("struct field '{}' has no fixed size", field.name))
            })?;
            if pos + size > data.len() {
                return Err(decode_failed(format!(
                    "struct field '{}' runs past the end of its containing field",
                    field.name
                )));
            }
            let slice = &data[pos..pos + size];
            if let TypeKind::Constant(expected) = &field.kind {
                if slice != expected.as_slice() {
                    return Err(decode_failed(format!(
                        "constant field '{}' does not match its expected bytes",
                        field.name
                    )));
                }
            } else {
                self.push_line(indent, field.name);
                self.write_value(&field.kind, slice, indent + 1, record_tag)?;
            }
            pos += size;
        }
        if pos != data.len() {
            return Err(decode_failed("struct's fields do not consume its entire payload"));
        }
        Ok(())
    }

    fn write_enum_flags(&mut self, value: u64, entries: &[(u32, &'static str)], size: usize, indent: usize) {
        let mut residual = value;
        for (bit, name) in entries {
            let bit = *bit as u64;
            if bit != 0 && value & bit == bit {
                self.push_line(indent, &format!("+ {}", name));
                residual &= !bit;
            }
        }
        if residual != 0 {
            self.push_line(indent, &format!("+ {}", format_hex(residual, size)));
        }
    }

    fn write_vmad(&mut self, data: &[u8], indent: usize, record_tag: [u8; 4]) -> Result<(), PluginError> {
        let vmad = schema::read_vmad(data, record_tag)?;
        self.push_line(indent, &format!("Version {}", vmad.version));
        self.push_line(indent, &format!("Object Format {}", vmad.object_format));
        for script in &vmad.scripts {
            self.push_line(indent, "Script");
            let inner = indent + 1;
            self.push_line(inner, "Name");
            self.write_string_value(&script.name, inner + 1);
            if let Some(status) = script.status {
                self.push_line(inner, "Status");
                self.push_line(inner + 1, &status.to_string());
            }
            self.push_line(inner, "Properties");
            for prop in &script.properties {
                self.push_line(inner + 1, "Property");
                let prop_indent = inner + 2;
                self.push_line(prop_indent, "Name");
                self.write_string_value(&prop.name, prop_indent + 1);
                if let Some(status) = prop.status {
                    self.push_line(prop_indent, "Status");
                    self.push_line(prop_indent + 1, &status.to_string());
                }
                self.push_line(prop_indent, "Value");
                self.write_vmad_value(&prop.value, prop_indent + 1);
            }
        }
        if let Some(info) = &vmad.info_extension {
            self.push_line(indent, "Info Extension");
            let inner = indent + 1;
            self.push_line(inner, "Flags");
            self.push_line(inner + 1, &format_hex(info.flags as u64, 1));
            self.push_line(inner, "Script Name");
            self.write_string_value(&info.script_name, inner + 1);
            if let Some(frag) = &info.begin_fragment {
                self.push_line(inner, "Begin Fragment");
                self.write_vmad_fragment(frag, inner + 1);
            }
            if let Some(frag) = &info.end_fragment {
                self.push_line(inner, "End Fragment");
                self.write_vmad_fragment(frag, inner + 1);
            }
        }
        if let Some(quest) = &vmad.quest_extension {
            self.push_line(indent, "Quest Extension");
            let inner = indent + 1;
            self.push_line(inner, "File Name");
            self.write_string_value(&quest.file_name, inner + 1);
            self.push_line(inner, "Fragments");
            for frag in &quest.fragments {
                self.push_line(inner + 1, "Fragment");
                let fi = inner + 2;
                self.push_line(fi, "Index");
                self.push_line(fi + 1, &frag.index.to_string());
                self.push_line(fi, "Log Entry");
                self.push_line(fi + 1, &frag.log_entry.to_string());
                self.push_line(fi, "Script Name");
                self.write_string_value(&frag.script_name, fi + 1);
                self.push_line(fi, "Function Name");
                self.write_string_value(&frag.function_name, fi + 1);
            }
            self.push_line(inner, "Aliases");
            for alias in &quest.aliases {
                self.push_line(inner + 1, "Alias");
                let ai = inner + 2;
                self.push_line(ai, "Value");
                self.write_vmad_value(&alias.value, ai + 1);
                self.push_line(ai, "Version");
                self.push_line(ai + 1, &alias.version.to_string());
                self.push_line(ai, "Object Format");
                self.push_line(ai + 1, &alias.object_format.to_string());
                self.push_line(ai, "Scripts");
                for script in &alias.scripts {
                    self.push_line(ai + 1, "Script");
                    let si = ai + 2;
                    self.push_line(si, "Name");
                    self.write_string_value(&script.name, si + 1);
                    if let Some(status) = script.status {
                        self.push_line(si, "Status");
                        self.push_line(si + 1, &status.to_string());
                    }
                    self.push_line(si, "Properties");
                    for prop in &script.properties {
                        self.push_line(si + 1, "Property");
                        let pi = si + 2;
                        self.push_line(pi, "Name");
                        self.write_string_value(&prop.name, pi + 1);
                        if let Some(status) = prop.status {
                            self.push_line(pi, "Status");
                            self.push_line(pi + 1, &status.to_string());
                        }
                        self.push_line(pi, "Value");
                        self.write_vmad_value(&prop.value, pi + 1);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_vmad_fragment(&mut self, frag: &schema::VmadFragment, indent: usize) {
        self.push_line(indent, "Script Name");
        self.write_string_value(&frag.script_name, indent + 1);
        self.push_line(indent, "Fragment Name");
        self.write_string_value(&frag.fragment_name, indent + 1);
    }

    fn write_vmad_value(&mut self, value: &schema::VmadValue, indent: usize) {
        use schema::VmadValue;
        match value {
            VmadValue::Object { form_id, alias } => {
                self.push_line(indent, "Object");
                self.push_line(indent + 1, "FormID");
                self.push_line(indent + 2, &form_id.to_string());
                self.push_line(indent + 1, "Alias");
                self.push_line(indent + 2, &alias.to_string());
            }
            VmadValue::String(s) => {
                self.push_line(indent, "String");
                self.write_string_value(s, indent + 1);
            }
            VmadValue::Int(i) => {
                self.push_line(indent, "Int");
                self.push_line(indent + 1, &i.to_string());
            }
            VmadValue::Float(f) => {
                self.push_line(indent, "Float");
                self.push_line(indent + 1, &f.to_string());
            }
            VmadValue::Bool(b) => {
                self.push_line(indent, "Bool");
                self.push_line(indent + 1, if *b { "True" } else { "False" });
            }
            VmadValue::Array(items) => {
                self.push_line(indent, "Array");
                for item in items {
                    self.write_vmad_value(item, indent + 1);
                }
            }
        }
    }
}

fn format_float(data: &[u8], size: usize) -> Result<String, PluginError> {
    match size {
        4 => {
            if data.len() != 4 {
                return Err(decode_failed("Float field is not four bytes"));
            }
            Ok(format!("{}", f32::from_le_bytes(data.try_into().unwrap())))
        }
        8 => {
            if data.len() != 8 {
                return Err(decode_failed("Float field is not eight bytes"));
            }
            Ok(format!("{}", f64::from_le_bytes(data.try_into().unwrap())))
        }
        other => Err(decode_failed(format!("unsupported float size {}", other))),
    }
}

fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for b in data {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Renders a whole plugin object tree as text, per spec.md section 4.4.
pub fn write_plugin_text(plugin: &Plugin, options: ConversionOptions) -> Result<String, PluginError> {
    let mut writer = Writer {
        out: String::from(HEADER),
        options,
    };
    writer.write_items(&plugin.items, 0)?;
    Ok(writer.out)
}
