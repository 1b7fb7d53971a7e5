//! Text reader (C5): parses the indented text format back into a plugin
//! byte stream, without ever materialising the object tree from
//! `crate::model` - each record/group/field is framed directly into the
//! output arena as its text block closes.
//!
//! Every parsing rule here is the mirror image of an emission rule in
//! [`crate::writer`]; the two modules are meant to be read side by side.

use std::io::Write as _;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::arena::{OutputArena, ScratchArena, ScratchCheckpoint};
use crate::error::{decode_failed, decode_failed_because, PluginError};
use crate::model::{FormId, COMPRESSED_BIT};
use crate::options::ConversionOptions;
use crate::rle::rle_decode;
use crate::schema::{self, FieldSchema, RecordSchema, StructField, TypeKind};

const HEADER_LINE_1: &str = "plugin2text version 1.00";
const HEADER_LINE_2: &str = "---";
const HEADER_LEN: usize = 24;

/// Splits a line into its indent depth (number of leading two-space units)
/// and the text that follows, mirroring the writer's `push_line`.
fn split_indent(line: &str) -> (usize, &str) {
    let mut n = 0;
    loop {
        let start = n * 2;
        if line.len() >= start + 2 && &line[start..start + 2] == "  " {
            n += 1;
        } else {
            break;
        }
    }
    (n, &line[n * 2..])
}

/// A pre-split view of the document, indexed by line number; lines are
/// consumed strictly in order, never re-split once read.
struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Lines {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let line = self.peek();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }
}

fn expect_header(lines: &mut Lines) -> Result<(), PluginError> {
    match lines.next() {
        Some(l) if l == HEADER_LINE_1 => {}
        Some(other) => {
            return Err(decode_failed(format!(
                "unrecognised plugin2text header line '{}'",
                other
            )))
        }
        None => return Err(decode_failed("empty document, expected a plugin2text header")),
    }
    match lines.next() {
        Some(l) if l == HEADER_LINE_2 => {}
        Some(other) => {
            return Err(decode_failed(format!(
                "expected '---' after the header line, found '{}'",
                other
            )))
        }
        None => return Err(decode_failed("missing '---' header separator")),
    }
    Ok(())
}

struct Reader<'a> {
    lines: Lines<'a>,
    options: ConversionOptions,
    output: OutputArena,
    scratch: ScratchArena,
    in_compressed_record: bool,
}

impl<'a> Reader<'a> {
    fn peek_indent(&self) -> Option<usize> {
        self.lines.peek().map(|l| split_indent(l).0)
    }

    fn peek_body_at(&self, indent: usize) -> Option<&'a str> {
        self.lines.peek().and_then(|l| {
            let (n, body) = split_indent(l);
            if n == indent {
                Some(body)
            } else {
                None
            }
        })
    }

    fn try_continue_current_indent(&self, indent: usize) -> bool {
        self.peek_indent() == Some(indent)
    }

    fn expect_line(&mut self, indent: usize) -> Result<(usize, &'a str), PluginError> {
        let raw = self
            .lines
            .next()
            .ok_or_else(|| decode_failed(format!("expected a line at indent {}, found end of document", indent)))?;
        let (n, body) = split_indent(raw);
        if n != indent {
            return Err(decode_failed(format!(
                "expected indent {}, found indent {} ('{}')",
                indent, n, body
            )));
        }
        Ok((n, body))
    }

    fn expect_tag(&mut self, indent: usize, expected: &str) -> Result<(), PluginError> {
        let (_, line) = self.expect_line(indent)?;
        if line != expected {
            return Err(decode_failed(format!("expected '{}', found '{}'", expected, line)));
        }
        Ok(())
    }

    /// Runs `f` against a fresh, isolated output buffer and returns both
    /// `f`'s result and the bytes it wrote, restoring the reader's real
    /// output arena afterwards. Used to render one child of a sortable
    /// group in isolation so its bytes can be reordered before they are
    /// committed to the real stream.
    fn render_sub<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, PluginError>,
    ) -> Result<(T, Vec<u8>), PluginError> {
        let saved = std::mem::replace(&mut self.output, OutputArena::new());
        let result = f(self);
        let rendered = std::mem::replace(&mut self.output, saved);
        let value = result?;
        Ok((value, rendered.into_vec()))
    }

    fn read_items(&mut self, indent: usize) -> Result<(), PluginError> {
        while self.try_continue_current_indent(indent) {
            self.read_item(indent)?;
        }
        Ok(())
    }

    /// Like [`read_items`](Self::read_items), but buffers each child's
    /// bytes separately so they can be sorted ascending by form id before
    /// being committed, per the ordering rule for `CellPersistentChildren`/
    /// `CellTemporaryChildren` groups.
    fn read_sorted_items(&mut self, indent: usize) -> Result<(), PluginError> {
        let mut entries: Vec<(Option<FormId>, Vec<u8>)> = Vec::new();
        while self.try_continue_current_indent(indent) {
            let (form_id, bytes) = self.render_sub(|r| r.read_item(indent))?;
            entries.push((form_id, bytes));
        }
        if !self.options.preserve_record_order {
            let mut seen = std::collections::HashSet::new();
            for (id, _) in &entries {
                if let Some(id) = id {
                    if !seen.insert(*id) {
                        return Err(decode_failed(format!(
                            "duplicate form id {} in ordered cell-children group",
                            id
                        )));
                    }
                }
            }
            entries.sort_by_key(|(id, _)| id.map(|f| f.0).unwrap_or(u32::MAX));
        }
        for (_, bytes) in entries {
            self.output.write_bytes(&bytes);
        }
        Ok(())
    }

    /// Reads one top-level item (a group header line or a record header
    /// line) at `indent`, returning the record's form id if it was a plain
    /// record, or `None` if it was a group.
    fn read_item(&mut self, indent: usize) -> Result<Option<FormId>, PluginError> {
        let (_, body) = self.expect_line(indent)?;
        if let Some(rest) = body.strip_prefix("GRUP - ") {
            self.read_group(indent, rest)?;
            Ok(None)
        } else {
            let (form_id, _tag) = self.read_record(indent, body)?;
            Ok(Some(form_id))
        }
    }

    /// Reads a `GRUP - ...` body, returning the [`GroupKind`](crate::model::GroupKind)
    /// it ended up with. A `Top` group whose qualifier was omitted defers
    /// that decision to [`Self::read_items_inferring_top_label`].
    fn read_group(&mut self, indent: usize, body: &str) -> Result<crate::model::GroupKind, PluginError> {
        let (name, qualifier) = parse_group_header(body)?;
        let kind = group_kind_from_text(name, qualifier)?;

        let offset = self.output.advance(HEADER_LEN);
        let child_indent = indent + 1;

        let mut timestamp = 0u16;
        if let Some(line) = self.peek_body_at(child_indent) {
            if let Ok(ts) = crate::timestamp::Timestamp::parse(line) {
                timestamp = ts.to_bits();
                self.expect_line(child_indent)?;
            }
        }
        let mut unknown = 0u16;
        if let Some(line) = self.peek_body_at(child_indent) {
            if let Some(hex) = line.strip_prefix("Unknown = ") {
                unknown = u16::from_str_radix(hex, 16)
                    .map_err(|_| decode_failed(format!("invalid Unknown hex value '{}'", hex)))?;
                self.expect_line(child_indent)?;
            }
        }

        let resolved_kind = match kind {
            Some(k) if k.is_ordered_cell_children() => {
                self.read_sorted_items(child_indent)?;
                k
            }
            Some(k) => {
                self.read_items(child_indent)?;
                k
            }
            None => self.read_items_inferring_top_label(child_indent)?,
        };
        let group_size = (self.output.len() - offset) as u32;
        let (label, group_type) = group_label_and_type(resolved_kind);

        self.output.patch(offset, b"GRUP");
        self.output.patch(offset + 4, &group_size.to_le_bytes());
        self.output.patch(offset + 8, &label.to_le_bytes());
        self.output.patch(offset + 12, &group_type.to_le_bytes());
        self.output.patch(offset + 16, &timestamp.to_le_bytes());
        self.output.patch(offset + 18, &0u16.to_le_bytes()); // unknown_version
        self.output.patch(offset + 20, &44u16.to_le_bytes()); // version
        self.output.patch(offset + 22, &unknown.to_le_bytes());
        Ok(resolved_kind)
    }

    /// Reads the children of a `Top` group whose qualifier was left out of
    /// the text, inferring the label from the first child exactly as
    /// `text_to_esp` does: a plain record sets the label to its own type
    /// tag (every later sibling must share it); an `InteriorCellBlock` or
    /// `WorldChildren` child group forces `CELL`/`WRLD` instead. A `Top`
    /// group with no children has nothing to infer from and is rejected.
    fn read_items_inferring_top_label(&mut self, indent: usize) -> Result<crate::model::GroupKind, PluginError> {
        use crate::model::GroupKind;
        let mut inferred: Option<[u8; 4]> = None;
        while self.try_continue_current_indent(indent) {
            let (_, body) = self.expect_line(indent)?;
            let forced = if let Some(rest) = body.strip_prefix("GRUP - ") {
                match self.read_group(indent, rest)? {
                    GroupKind::InteriorCellBlock(_) => *b"CELL",
                    GroupKind::WorldChildren(_) => *b"WRLD",
                    other => {
                        return Err(decode_failed(format!(
                            "a Top group with an omitted label cannot infer one from a '{}' child group",
                            other.human_name()
                        )))
                    }
                }
            } else {
                let (_, tag) = self.read_record(indent, body)?;
                tag
            };
            match inferred {
                None => inferred = Some(forced),
                Some(tag) if tag == forced => {}
                Some(tag) => {
                    return Err(decode_failed(format!(
                        "Top group's inferred label '{}' does not match child tag '{}'",
                        String::from_utf8_lossy(&tag),
                        String::from_utf8_lossy(&forced),
                    )))
                }
            }
        }
        inferred.map(GroupKind::Top).ok_or_else(|| {
            decode_failed("a Top group with an omitted label needs at least one child to infer it from")
        })
    }

    fn read_record(&mut self, indent: usize, header: &str) -> Result<(FormId, [u8; 4]), PluginError> {
        let mut parts = header.splitn(2, ' ');
        let tag_str = parts
            .next()
            .ok_or_else(|| decode_failed("missing record tag"))?;
        let rest = parts
            .next()
            .ok_or_else(|| decode_failed(format!("record header '{}' is missing a form id", header)))?;
        let tag = tag_bytes(tag_str)?;

        let (form_part, version) = match rest.split_once(',') {
            Some((f, v)) => {
                let v = v
                    .strip_prefix('v')
                    .ok_or_else(|| decode_failed(format!("expected a version clause 'vNN', found '{}'", v)))?;
                let version: u16 = v
                    .parse()
                    .map_err(|_| decode_failed(format!("invalid version number '{}'", v)))?;
                (f, version)
            }
            None => (rest, 44),
        };
        let form_id = parse_form_id(form_part)?;

        let body_indent = indent + 1;
        let schema = schema::record_schema(&tag);

        if let Some(s) = schema {
            if !s.comment.is_empty() {
                if self.peek_body_at(body_indent) == Some(s.comment) {
                    self.expect_line(body_indent)?;
                }
            }
        }

        let mut timestamp = 0u16;
        if let Some(line) = self.peek_body_at(body_indent) {
            if let Ok(ts) = crate::timestamp::Timestamp::parse(line) {
                timestamp = ts.to_bits();
                self.expect_line(body_indent)?;
            }
        }

        let mut unknown = 0u16;
        if let Some(line) = self.peek_body_at(body_indent) {
            if let Some(hex) = line.strip_prefix("Unknown = ") {
                unknown = u16::from_str_radix(hex, 16)
                    .map_err(|_| decode_failed(format!("invalid Unknown hex value '{}'", hex)))?;
                self.expect_line(body_indent)?;
            }
        }

        let mut flags = 0u32;
        loop {
            let line = match self.peek_body_at(body_indent) {
                Some(l) => l,
                None => break,
            };
            let rest = match line.strip_prefix("+ ") {
                Some(r) => r,
                None => break,
            };
            self.expect_line(body_indent)?;
            let mut matched = false;
            if let Some(s) = schema {
                if let Some((bit, _)) = s.flags.iter().find(|(_, name)| *name == rest) {
                    flags |= bit;
                    matched = true;
                }
            }
            if !matched {
                if let Some((bit, _)) = schema::common_flags().iter().find(|(_, name)| *name == rest) {
                    flags |= bit;
                    matched = true;
                }
            }
            if !matched {
                let bit = u32::from_str_radix(rest, 16)
                    .map_err(|_| decode_failed(format!("unrecognised flag '{}'", rest)))?;
                flags |= bit;
            }
        }

        let compressed = flags & COMPRESSED_BIT != 0;
        if compressed && self.in_compressed_record {
            return Err(decode_failed("nested compressed records are not allowed"));
        }
        let was_compressed = self.in_compressed_record;
        self.in_compressed_record = self.in_compressed_record || compressed;

        let field_checkpoint = self.scratch.checkpoint();
        let mut groups_bytes = Vec::new();

        loop {
            if !self.try_continue_current_indent(body_indent) {
                break;
            }
            let peeked = self.peek_body_at(body_indent).unwrap();
            if peeked.starts_with("GRUP - ") {
                let (_, bytes) = self.render_sub(|r| r.read_item(body_indent))?;
                groups_bytes.extend_from_slice(&bytes);
            } else {
                let (_, tag_line) = self.expect_line(body_indent)?;
                let field_tag = tag_bytes(tag_line)?;
                let kind = field_kind(&tag, &field_tag).unwrap_or(TypeKind::ByteArray);
                let payload = self.read_value(&kind, body_indent + 1, tag)?;
                if payload.len() > u16::MAX as usize {
                    return Err(decode_failed(format!(
                        "field '{}' payload of {} bytes exceeds the 16-bit length prefix",
                        tag_line,
                        payload.len()
                    )));
                }
                self.scratch.write_bytes(&field_tag);
                self.scratch.write_bytes(&(payload.len() as u16).to_le_bytes());
                self.scratch.write_bytes(&payload);

                // subrecord-grouped `Constant` siblings never appear in
                // text - the binary still needs them, so synthesize them
                // straight from the schema instead of reading a tag line.
                for (const_tag, const_bytes) in schema::constants_after(&tag, &field_tag) {
                    self.scratch.write_bytes(&const_tag);
                    self.scratch.write_bytes(&(const_bytes.len() as u16).to_le_bytes());
                    self.scratch.write_bytes(&const_bytes);
                }
            }
        }

        let field_bytes = self.scratch.since(field_checkpoint).to_vec();
        self.restore_scratch(field_checkpoint)?;
        self.in_compressed_record = was_compressed;

        let record_offset = self.output.advance(HEADER_LEN);
        let data_size: u32;
        if compressed {
            let uncompressed_size = field_bytes.len() as u32;
            if uncompressed_size == 0 {
                return Err(decode_failed("a compressed record cannot have zero uncompressed size"));
            }
            let compressed_bytes = deflate(&field_bytes)?;
            self.output.write_bytes(&uncompressed_size.to_le_bytes());
            self.output.write_bytes(&compressed_bytes);
            data_size = 4 + compressed_bytes.len() as u32;
        } else {
            self.output.write_bytes(&field_bytes);
            data_size = field_bytes.len() as u32;
        }
        self.output.write_bytes(&groups_bytes);

        self.output.patch(record_offset, &tag);
        self.output.patch(record_offset + 4, &data_size.to_le_bytes());
        self.output.patch(record_offset + 8, &flags.to_le_bytes());
        self.output.patch(record_offset + 12, &form_id.0.to_le_bytes());
        self.output.patch(record_offset + 16, &timestamp.to_le_bytes());
        self.output.patch(record_offset + 18, &0u16.to_le_bytes());
        self.output.patch(record_offset + 20, &version.to_le_bytes());
        self.output.patch(record_offset + 22, &unknown.to_le_bytes());

        Ok((form_id, tag))
    }

    fn restore_scratch(&mut self, checkpoint: ScratchCheckpoint) -> Result<(), PluginError> {
        self.scratch.restore(checkpoint)
    }

    fn read_string_value(&mut self, indent: usize, label: &str) -> Result<String, PluginError> {
        let (_, body) = self.expect_line(indent)?;
        if body == "\"\"\"" {
            let closing = format!("{}\"\"\"", "  ".repeat(indent));
            let mut content_lines = Vec::new();
            loop {
                let raw = self
                    .lines
                    .next()
                    .ok_or_else(|| decode_failed(format!("unterminated triple-quoted {} block", label)))?;
                if raw == closing {
                    break;
                }
                content_lines.push(raw);
            }
            Ok(content_lines.join("\n").replace("\\\"", "\""))
        } else if body.len() >= 2 && body.starts_with('"') && body.ends_with('"') {
            Ok(body[1..body.len() - 1].to_string())
        } else {
            Err(decode_failed(format!("expected a quoted {} value, found '{}'", label, body)))
        }
    }

    fn read_wstring_value(&mut self, indent: usize) -> Result<Vec<u8>, PluginError> {
        let text = self.read_string_value(indent, "WString")?;
        let bytes = text.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(decode_failed("WString value too long for its 16-bit length prefix"));
        }
        let mut out = (bytes.len() as u16).to_le_bytes().to_vec();
        out.extend_from_slice(bytes);
        Ok(out)
    }

    fn read_value(&mut self, kind: &TypeKind, indent: usize, record_tag: [u8; 4]) -> Result<Vec<u8>, PluginError> {
        match kind {
            TypeKind::ZString | TypeKind::LString => {
                let label = if matches!(kind, TypeKind::LString) { "LString" } else { "ZString" };
                let text = self.read_string_value(indent, label)?;
                let mut bytes = text.into_bytes();
                bytes.push(0);
                Ok(bytes)
            }
            TypeKind::WString => self.read_wstring_value(indent),
            TypeKind::ByteArray | TypeKind::ByteArrayFixed(_) => {
                let (_, line) = self.expect_line(indent)?;
                hex_decode(line)
            }
            TypeKind::ByteArrayCompressed => {
                let (_, line) = self.expect_line(indent)?;
                base64::decode(line)
                    .map_err(|e| decode_failed_because("invalid base64 in ByteArrayCompressed field", e))
            }
            TypeKind::ByteArrayRLE => {
                let (_, line) = self.expect_line(indent)?;
                rle_decode(line)
            }
            TypeKind::Integer { size, signed } => {
                let (_, line) = self.expect_line(indent)?;
                encode_integer(line, *size, *signed)
            }
            TypeKind::Float { size } => {
                let (_, line) = self.expect_line(indent)?;
                encode_float(line, *size)
            }
            TypeKind::Boolean => {
                let (_, line) = self.expect_line(indent)?;
                match line {
                    "True" => Ok(vec![1]),
                    "False" => Ok(vec![0]),
                    other => Err(decode_failed(format!("expected True/False, found '{}'", other))),
                }
            }
            TypeKind::FormID => {
                let (_, line) = self.expect_line(indent)?;
                Ok(parse_form_id(line)?.0.to_le_bytes().to_vec())
            }
            TypeKind::FormIDArray => {
                let mut out = Vec::new();
                while self.try_continue_current_indent(indent) {
                    let (_, line) = self.expect_line(indent)?;
                    out.extend_from_slice(&parse_form_id(line)?.0.to_le_bytes());
                }
                Ok(out)
            }
            TypeKind::Struct(fields) => self.read_struct(fields, indent, record_tag),
            TypeKind::Enum { size, entries, flags } => {
                if *flags {
                    self.read_enum_flags(entries, *size, indent)
                } else {
                    let (_, line) = self.expect_line(indent)?;
                    let value: u64 = if let Some((v, _)) = entries.iter().find(|(_, n)| *n == line) {
                        *v as u64
                    } else {
                        line.parse()
                            .map_err(|_| decode_failed(format!("invalid enum value '{}'", line)))?
                    };
                    Ok(value.to_le_bytes()[..*size as usize].to_vec())
                }
            }
            TypeKind::Constant(bytes) => Ok(bytes.clone()),
            TypeKind::Filter { inner, .. } => self.read_value(inner, indent, record_tag),
            TypeKind::Vector3 => {
                let mut out = Vec::new();
                for _ in 0..3 {
                    let (_, line) = self.expect_line(indent)?;
                    out.extend_from_slice(&encode_float(line, 4)?);
                }
                Ok(out)
            }
            TypeKind::Vmad => self.read_vmad_block(indent, record_tag),
        }
    }

    fn read_struct(
        &mut self,
        fields: &[StructField],
        indent: usize,
        record_tag: [u8; 4],
    ) -> Result<Vec<u8>, PluginError> {
        let mut out = Vec::new();
        for field in fields {
            if let TypeKind::Constant(bytes) = &field.kind {
                out.extend_from_slice(bytes);
                continue;
            }
            let (_, name_line) = self.expect_line(indent)?;
            if name_line != field.name {
                return Err(decode_failed(format!(
                    "expected struct field '{}', found '{}'",
                    field.name, name_line
                )));
            }
            let value = self.read_value(&field.kind, indent + 1, record_tag)?;
            out.extend_from_slice(&value);
        }
        Ok(out)
    }

    fn read_enum_flags(&mut self, entries: &[(u32, &'static str)], size: u8, indent: usize) -> Result<Vec<u8>, PluginError> {
        let mut value: u64 = 0;
        loop {
            let line = match self.peek_body_at(indent) {
                Some(l) => l,
                None => break,
            };
            let rest = match line.strip_prefix("+ ") {
                Some(r) => r,
                None => break,
            };
            self.expect_line(indent)?;
            if let Some((bit, _)) = entries.iter().find(|(_, n)| *n == rest) {
                value |= *bit as u64;
            } else {
                let bit = u64::from_str_radix(rest, 16)
                    .map_err(|_| decode_failed(format!("unrecognised enum flag '{}'", rest)))?;
                value |= bit;
            }
        }
        Ok(value.to_le_bytes()[..size as usize].to_vec())
    }

    fn read_vmad_script(&mut self, indent: usize) -> Result<schema::VmadScript, PluginError> {
        self.expect_tag(indent, "Name")?;
        let name = self.read_string_value(indent + 1, "VMAD script name")?;
        let status = if self.peek_body_at(indent) == Some("Status") {
            self.expect_line(indent)?;
            let (_, v) = self.expect_line(indent + 1)?;
            Some(
                v.parse()
                    .map_err(|_| decode_failed(format!("invalid VMAD script status '{}'", v)))?,
            )
        } else {
            None
        };
        self.expect_tag(indent, "Properties")?;
        let mut properties = Vec::new();
        let props_indent = indent + 1;
        while self.peek_body_at(props_indent) == Some("Property") {
            self.expect_line(props_indent)?;
            let pi = props_indent + 1;
            self.expect_tag(pi, "Name")?;
            let name = self.read_string_value(pi + 1, "VMAD property name")?;
            let status = if self.peek_body_at(pi) == Some("Status") {
                self.expect_line(pi)?;
                let (_, v) = self.expect_line(pi + 1)?;
                Some(
                    v.parse()
                        .map_err(|_| decode_failed(format!("invalid VMAD property status '{}'", v)))?,
                )
            } else {
                None
            };
            self.expect_tag(pi, "Value")?;
            let value = self.read_vmad_value(pi + 1)?;
            properties.push(schema::VmadProperty { name, status, value });
        }
        Ok(schema::VmadScript { name, status, properties })
    }

    fn read_vmad_fragment(&mut self, indent: usize) -> Result<schema::VmadFragment, PluginError> {
        self.expect_tag(indent, "Script Name")?;
        let script_name = self.read_string_value(indent + 1, "VMAD fragment script name")?;
        self.expect_tag(indent, "Fragment Name")?;
        let fragment_name = self.read_string_value(indent + 1, "VMAD fragment fragment name")?;
        Ok(schema::VmadFragment { script_name, fragment_name })
    }

    fn read_vmad_value(&mut self, indent: usize) -> Result<schema::VmadValue, PluginError> {
        let (_, tag) = self.expect_line(indent)?;
        match tag {
            "Object" => {
                self.expect_tag(indent + 1, "FormID")?;
                let (_, v) = self.expect_line(indent + 2)?;
                let form_id = parse_form_id(v)?;
                self.expect_tag(indent + 1, "Alias")?;
                let (_, v) = self.expect_line(indent + 2)?;
                let alias: u16 = v
                    .parse()
                    .map_err(|_| decode_failed(format!("invalid VMAD object alias '{}'", v)))?;
                Ok(schema::VmadValue::Object { form_id, alias })
            }
            "String" => Ok(schema::VmadValue::String(self.read_string_value(indent + 1, "VMAD string value")?)),
            "Int" => {
                let (_, v) = self.expect_line(indent + 1)?;
                Ok(schema::VmadValue::Int(
                    v.parse().map_err(|_| decode_failed(format!("invalid VMAD int value '{}'", v)))?,
                ))
            }
            "Float" => {
                let (_, v) = self.expect_line(indent + 1)?;
                Ok(schema::VmadValue::Float(
                    v.parse().map_err(|_| decode_failed(format!("invalid VMAD float value '{}'", v)))?,
                ))
            }
            "Bool" => {
                let (_, v) = self.expect_line(indent + 1)?;
                match v {
                    "True" => Ok(schema::VmadValue::Bool(true)),
                    "False" => Ok(schema::VmadValue::Bool(false)),
                    other => Err(decode_failed(format!("expected True/False, found '{}'", other))),
                }
            }
            "Array" => {
                let mut items = Vec::new();
                while self.try_continue_current_indent(indent + 1) {
                    items.push(self.read_vmad_value(indent + 1)?);
                }
                Ok(schema::VmadValue::Array(items))
            }
            other => Err(decode_failed(format!("unrecognised VMAD value kind '{}'", other))),
        }
    }

    fn read_vmad_block(&mut self, indent: usize, record_tag: [u8; 4]) -> Result<Vec<u8>, PluginError> {
        let _ = record_tag;
        let (_, line) = self.expect_line(indent)?;
        let version: u16 = line
            .strip_prefix("Version ")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| decode_failed(format!("expected VMAD 'Version N' line, found '{}'", line)))?;
        let (_, line) = self.expect_line(indent)?;
        let object_format: u16 = line
            .strip_prefix("Object Format ")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| decode_failed(format!("expected VMAD 'Object Format N' line, found '{}'", line)))?;

        let mut scripts = Vec::new();
        while self.peek_body_at(indent) == Some("Script") {
            self.expect_line(indent)?;
            scripts.push(self.read_vmad_script(indent + 1)?);
        }

        let mut info_extension = None;
        if self.peek_body_at(indent) == Some("Info Extension") {
            self.expect_line(indent)?;
            let inner = indent + 1;
            self.expect_tag(inner, "Flags")?;
            let (_, v) = self.expect_line(inner + 1)?;
            let flags = u8::from_str_radix(v, 16).map_err(|_| decode_failed(format!("invalid VMAD info flags '{}'", v)))?;
            self.expect_tag(inner, "Script Name")?;
            let script_name = self.read_string_value(inner + 1, "VMAD info extension script name")?;
            let begin_fragment = if self.peek_body_at(inner) == Some("Begin Fragment") {
                self.expect_line(inner)?;
                Some(self.read_vmad_fragment(inner + 1)?)
            } else {
                None
            };
            let end_fragment = if self.peek_body_at(inner) == Some("End Fragment") {
                self.expect_line(inner)?;
                Some(self.read_vmad_fragment(inner + 1)?)
            } else {
                None
            };
            info_extension = Some(schema::VmadInfoExtension {
                flags,
                script_name,
                begin_fragment,
                end_fragment,
            });
        }

        let mut quest_extension = None;
        if self.peek_body_at(indent) == Some("Quest Extension") {
            self.expect_line(indent)?;
            let inner = indent + 1;
            self.expect_tag(inner, "File Name")?;
            let file_name = self.read_string_value(inner + 1, "VMAD quest extension file name")?;
            self.expect_tag(inner, "Fragments")?;
            let mut fragments = Vec::new();
            let frag_outer = inner + 1;
            while self.peek_body_at(frag_outer) == Some("Fragment") {
                self.expect_line(frag_outer)?;
                let fi = frag_outer + 1;
                self.expect_tag(fi, "Index")?;
                let (_, v) = self.expect_line(fi + 1)?;
                let index: u16 = v.parse().map_err(|_| decode_failed(format!("invalid VMAD fragment index '{}'", v)))?;
                self.expect_tag(fi, "Log Entry")?;
                let (_, v) = self.expect_line(fi + 1)?;
                let log_entry: u32 = v
                    .parse()
                    .map_err(|_| decode_failed(format!("invalid VMAD fragment log entry '{}'", v)))?;
                self.expect_tag(fi, "Script Name")?;
                let script_name = self.read_string_value(fi + 1, "VMAD quest fragment script name")?;
                self.expect_tag(fi, "Function Name")?;
                let function_name = self.read_string_value(fi + 1, "VMAD quest fragment function name")?;
                fragments.push(schema::VmadQuestFragment {
                    index,
                    log_entry,
                    script_name,
                    function_name,
                });
            }
            self.expect_tag(inner, "Aliases")?;
            let mut aliases = Vec::new();
            let alias_outer = inner + 1;
            while self.peek_body_at(alias_outer) == Some("Alias") {
                self.expect_line(alias_outer)?;
                let ai = alias_outer + 1;
                self.expect_tag(ai, "Value")?;
                let value = self.read_vmad_value(ai + 1)?;
                self.expect_tag(ai, "Version")?;
                let (_, v) = self.expect_line(ai + 1)?;
                let alias_version: u16 = v
                    .parse()
                    .map_err(|_| decode_failed(format!("invalid VMAD alias version '{}'", v)))?;
                self.expect_tag(ai, "Object Format")?;
                let (_, v) = self.expect_line(ai + 1)?;
                let alias_object_format: u16 = v
                    .parse()
                    .map_err(|_| decode_failed(format!("invalid VMAD alias object format '{}'", v)))?;
                self.expect_tag(ai, "Scripts")?;
                let mut alias_scripts = Vec::new();
                let script_outer = ai + 1;
                while self.peek_body_at(script_outer) == Some("Script") {
                    self.expect_line(script_outer)?;
                    alias_scripts.push(self.read_vmad_script(script_outer + 1)?);
                }
                aliases.push(schema::VmadQuestAlias {
                    value,
                    version: alias_version,
                    object_format: alias_object_format,
                    scripts: alias_scripts,
                });
            }
            quest_extension = Some(schema::VmadQuestExtension {
                file_name,
                fragments,
                aliases,
            });
        }

        let vmad = schema::VmadData {
            version,
            object_format,
            scripts,
            info_extension,
            quest_extension,
        };
        Ok(schema::write_vmad(&vmad))
    }
}

/// Finds the field schema's type kind, mirroring `writer::field_kind`
/// exactly: the record's own schema first, then the common schema, `None`
/// for an unrecognised tag (read back as opaque `ByteArray`).
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

fn tag_bytes(s: &str) -> Result<[u8; 4], PluginError> {
    let bytes = s.as_bytes();
    if bytes.len() != 4 {
        return Err(decode_failed(format!("tag '{}' is not 4 characters", s)));
    }
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn parse_form_id(s: &str) -> Result<FormId, PluginError> {
    let s = s.trim();
    let inner = s
        .strip_prefix('[')
        .and_then(|x| x.strip_suffix(']'))
        .ok_or_else(|| decode_failed(format!("expected a bracketed form id, found '{}'", s)))?;
    FormId::from_hex(inner).ok_or_else(|| decode_failed(format!("invalid form id hex '{}'", inner)))
}

fn parse_xy(s: &str) -> Result<(i16, i16), PluginError> {
    let s = s.trim();
    let inner = s
        .strip_prefix('(')
        .and_then(|x| x.strip_suffix(')'))
        .ok_or_else(|| decode_failed(format!("expected '(x; y)', found '{}'", s)))?;
    let mut parts = inner.split(';');
    let x: i16 = parts
        .next()
        .ok_or_else(|| decode_failed(format!("missing x coordinate in '{}'", s)))?
        .trim()
        .parse()
        .map_err(|_| decode_failed(format!("invalid x coordinate in '{}'", s)))?;
    let y: i16 = parts
        .next()
        .ok_or_else(|| decode_failed(format!("missing y coordinate in '{}'", s)))?
        .trim()
        .parse()
        .map_err(|_| decode_failed(format!("invalid y coordinate in '{}'", s)))?;
    if parts.next().is_some() {
        return Err(decode_failed(format!("unexpected extra content in '{}'", s)));
    }
    Ok((x, y))
}

/// Known group human names, longest first so a prefix match (e.g.
/// `"Interior Cell Block"` against `"Interior Cell Sub-Block"`) can never
/// shadow the correct, longer name.
const GROUP_NAMES: [&str; 11] = [
    "Cell Visible Distant Children",
    "Cell Persistent Children",
    "Cell Temporary Children",
    "Interior Cell Sub-Block",
    "Exterior Cell Sub-Block",
    "Interior Cell Block",
    "Exterior Cell Block",
    "World Children",
    "Topic Children",
    "Cell Children",
    "Top",
];

/// Splits a `GRUP - <rest>` body into the group-kind name and its
/// qualifier. `Top` is the only kind whose qualifier may be entirely
/// absent (bare `"Top"`, no trailing space) - every other kind's label is
/// never inferable from its children, so it must be spelled out.
fn parse_group_header(body: &str) -> Result<(&'static str, Option<String>), PluginError> {
    for name in GROUP_NAMES {
        if body == name {
            return Ok((name, None));
        }
        if let Some(rest) = body.strip_prefix(name) {
            if let Some(qualifier) = rest.strip_prefix(' ') {
                return Ok((name, Some(qualifier.to_string())));
            }
        }
    }
    Err(decode_failed(format!("unrecognised group kind in 'GRUP - {}'", body)))
}

/// Resolves a parsed group header into a [`GroupKind`](crate::model::GroupKind),
/// or `None` for a `Top` group whose qualifier was omitted - the caller
/// must infer the label from the group's first child instead.
fn group_kind_from_text(
    name: &str,
    qualifier: Option<String>,
) -> Result<Option<crate::model::GroupKind>, PluginError> {
    use crate::model::GroupKind;
    if name == "Top" && qualifier.is_none() {
        return Ok(None);
    }
    let qualifier = qualifier
        .ok_or_else(|| decode_failed(format!("group kind '{}' requires a qualifier", name)))?;
    let kind = match name {
        "Top" => {
            let bytes = qualifier.as_bytes();
            if bytes.len() != 4 {
                return Err(decode_failed(format!("Top group tag '{}' is not 4 characters", qualifier)));
            }
            GroupKind::Top([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        "World Children" => GroupKind::WorldChildren(parse_form_id(&qualifier)?),
        "Cell Children" => GroupKind::CellChildren(parse_form_id(&qualifier)?),
        "Cell Persistent Children" => GroupKind::CellPersistentChildren(parse_form_id(&qualifier)?),
        "Cell Temporary Children" => GroupKind::CellTemporaryChildren(parse_form_id(&qualifier)?),
        "Cell Visible Distant Children" => GroupKind::CellVisibleDistantChildren(parse_form_id(&qualifier)?),
        "Topic Children" => GroupKind::TopicChildren(parse_form_id(&qualifier)?),
        "Interior Cell Block" => GroupKind::InteriorCellBlock(
            qualifier
                .parse()
                .map_err(|_| decode_failed(format!("invalid interior cell block index '{}'", qualifier)))?,
        ),
        "Interior Cell Sub-Block" => GroupKind::InteriorCellSubBlock(
            qualifier
                .parse()
                .map_err(|_| decode_failed(format!("invalid interior cell sub-block index '{}'", qualifier)))?,
        ),
        "Exterior Cell Block" => {
            let (x, y) = parse_xy(&qualifier)?;
            GroupKind::ExteriorCellBlock(x, y)
        }
        "Exterior Cell Sub-Block" => {
            let (x, y) = parse_xy(&qualifier)?;
            GroupKind::ExteriorCellSubBlock(x, y)
        }
        other => return Err(decode_failed(format!("unrecognised group kind '{}'", other))),
    };
    Ok(Some(kind))
}

fn group_label_and_type(kind: crate::model::GroupKind) -> (u32, u32) {
    use crate::model::GroupKind;
    let group_type = kind.discriminator();
    let label = match kind {
        GroupKind::Top(tag) => u32::from_le_bytes(tag),
        GroupKind::WorldChildren(id)
        | GroupKind::CellChildren(id)
        | GroupKind::TopicChildren(id)
        | GroupKind::CellPersistentChildren(id)
        | GroupKind::CellTemporaryChildren(id)
        | GroupKind::CellVisibleDistantChildren(id) => id.0,
        GroupKind::InteriorCellBlock(i) | GroupKind::InteriorCellSubBlock(i) => i as u32,
        GroupKind::ExteriorCellBlock(x, y) | GroupKind::ExteriorCellSubBlock(x, y) => {
            let yb = y.to_le_bytes();
            let xb = x.to_le_bytes();
            u32::from_le_bytes([yb[0], yb[1], xb[0], xb[1]])
        }
    };
    (label, group_type)
}

fn hex_decode(s: &str) -> Result<Vec<u8>, PluginError> {
    if s.len() % 2 != 0 {
        return Err(decode_failed(format!("hex string '{}' has odd length", s)));
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    let mut i = 0;
    while i < bytes.len() {
        let chunk = std::str::from_utf8(&bytes[i..i + 2]).unwrap();
        let b = u8::from_str_radix(chunk, 16).map_err(|_| decode_failed(format!("invalid hex byte '{}'", chunk)))?;
        out.push(b);
        i += 2;
    }
    Ok(out)
}

fn encode_integer(line: &str, size: u8, signed: bool) -> Result<Vec<u8>, PluginError> {
    let size = size as usize;
    if signed {
        let value: i64 = line
            .parse()
            .map_err(|_| decode_failed(format!("invalid integer '{}'", line)))?;
        Ok(value.to_le_bytes()[..size].to_vec())
    } else {
        let value: u64 = line
            .parse()
            .map_err(|_| decode_failed(format!("invalid integer '{}'", line)))?;
        Ok(value.to_le_bytes()[..size].to_vec())
    }
}

fn encode_float(line: &str, size: u8) -> Result<Vec<u8>, PluginError> {
    match size {
        4 => {
            let v: f32 = line
                .parse()
                .map_err(|_| decode_failed(format!("invalid float '{}'", line)))?;
            Ok(v.to_le_bytes().to_vec())
        }
        8 => {
            let v: f64 = line
                .parse()
                .map_err(|_| decode_failed(format!("invalid float '{}'", line)))?;
            Ok(v.to_le_bytes().to_vec())
        }
        other => Err(decode_failed(format!("unsupported float size {}", other))),
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PluginError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(7));
    encoder
        .write_all(data)
        .map_err(|e| decode_failed_because("failed to deflate record fields", e))?;
    encoder
        .finish()
        .map_err(|e| decode_failed_because("failed to finish deflate stream", e))
}

/// Parses a whole plugin2text document back into its binary byte stream.
pub fn read_plugin_text(text: &str, options: ConversionOptions) -> Result<Vec<u8>, PluginError> {
    let mut lines = Lines::new(text);
    expect_header(&mut lines)?;
    let mut reader = Reader {
        lines,
        options,
        output: OutputArena::new(),
        scratch: ScratchArena::new(),
        in_compressed_record: false,
    };
    reader.read_items(0)?;
    Ok(reader.output.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_plugin;
    use crate::writer::write_plugin_text;

    fn round_trip(bytes: &[u8], options: ConversionOptions) -> Vec<u8> {
        let plugin = decode_plugin(bytes, options).unwrap();
        let text = write_plugin_text(&plugin, options).unwrap();
        read_plugin_text(&text, options).unwrap()
    }

    fn record_bytes(tag: &[u8; 4], form_id: u32, flags: u32, fields: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut payload = Vec::new();
        for (tag, data) in fields {
            payload.extend_from_slice(*tag);
            payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
            payload.extend_from_slice(data);
        }
        let mut out = Vec::new();
        out.extend_from_slice(tag);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&form_id.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn rejects_missing_header() {
        let err = read_plugin_text("nope\n---\n", ConversionOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn round_trips_a_simple_record() {
        let bytes = record_bytes(b"TES4", 0, 0, &[(b"CNAM", b"Bob\0")]);
        let round_tripped = round_trip(&bytes, ConversionOptions::default());
        assert_eq!(round_tripped, bytes);
    }

    #[test]
    fn round_trips_unknown_flags() {
        let bytes = record_bytes(b"TES4", 0, 0x8000_0000, &[]);
        let round_tripped = round_trip(&bytes, ConversionOptions::default());
        assert_eq!(round_tripped, bytes);
    }

    #[test]
    fn round_trips_common_flags_on_an_unschemad_record() {
        let bytes = record_bytes(b"ANIO", 0, 0x20, &[]);
        let plugin = decode_plugin(&bytes, ConversionOptions::default()).unwrap();
        let text = write_plugin_text(&plugin, ConversionOptions::default()).unwrap();
        assert!(text.contains("+ Deleted"));
        let round_tripped = round_trip(&bytes, ConversionOptions::default());
        assert_eq!(round_tripped, bytes);
    }

    #[test]
    fn round_trips_a_top_group_with_two_records() {
        let a = record_bytes(b"WEAP", 1, 0, &[]);
        let b = record_bytes(b"WEAP", 2, 0, &[]);
        let mut children = Vec::new();
        children.extend_from_slice(&a);
        children.extend_from_slice(&b);
        let mut group = Vec::new();
        group.extend_from_slice(b"GRUP");
        group.extend_from_slice(&((HEADER_LEN + children.len()) as u32).to_le_bytes());
        group.extend_from_slice(b"WEAP");
        group.extend_from_slice(&0u32.to_le_bytes());
        // unknown_version/version are not represented in text and always
        // round-trip as 0/44; timestamp/unknown are both zero here too, see
        // round_trips_group_timestamp_and_unknown below for the nonzero case
        group.extend_from_slice(&0u16.to_le_bytes());
        group.extend_from_slice(&0u16.to_le_bytes());
        group.extend_from_slice(&44u16.to_le_bytes());
        group.extend_from_slice(&0u16.to_le_bytes());
        group.extend_from_slice(&children);

        let round_tripped = round_trip(&group, ConversionOptions::default());
        assert_eq!(round_tripped, group);
    }

    #[test]
    fn infers_top_group_label_from_first_child_record_when_qualifier_is_omitted() {
        use crate::model::{Group, GroupChild, GroupKind, Plugin, Record};

        let mut group = Group::new(GroupKind::Top(*b"WEAP"));
        group.children.push(GroupChild::Record(Record::new(*b"WEAP", FormId(1))));
        group.children.push(GroupChild::Record(Record::new(*b"WEAP", FormId(2))));
        let plugin = Plugin { items: vec![GroupChild::Group(group)] };

        let text = write_plugin_text(&plugin, ConversionOptions::default()).unwrap();
        assert!(text.contains("GRUP - Top WEAP"));
        let hand_edited = text.replace("GRUP - Top WEAP", "GRUP - Top");

        let bytes = read_plugin_text(&hand_edited, ConversionOptions::default()).unwrap();
        let redecoded = decode_plugin(&bytes, ConversionOptions::default()).unwrap();
        match &redecoded.items[0] {
            crate::model::GroupChild::Group(g) => assert_eq!(g.kind, GroupKind::Top(*b"WEAP")),
            _ => panic!("expected a group"),
        }
    }

    #[test]
    fn rejects_top_group_with_omitted_label_and_mismatched_children() {
        use crate::model::{Group, GroupChild, GroupKind, Plugin, Record};

        let mut group = Group::new(GroupKind::Top(*b"WEAP"));
        group.children.push(GroupChild::Record(Record::new(*b"WEAP", FormId(1))));
        group.children.push(GroupChild::Record(Record::new(*b"ARMO", FormId(2))));
        let plugin = Plugin { items: vec![GroupChild::Group(group)] };

        let text = write_plugin_text(&plugin, ConversionOptions::default()).unwrap();
        let hand_edited = text.replace("GRUP - Top WEAP", "GRUP - Top");

        assert!(read_plugin_text(&hand_edited, ConversionOptions::default()).is_err());
    }

    #[test]
    fn rejects_top_group_with_omitted_label_and_no_children() {
        let text = format!(
            "{}\n{}\nGRUP - Top\n",
            HEADER_LINE_1, HEADER_LINE_2
        );
        assert!(read_plugin_text(&text, ConversionOptions::default()).is_err());
    }

    #[test]
    fn reorders_cell_children_by_form_id_even_when_hand_edited_out_of_order() {
        let low = record_bytes(b"REFR", 1, 0, &[]);
        let high = record_bytes(b"REFR", 2, 0, &[]);
        let mut children = Vec::new();
        children.extend_from_slice(&high);
        children.extend_from_slice(&low);
        let mut group = Vec::new();
        group.extend_from_slice(b"GRUP");
        group.extend_from_slice(&((HEADER_LEN + children.len()) as u32).to_le_bytes());
        group.extend_from_slice(&5u32.to_le_bytes());
        group.extend_from_slice(&8u32.to_le_bytes()); // CellPersistentChildren
        group.extend_from_slice(&[0u8; 8]);
        group.extend_from_slice(&children);

        let plugin = decode_plugin(&group, ConversionOptions::default()).unwrap();
        let text = write_plugin_text(&plugin, ConversionOptions::default()).unwrap();
        let bytes = read_plugin_text(&text, ConversionOptions::default()).unwrap();
        // re-decode and check the order came out ascending
        let redecoded = decode_plugin(&bytes, ConversionOptions::default()).unwrap();
        match &redecoded.items[0] {
            crate::model::GroupChild::Group(g) => {
                let ids: Vec<u32> = g
                    .children
                    .iter()
                    .map(|c| match c {
                        crate::model::GroupChild::Record(r) => r.form_id.0,
                        _ => unreachable!(),
                    })
                    .collect();
                assert_eq!(ids, vec![1, 2]);
            }
            _ => panic!("expected a group"),
        }
    }

    #[test]
    fn round_trips_a_compressed_record() {
        let mut out = Vec::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"FULL");
        payload.extend_from_slice(&5u16.to_le_bytes());
        payload.extend_from_slice(b"Name\0");
        let compressed = deflate(&payload).unwrap();
        let mut body = (payload.len() as u32).to_le_bytes().to_vec();
        body.extend_from_slice(&compressed);
        out.extend_from_slice(b"TES4");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&crate::model::COMPRESSED_BIT.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&body);

        let round_tripped = round_trip(&out, ConversionOptions::default());
        let redecoded = decode_plugin(&round_tripped, ConversionOptions::default()).unwrap();
        match &redecoded.items[0] {
            crate::model::GroupChild::Record(r) => {
                assert!(r.flags.is_compressed());
                assert_eq!(r.fields[0].data, b"Name\0");
            }
            _ => panic!("expected a record"),
        }
    }

    #[test]
    fn round_trips_multiline_string_with_embedded_quotes() {
        let mut record = crate::model::Record::new(*b"TES4", FormId(0));
        record.fields.push(crate::model::Field::new(
            b"CNAM",
            b"line one\nline \"two\"\0".to_vec(),
        ));
        let plugin = crate::model::Plugin {
            items: vec![crate::model::GroupChild::Record(record)],
        };
        let text = write_plugin_text(&plugin, ConversionOptions::default()).unwrap();
        let bytes = read_plugin_text(&text, ConversionOptions::default()).unwrap();
        let redecoded = decode_plugin(&bytes, ConversionOptions::default()).unwrap();
        match &redecoded.items[0] {
            crate::model::GroupChild::Record(r) => {
                assert_eq!(r.fields[0].data, b"line one\nline \"two\"\0");
            }
            _ => panic!("expected a record"),
        }
    }

    #[test]
    fn round_trips_group_timestamp_and_unknown() {
        let a = record_bytes(b"WEAP", 1, 0, &[]);
        let timestamp = crate::timestamp::Timestamp {
            year: 2020,
            month: 3,
            day: 21,
        }
        .to_bits();
        let mut group = Vec::new();
        group.extend_from_slice(b"GRUP");
        group.extend_from_slice(&((HEADER_LEN + a.len()) as u32).to_le_bytes());
        group.extend_from_slice(b"WEAP");
        group.extend_from_slice(&0u32.to_le_bytes());
        group.extend_from_slice(&timestamp.to_le_bytes());
        group.extend_from_slice(&0u16.to_le_bytes());
        group.extend_from_slice(&44u16.to_le_bytes());
        group.extend_from_slice(&0x7Fu16.to_le_bytes());
        group.extend_from_slice(&a);

        let options = ConversionOptions {
            export_timestamp: true,
            ..Default::default()
        };
        let plugin = decode_plugin(&group, options).unwrap();
        let text = write_plugin_text(&plugin, options).unwrap();
        assert!(text.contains("21 Mar 2020"));
        assert!(text.contains("Unknown = 007F"));
        let round_tripped = read_plugin_text(&text, options).unwrap();
        assert_eq!(round_tripped, group);

        // without --export-timestamp the date is dropped, but Unknown still
        // round-trips since it isn't gated by that option
        let without_ts = write_plugin_text(&plugin, ConversionOptions::default()).unwrap();
        assert!(!without_ts.contains("21 Mar 2020"));
        assert!(without_ts.contains("Unknown = 007F"));
    }

    #[test]
    fn rejects_nested_compressed_records() {
        // a hand-written document claiming a record inside a compressed
        // record is itself compressed should fail, not silently double-compress
        let text = "plugin2text version 1.00\n---\nTES4 [00000000]\n  + 40000\n  GRUP - Top TES4\n    TES4 [00000001]\n      + 40000\n";
        assert!(read_plugin_text(text, ConversionOptions::default()).is_err());
    }
}
