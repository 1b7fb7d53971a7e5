//! `VMAD` - "virtual machine attached data" - the structured sub-format
//! embedded in some fields to describe attached Papyrus scripts and their
//! properties, with extensions specific to `INFO` and `QUST` records.
//!
//! This module only knows the binary shape (read bytes -> [`VmadData`],
//! write [`VmadData`] -> bytes); rendering it as nested text and parsing it
//! back is the text writer/reader's job, since that's where the "custom
//! block" indentation rules live.

use crate::error::{decode_failed, PluginError};
use crate::model::FormId;

#[derive(Debug, Clone, PartialEq)]
pub enum VmadValue {
    Object { form_id: FormId, alias: u16 },
    String(String),
    Int(i32),
    Float(f32),
    Bool(bool),
    Array(Vec<VmadValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadProperty {
    pub name: String,
    pub status: Option<u8>,
    pub value: VmadValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadScript {
    pub name: String,
    pub status: Option<u8>,
    pub properties: Vec<VmadProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadFragment {
    pub script_name: String,
    pub fragment_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadInfoExtension {
    pub flags: u8,
    pub script_name: String,
    pub begin_fragment: Option<VmadFragment>,
    pub end_fragment: Option<VmadFragment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadQuestFragment {
    pub index: u16,
    pub log_entry: u32,
    pub script_name: String,
    pub function_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadQuestAlias {
    pub value: VmadValue,
    pub version: u16,
    pub object_format: u16,
    pub scripts: Vec<VmadScript>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmadQuestExtension {
    pub file_name: String,
    pub fragments: Vec<VmadQuestFragment>,
    pub aliases: Vec<VmadQuestAlias>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VmadData {
    pub version: u16,
    pub object_format: u16,
    pub scripts: Vec<VmadScript>,
    pub info_extension: Option<VmadInfoExtension>,
    pub quest_extension: Option<VmadQuestExtension>,
}

const OBJECT_FORMAT_V2: u16 = 2;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, PluginError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| decode_failed("VMAD: unexpected end of data"))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, PluginError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, PluginError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Result<i32, PluginError> {
        Ok(self.u32()? as i32)
    }

    fn f32(&mut self) -> Result<f32, PluginError> {
        Ok(f32::from_bits(self.u32()?))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PluginError> {
        if self.pos + n > self.data.len() {
            return Err(decode_failed("VMAD: unexpected end of data"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn wstring(&mut self) -> Result<String, PluginError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn expect_u8(&mut self, expected: u8, what: &str) -> Result<(), PluginError> {
        let actual = self.u8()?;
        if actual != expected {
            return Err(decode_failed(format!(
                "VMAD: expected {} == {}, found {}",
                what, expected, actual
            )));
        }
        Ok(())
    }

    fn expect_u16(&mut self, expected: u16, what: &str) -> Result<(), PluginError> {
        let actual = self.u16()?;
        if actual != expected {
            return Err(decode_failed(format!(
                "VMAD: expected {} == {}, found {}",
                what, expected, actual
            )));
        }
        Ok(())
    }
}

fn read_value(c: &mut Cursor, kind: u8) -> Result<VmadValue, PluginError> {
    Ok(match kind {
        1 => {
            let form_id = FormId(c.u32()?);
            let alias = c.u16()?;
            VmadValue::Object { form_id, alias }
        }
        2 => VmadValue::String(c.wstring()?),
        3 => VmadValue::Int(c.i32()?),
        4 => VmadValue::Float(c.f32()?),
        5 => VmadValue::Bool(c.u8()? != 0),
        11..=15 => {
            let count = c.u32()? as usize;
            let inner_kind = kind - 10;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(c, inner_kind)?);
            }
            VmadValue::Array(items)
        }
        other => return Err(decode_failed(format!("VMAD: unknown property type {}", other))),
    })
}

fn value_kind(value: &VmadValue) -> u8 {
    match value {
        VmadValue::Object { .. } => 1,
        VmadValue::String(_) => 2,
        VmadValue::Int(_) => 3,
        VmadValue::Float(_) => 4,
        VmadValue::Bool(_) => 5,
        VmadValue::Array(items) => 10 + items.first().map(value_kind).unwrap_or(1),
    }
}

fn write_value(out: &mut Vec<u8>, value: &VmadValue) {
    match value {
        VmadValue::Object { form_id, alias } => {
            out.extend_from_slice(&form_id.0.to_le_bytes());
            out.extend_from_slice(&alias.to_le_bytes());
        }
        VmadValue::String(s) => write_wstring(out, s),
        VmadValue::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
        VmadValue::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
        VmadValue::Bool(b) => out.push(if *b { 1 } else { 0 }),
        VmadValue::Array(items) => {
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(out, item);
            }
        }
    }
}

fn write_wstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn read_script(c: &mut Cursor, version: u16) -> Result<VmadScript, PluginError> {
    let name = c.wstring()?;
    let status = if version >= 4 { Some(c.u8()?) } else { None };
    let property_count = c.u16()?;
    let mut properties = Vec::with_capacity(property_count as usize);
    for _ in 0..property_count {
        let prop_name = c.wstring()?;
        let kind = c.u8()?;
        let prop_status = if version >= 4 { Some(c.u8()?) } else { None };
        let value = read_value(c, kind)?;
        properties.push(VmadProperty {
            name: prop_name,
            status: prop_status,
            value,
        });
    }
    Ok(VmadScript {
        name,
        status,
        properties,
    })
}

fn write_script(out: &mut Vec<u8>, script: &VmadScript, version: u16) {
    write_wstring(out, &script.name);
    if version >= 4 {
        out.push(script.status.unwrap_or(0));
    }
    out.extend_from_slice(&(script.properties.len() as u16).to_le_bytes());
    for prop in &script.properties {
        write_wstring(out, &prop.name);
        out.push(value_kind(&prop.value));
        if version >= 4 {
            out.push(prop.status.unwrap_or(0));
        }
        write_value(out, &prop.value);
    }
}

/// Reads a `VMAD` field's decoded bytes, dispatching on `record_tag` for
/// the `INFO`/`QUST` extensions.
pub fn read_vmad(data: &[u8], record_tag: [u8; 4]) -> Result<VmadData, PluginError> {
    let mut c = Cursor::new(data);
    let version = c.u16()?;
    if !(2..=5).contains(&version) {
        return Err(decode_failed(format!("VMAD: unsupported version {}", version)));
    }
    let object_format = c.u16()?;
    if object_format != OBJECT_FORMAT_V2 {
        return Err(decode_failed(format!(
            "VMAD: unsupported object format {}",
            object_format
        )));
    }
    let script_count = c.u16()?;
    let mut scripts = Vec::with_capacity(script_count as usize);
    for _ in 0..script_count {
        scripts.push(read_script(&mut c, version)?);
    }

    let mut info_extension = None;
    let mut quest_extension = None;
    match &record_tag {
        b"INFO" => {
            c.expect_u8(2, "INFO VMAD marker")?;
            let flags = c.u8()?;
            let script_name = c.wstring()?;
            let begin_fragment = if flags & 0x1 != 0 {
                Some(read_fragment_marker(&mut c)?)
            } else {
                None
            };
            let end_fragment = if flags & 0x2 != 0 {
                Some(read_fragment_marker(&mut c)?)
            } else {
                None
            };
            info_extension = Some(VmadInfoExtension {
                flags,
                script_name,
                begin_fragment,
                end_fragment,
            });
        }
        b"QUST" => {
            c.expect_u8(2, "QUST VMAD marker")?;
            let fragment_count = c.u16()?;
            let file_name = c.wstring()?;
            let mut fragments = Vec::with_capacity(fragment_count as usize);
            for _ in 0..fragment_count {
                let index = c.u16()?;
                c.expect_u16(0, "QUST fragment placeholder")?;
                let log_entry = c.u32()?;
                c.expect_u8(1, "QUST fragment marker")?;
                let script_name = c.wstring()?;
                let function_name = c.wstring()?;
                fragments.push(VmadQuestFragment {
                    index,
                    log_entry,
                    script_name,
                    function_name,
                });
            }
            let alias_count = c.u16()?;
            let mut aliases = Vec::with_capacity(alias_count as usize);
            for _ in 0..alias_count {
                let value = read_value(&mut c, 1)?;
                let alias_version = c.u16()?;
                let alias_object_format = c.u16()?;
                let alias_script_count = c.u16()?;
                let mut alias_scripts = Vec::with_capacity(alias_script_count as usize);
                for _ in 0..alias_script_count {
                    alias_scripts.push(read_script(&mut c, alias_version)?);
                }
                aliases.push(VmadQuestAlias {
                    value,
                    version: alias_version,
                    object_format: alias_object_format,
                    scripts: alias_scripts,
                });
            }
            quest_extension = Some(VmadQuestExtension {
                file_name,
                fragments,
                aliases,
            });
        }
        _ => {}
    }

    Ok(VmadData {
        version,
        object_format,
        scripts,
        info_extension,
        quest_extension,
    })
}

fn read_fragment_marker(c: &mut Cursor) -> Result<VmadFragment, PluginError> {
    c.expect_u8(1, "fragment marker")?;
    let script_name = c.wstring()?;
    let fragment_name = c.wstring()?;
    Ok(VmadFragment {
        script_name,
        fragment_name,
    })
}

/// Writes a [`VmadData`] back to the `VMAD` field's binary encoding.
pub fn write_vmad(vmad: &VmadData) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&vmad.version.to_le_bytes());
    out.extend_from_slice(&vmad.object_format.to_le_bytes());
    out.extend_from_slice(&(vmad.scripts.len() as u16).to_le_bytes());
    for script in &vmad.scripts {
        write_script(&mut out, script, vmad.version);
    }

    if let Some(info) = &vmad.info_extension {
        out.push(2);
        out.push(info.flags);
        write_wstring(&mut out, &info.script_name);
        if let Some(frag) = &info.begin_fragment {
            write_fragment_marker(&mut out, frag);
        }
        if let Some(frag) = &info.end_fragment {
            write_fragment_marker(&mut out, frag);
        }
    }

    if let Some(quest) = &vmad.quest_extension {
        out.push(2);
        out.extend_from_slice(&(quest.fragments.len() as u16).to_le_bytes());
        write_wstring(&mut out, &quest.file_name);
        for frag in &quest.fragments {
            out.extend_from_slice(&frag.index.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&frag.log_entry.to_le_bytes());
            out.push(1);
            write_wstring(&mut out, &frag.script_name);
            write_wstring(&mut out, &frag.function_name);
        }
        out.extend_from_slice(&(quest.aliases.len() as u16).to_le_bytes());
        for alias in &quest.aliases {
            write_value(&mut out, &alias.value);
            out.extend_from_slice(&alias.version.to_le_bytes());
            out.extend_from_slice(&alias.object_format.to_le_bytes());
            out.extend_from_slice(&(alias.scripts.len() as u16).to_le_bytes());
            for script in &alias.scripts {
                write_script(&mut out, script, alias.version);
            }
        }
    }

    out
}

fn write_fragment_marker(out: &mut Vec<u8>, frag: &VmadFragment) {
    out.push(1);
    write_wstring(out, &frag.script_name);
    write_wstring(out, &frag.fragment_name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_script_with_object_property() {
        let vmad = VmadData {
            version: 5,
            object_format: 2,
            scripts: vec![VmadScript {
                name: String::from("MyScript"),
                status: Some(1),
                properties: vec![VmadProperty {
                    name: String::from("Target"),
                    status: Some(1),
                    value: VmadValue::Object {
                        form_id: FormId(0x1234),
                        alias: 0,
                    },
                }],
            }],
            info_extension: None,
            quest_extension: None,
        };
        let bytes = write_vmad(&vmad);
        let parsed = read_vmad(&bytes, *b"NONE").unwrap();
        assert_eq!(parsed, vmad);
    }

    #[test]
    fn round_trips_info_fragments() {
        let vmad = VmadData {
            version: 5,
            object_format: 2,
            scripts: vec![],
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
        let bytes = write_vmad(&vmad);
        let parsed = read_vmad(&bytes, *b"INFO").unwrap();
        assert_eq!(parsed, vmad);
    }

    #[test]
    fn rejects_unsupported_version() {
        let bytes = [6u8, 0, 2, 0, 0, 0];
        assert!(read_vmad(&bytes, *b"NONE").is_err());
    }
}
