//! Lossless bidirectional converter between the plugin binary format (a
//! chunked, tagged record container used by a role-playing-game engine) and
//! a human-editable, diff-friendly plain-text representation.
//!
//! This crate is the type-driven record codec only: the type registry
//! (`schema`), the binary decoder (`decoder`), and the two text traversals
//! (`writer`, `reader`). File I/O, argument parsing, and direction dispatch
//! by file extension live in the `plugin2text` binary crate.

pub mod arena;
pub mod decoder;
pub mod error;
pub mod model;
pub mod options;
pub mod reader;
pub mod rle;
pub mod schema;
pub mod timestamp;
pub mod writer;

pub use error::PluginError;
pub use model::Plugin;
pub use options::ConversionOptions;

/// Decodes a plugin's binary bytes directly into its text representation.
/// Equivalent to `writer::write_plugin_text(&decoder::decode_plugin(data,
/// options)?, options)`, exposed as a single entry point for callers that
/// never need the intermediate object tree.
pub fn binary_to_text(data: &[u8], options: ConversionOptions) -> Result<String, PluginError> {
    let plugin = decoder::decode_plugin(data, options)?;
    writer::write_plugin_text(&plugin, options)
}

/// Parses a plugin2text document directly into binary plugin bytes.
pub fn text_to_binary(text: &str, options: ConversionOptions) -> Result<Vec<u8>, PluginError> {
    reader::read_plugin_text(text, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plugin_round_trips_through_text() {
        // a single TES4 record with no fields, the "empty plugin" scenario
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"TES4");
        bytes.extend_from_slice(&0u32.to_le_bytes()); // data_size
        bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u32.to_le_bytes()); // form_id
        bytes.extend_from_slice(&[0u8; 8]); // timestamp/unknown_version/version.../unknown defaults below
        // overwrite version field (offset 20..22) with the default 44
        bytes[20..22].copy_from_slice(&44u16.to_le_bytes());

        let options = ConversionOptions::default();
        let text = binary_to_text(&bytes, options).unwrap();
        assert!(text.starts_with("plugin2text version 1.00\n---\n"));
        assert!(text.contains("TES4 [00000000]"));

        let round_tripped = text_to_binary(&text, options).unwrap();
        assert_eq!(round_tripped, bytes);
    }
}
