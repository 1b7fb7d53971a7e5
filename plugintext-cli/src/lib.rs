use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

mod config;
pub use config::*;

/// Extensions recognized as the binary plugin format. Anything else is
/// treated as the text format (matching the source tool's own dispatch:
/// only `.txt` is special-cased on the text side, everything else on the
/// binary side).
const PLUGIN_EXTENSIONS: [&str; 3] = ["esp", "esm", "esl"];

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Derives the default destination path by swapping `source_path`'s
/// extension: `.txt` becomes `.esp`, anything else becomes `.txt`.
fn default_destination(source_path: &str) -> String {
    let new_extension = if extension_of(source_path) == "txt" {
        "esp"
    } else {
        "txt"
    };
    Path::new(source_path)
        .with_extension(new_extension)
        .to_string_lossy()
        .into_owned()
}

/// Runs a single conversion as described by `config`, reading the source
/// file and writing the destination file.
pub fn convert(config: Config) -> Result<()> {
    let start = config.time.then(Instant::now);

    let destination_path = config
        .destination_path
        .clone()
        .unwrap_or_else(|| default_destination(&config.source_path));

    if extension_of(&config.source_path) == "txt" {
        let text = fs::read_to_string(&config.source_path)
            .with_context(|| format!("failed to read {}", config.source_path))?;
        let plugin = plugintext::text_to_binary(&text, config.options)
            .with_context(|| format!("failed to parse {}", config.source_path))?;
        fs::write(&destination_path, plugin)
            .with_context(|| format!("failed to write {}", destination_path))?;
    } else if PLUGIN_EXTENSIONS.contains(&extension_of(&config.source_path).as_str()) {
        let data = fs::read(&config.source_path)
            .with_context(|| format!("failed to read {}", config.source_path))?;
        let text = plugintext::binary_to_text(&data, config.options)
            .with_context(|| format!("failed to decode {}", config.source_path))?;
        fs::write(&destination_path, text)
            .with_context(|| format!("failed to write {}", destination_path))?;
    } else {
        anyhow::bail!(
            "unrecognized source file extension \"{}\" ({})",
            extension_of(&config.source_path),
            config.source_path
        );
    }

    if let Some(start) = start {
        println!("Time elapsed: {:.6} seconds", start.elapsed().as_secs_f64());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_destination_swaps_binary_extension_for_txt() {
        assert_eq!(default_destination("Skyrim.esm"), "Skyrim.txt");
        assert_eq!(default_destination("Dawnguard.esp"), "Dawnguard.txt");
    }

    #[test]
    fn default_destination_swaps_txt_extension_for_esp() {
        assert_eq!(default_destination("Dawnguard.txt"), "Dawnguard.esp");
    }

    #[test]
    fn extension_of_is_case_insensitive() {
        assert_eq!(extension_of("Skyrim.ESM"), "esm");
    }
}
