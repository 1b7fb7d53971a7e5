use clap::Result as ClapResult;
use clap::{App, Arg};

use plugintext::ConversionOptions;

/// Configuration for a single conversion run, parsed from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path to the file being converted.
    pub source_path: String,
    /// Output path. `None` means "derive it from `source_path`".
    pub destination_path: Option<String>,
    /// Text serialization options that affect the shape of the output.
    pub options: ConversionOptions,
    /// Whether to print elapsed wall-clock time after the conversion.
    pub time: bool,
}

impl Config {
    fn get(maybe_options: Option<Vec<&str>>, safe: bool) -> ClapResult<Config> {
        let app = App::new("plugin2text")
            .author("descawed <tesutil@descawed.com>")
            .version("1.0")
            .about("Losslessly converts TES plugins between binary and text formats")
            .arg(
                Arg::with_name("SOURCE")
                    .required(true)
                    .help("File to convert (*.esp, *.esm, *.esl, *.txt)"),
            )
            .arg(
                Arg::with_name("DESTINATION")
                    .help("Output path; defaults to SOURCE with its extension swapped"),
            )
            .arg(
                Arg::with_name("time")
                    .long("time")
                    .help("Print elapsed time to stdout"),
            )
            .arg(
                Arg::with_name("export_timestamp")
                    .long("export-timestamp")
                    .help("Write each record's last-modified timestamp"),
            )
            .arg(
                Arg::with_name("preserve_record_order")
                    .long("preserve-record-order")
                    .help("Always write records in the same order as in the source plugin"),
            )
            .arg(
                Arg::with_name("preserve_junk")
                    .long("preserve-junk")
                    .help("Do not clear fields that may contain junk data"),
            );

        let matches = match maybe_options {
            Some(options) if safe => app.get_matches_from_safe(options)?,
            Some(options) if !safe => app.get_matches_from(options),
            None if safe => app.get_matches_safe()?,
            None if !safe => app.get_matches(),
            _ => unreachable!(),
        };

        Ok(Config {
            source_path: String::from(matches.value_of("SOURCE").unwrap()),
            destination_path: matches.value_of("DESTINATION").map(String::from),
            options: ConversionOptions {
                export_timestamp: matches.is_present("export_timestamp"),
                preserve_record_order: matches.is_present("preserve_record_order"),
                preserve_junk: matches.is_present("preserve_junk"),
            },
            time: matches.is_present("time"),
        })
    }

    /// Gets configuration from the command line.
    ///
    /// # Panics
    ///
    /// Panics if the command line is invalid.
    pub fn get_from_cli() -> Config {
        Config::get(None, false).unwrap()
    }

    /// Gets configuration from the provided strings.
    ///
    /// # Panics
    ///
    /// Panics if the provided command line is invalid.
    pub fn get_from_strings(options: Vec<&str>) -> Config {
        Config::get(Some(options), false).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let config = Config::get(
            Some(vec![
                "plugin2text",
                "--export-timestamp",
                "Skyrim.esm",
                "Skyrim.txt",
            ]),
            true,
        )
        .unwrap();
        assert_eq!(config.source_path, "Skyrim.esm");
        assert_eq!(config.destination_path.as_deref(), Some("Skyrim.txt"));
        assert!(config.options.export_timestamp);
        assert!(!config.options.preserve_record_order);
        assert!(!config.time);
    }

    #[test]
    fn test_destination_defaults_to_none() {
        let config = Config::get(Some(vec!["plugin2text", "Dawnguard.esm"]), true).unwrap();
        assert_eq!(config.destination_path, None);
    }

    #[test]
    fn test_time_and_preserve_flags() {
        let config = Config::get(
            Some(vec![
                "plugin2text",
                "--time",
                "--preserve-record-order",
                "--preserve-junk",
                "Dawnguard.txt",
            ]),
            true,
        )
        .unwrap();
        assert!(config.time);
        assert!(config.options.preserve_record_order);
        assert!(config.options.preserve_junk);
    }

    #[test]
    fn test_empty_args() {
        assert!(Config::get(Some(vec!["plugin2text"]), true).is_err());
    }

    #[test]
    fn test_bogus_args() {
        assert!(Config::get(Some(vec!["plugin2text", "-x", "4", "source"]), true).is_err());
    }
}
