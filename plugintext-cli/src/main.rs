use anyhow::*;
use plugintext_cli::*;

fn main() -> Result<()> {
    let config = Config::get_from_cli();
    convert(config)
}
