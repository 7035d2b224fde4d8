use anyhow::Result;
use ramp_core::RampFitOptions;

/// Print the default `RampFitOptions` as TOML to stdout.
pub fn run() -> Result<()> {
    let options = RampFitOptions::default();
    let toml_str = toml::to_string_pretty(&options)?;
    print!("{}", toml_str);
    Ok(())
}
