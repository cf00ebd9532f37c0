//! Inspect a captured snmpwalk file
//!
//! Parses a walk capture the way the simulator does at profile load and
//! prints the typed OID map plus the behaviors the analyzer would assign.
//! Handy for checking a capture before pointing a device group at it.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use snmp_swarm::config::DeviceType;
use snmp_swarm::profile::{parse_walk_text, Profile};

#[derive(Parser)]
#[command(name = "walk-inspect")]
#[command(about = "Parse an snmpwalk capture and dump the typed OID map")]
struct Cli {
    /// Walk file to inspect
    file: PathBuf,

    /// Device type used for behavior classification
    #[arg(short, long, default_value = "generic")]
    device_type: String,

    /// Also print the behavior assigned to each OID
    #[arg(short, long)]
    behaviors: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let device_type: DeviceType = cli
        .device_type
        .parse()
        .map_err(anyhow::Error::from)
        .with_context(|| format!("unknown device type {:?}", cli.device_type))?;

    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;

    let walk = parse_walk_text(&text);
    if walk.is_empty() {
        bail!("{} contains no parseable walk lines", cli.file.display());
    }

    let skipped = walk.skipped_lines;
    let profile = Profile::from_walk(device_type, walk, Some(cli.file.clone()));

    for (oid, entry) in profile.tree().iter() {
        match (&entry.mib_name, cli.behaviors) {
            (Some(name), true) => {
                println!("{oid} ({name}) = {} [{}]", entry.base_value, entry.behavior.metric_name())
            }
            (Some(name), false) => println!("{oid} ({name}) = {}", entry.base_value),
            (None, true) => {
                println!("{oid} = {} [{}]", entry.base_value, entry.behavior.metric_name())
            }
            (None, false) => println!("{oid} = {}", entry.base_value),
        }
    }

    eprintln!(
        "{} OIDs, {} unparseable lines skipped",
        profile.len(),
        skipped
    );
    Ok(())
}
