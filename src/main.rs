//! aie-profile: dry-run AIE profile settings against application metadata

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use aie_profile::counters::ResourceManager;
use aie_profile::device::{arch_for_generation, ModuleType, SimulatedDevice};
use aie_profile::message::{LogSink, MessageSink};
use aie_profile::metadata::{MetadataReader, StaticMetadata};
use aie_profile::session::SessionRegistry;
use aie_profile::settings::ProfileSettings;

const USAGE: &str = "usage: aie-profile <metadata.toml> [settings.toml] [--polls N]";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut polls = 1usize;
    let mut paths = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--polls" => {
                let value = iter.next().context("--polls needs a value")?;
                polls = value
                    .parse()
                    .with_context(|| format!("invalid poll count: {}", value))?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other if other.starts_with('-') => bail!("unknown option {}\n{}", other, USAGE),
            other => paths.push(other),
        }
    }

    let Some(metadata_path) = paths.first() else {
        bail!(USAGE);
    };

    let metadata = StaticMetadata::from_file(Path::new(metadata_path))
        .with_context(|| format!("loading metadata {}", metadata_path))?;
    let settings = match paths.get(1) {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings {}", path))?;
            ProfileSettings::from_toml_str(&content)
                .with_context(|| format!("parsing settings {}", path))?
        }
        None => ProfileSettings::load(),
    };

    let arch = arch_for_generation(metadata.hardware_generation());
    println!(
        "Device: {} ({} columns from {:?})",
        arch.name(),
        metadata.driver_config.num_columns,
        metadata.partition_start_columns()
    );

    let metadata: Arc<dyn MetadataReader> = Arc::new(metadata);
    let device: Arc<dyn ResourceManager> = Arc::new(SimulatedDevice::new(arch));
    let sink: Arc<dyn MessageSink> = Arc::new(LogSink);

    let mut registry = SessionRegistry::new();
    let session = registry.create(0, metadata, &settings, device, sink)?;

    println!();
    println!("Resolved metric sets");
    println!("====================");
    for module in ModuleType::ALL {
        let config = session.profile().config_metrics(module);
        if config.is_empty() {
            continue;
        }
        println!("{}:", module);
        for (tile, metric) in config {
            println!("  {:>8}  {}", tile.to_string(), metric);
        }
    }

    println!();
    println!("Counters");
    println!("========");
    for c in session.counters() {
        println!(
            "  [{:3}] {:<14} ({:2},{:2}) #{}  start={:4} end={:4} payload=0x{:X}",
            c.counter_id,
            c.module_name,
            c.column,
            c.row,
            c.counter_number,
            c.start_event,
            c.end_event,
            c.payload
        );
    }

    for _ in 0..polls {
        session.poll_once();
    }
    println!();
    println!("Collected {} samples in {} polls", session.samples().len(), polls);

    registry.destroy(0)?;
    Ok(())
}
