// Print the aggregated activity of one archived hour as JSON.
//
// Usage: cargo run --example dump_archive -- [ARCHIVE_DIR] [YYYY MM DD HH]
//   ARCHIVE_DIR  default: ./data/ash
//   hour         default: the newest bucket on disk

use ashmon::archive::HourlyArchive;
use ashmon::ash::Ash;
use ashmon::buffer::{Retention, SnapshotBuffer};
use ashmon::statements::NoStatements;
use std::env;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(String::as_str).unwrap_or("./data/ash");
    let archive = Arc::new(HourlyArchive::open(path)?);

    let key = if args.len() >= 6 {
        ashmon::error::BucketKey::new(
            args[2].parse()?,
            args[3].parse()?,
            args[4].parse()?,
            args[5].parse()?,
        )
    } else {
        match archive.buckets()?.last() {
            Some(key) => *key,
            None => {
                eprintln!("no archived buckets under {}", path);
                return Ok(());
            }
        }
    };

    let buffer = Arc::new(SnapshotBuffer::new(
        Retention::Count(1),
        1,
        Vec::new(),
        archive.clone(),
    ));
    let ash = Ash::new(buffer, archive, Arc::new(NoStatements));
    let activity = ash.archived_interval_activity(key.year, key.month, key.day, key.hour)?;

    println!("{}", serde_json::to_string_pretty(&activity)?);
    Ok(())
}
