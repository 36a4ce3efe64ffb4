use crate::cas::{Cas, GcOptions};
use crate::vfs::{MkdirOptions, Vfs};

use super::command::Command;
use super::util::{parse_object_type, read_input};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Plain,
    Json,
}

pub async fn run_with_format(
    cas: &Cas,
    vfs: &Vfs,
    cmd: Command,
    mode: OutputMode,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Put { input, object_type } => {
            let bytes = read_input(input.as_deref())?;
            let object_type = parse_object_type(&object_type);
            let result = cas.put(object_type, &bytes).await?;
            match mode {
                OutputMode::Json => println!("{}", serde_json::to_string(&serde_json::json!({
                    "hash": result.hash, "written": result.written,
                }))?),
                OutputMode::Plain => println!("{}", result.hash),
                OutputMode::Human => {
                    println!("hash={} written={}", result.hash, result.written);
                }
            }
            Ok(())
        }
        Command::Get { hash, output } => {
            let Some(object) = cas.get(&hash).await? else {
                return Err(format!("object not found: {hash}").into());
            };
            match output {
                Some(path) => std::fs::write(path, &object.content)?,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&object.content)?;
                }
            }
            Ok(())
        }
        Command::Has { hash } => {
            let exists = cas.has(&hash).await?;
            match mode {
                OutputMode::Json => println!("{}", serde_json::json!({"hash": hash, "exists": exists})),
                _ => println!("{exists}"),
            }
            Ok(())
        }
        Command::Delete { hash } => {
            cas.delete(&hash).await?;
            println!("deleted {hash}");
            Ok(())
        }
        Command::Gc { dry_run } => {
            let result = cas.gc(GcOptions { dry_run }, |_| {}).await?;
            match mode {
                OutputMode::Json => println!("{}", serde_json::to_string(&result)?),
                _ => println!(
                    "scanned={} deleted={} bytes_freed={} dry_run={}",
                    result.scanned, result.deleted_count, result.bytes_freed, result.dry_run
                ),
            }
            Ok(())
        }
        Command::Stats => {
            let stats = cas.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Ls { path } => {
            for entry in vfs.readdir(&path)? {
                println!("{entry}");
            }
            Ok(())
        }
        Command::Stat { path } => {
            let stat = vfs.lstat(&path)?;
            match mode {
                OutputMode::Json => println!("{}", serde_json::to_string(&stat)?),
                _ => println!(
                    "size={} mode={:o} inode={} blocks={}",
                    stat.size, stat.mode, stat.inode, stat.blocks
                ),
            }
            Ok(())
        }
        Command::Mkdir { path, recursive, mode } => {
            vfs.mkdir(&path, MkdirOptions { recursive, mode })?;
            Ok(())
        }
        Command::Cat { path } => {
            let data = vfs.read_file(&path).await?;
            use std::io::Write;
            std::io::stdout().write_all(&data)?;
            Ok(())
        }
        Command::Write { path, input, mode } => {
            let data = read_input(input.as_deref())?;
            vfs.write_file(&path, &data, mode).await?;
            Ok(())
        }
        Command::Rm { path } => {
            vfs.unlink(&path)?;
            Ok(())
        }
        Command::FeatureList => {
            for flag in crate::feature_flags::list() {
                println!("{}\t{}\t{}", flag.name, flag.enabled, flag.description);
            }
            Ok(())
        }
        Command::FeatureEnable { name } => {
            if crate::feature_flags::set(&name, true) {
                println!("enabled {name}");
                Ok(())
            } else {
                Err(format!("unknown feature: {name}").into())
            }
        }
        Command::FeatureDisable { name } => {
            if crate::feature_flags::set(&name, false) {
                println!("disabled {name}");
                Ok(())
            } else {
                Err(format!("unknown feature: {name}").into())
            }
        }
    }
}
