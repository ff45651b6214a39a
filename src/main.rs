use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use varc::archive::Archive;
use varc::format::{detect_archive_format, Format};
use varc::reader::Reader;

#[derive(Parser)]
#[command(name = "varc", about = "Content-addressable virtual archive CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode a directory, archive file, or wire-format JSON description
    Pack {
        /// Directory, .tar/.tgz/.tar.gz/.zip/.jar file, or .json wire description
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target format: tar, tgz/tar.gz, zip (default: inferred from the output suffix)
        #[arg(short, long)]
        format: Option<String>,
    },
    /// List the members of an archive
    List {
        input: PathBuf,
    },
    /// Print the canonical content hash
    Hash {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output, format } => {
            let format = resolve_format(&output, format.as_deref())?;
            let archive = load_archive(&input)?;
            let mut file = File::create(&output)?;
            archive.archive(format, &mut file)?;
            println!("Created: {} ({})", output.display(), format.name());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let archive = load_archive(&input)?;
            let mut reader = archive.open()?;
            println!("{:<48} {:>12}", "Name", "Size");
            let mut count = 0u64;
            let mut total = 0u64;
            while let Some((name, blob)) = reader.next()? {
                println!("{:<48} {:>12}", name, blob.size());
                count += 1;
                total += blob.size();
            }
            println!("{} member(s), {} B", count, total);
        }

        // ── Hash ─────────────────────────────────────────────────────────────
        Commands::Hash { input } => {
            let archive = load_archive(&input)?;
            archive.ensure_hash()?;
            println!("{}", archive.hash().unwrap_or_default());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn load_archive(input: &Path) -> Result<Archive, Box<dyn std::error::Error>> {
    if input.extension().is_some_and(|ext| ext == "json") {
        let data = fs::read_to_string(input)?;
        let archive: Archive = serde_json::from_str(&data)?;
        return Ok(archive);
    }
    Ok(Archive::from_path(input)?)
}

fn resolve_format(output: &Path, flag: Option<&str>) -> Result<Format, Box<dyn std::error::Error>> {
    let format = match flag {
        Some(name) => Format::from_name(name)
            .ok_or_else(|| format!("unknown format '{}'; expected tar, tgz, or zip", name))?,
        None => detect_archive_format(&output.to_string_lossy()),
    };
    match format {
        Format::Tar | Format::TarGzip | Format::Zip => Ok(format),
        Format::Jar => Err("jar is read-only; pack as zip instead".into()),
        Format::NotArchive => {
            Err("output has no recognized archive suffix; pass --format".into())
        }
    }
}
