use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use xp3arc::archive::{self, PackOptions};
use xp3arc::crypto::{EncryptionProfile, PROFILES, PROFILE_NONE};

#[derive(Parser)]
#[command(name = "xp3arc", about = "KiriKiri .XP3 archive packing and extraction tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into an .xp3 archive
    Pack {
        /// Directory to pack
        input: PathBuf,
        /// Output archive path
        output: PathBuf,
        /// Encryption profile: none, neko_vol1, neko_vol1_steam, neko_vol0, neko_vol0_steam
        #[arg(short, long, default_value = "none")]
        encryption: String,
        /// Ignore subdirectories and pack as if all files are in the root
        #[arg(short, long)]
        flatten: bool,
    },
    /// Extract an .xp3 archive
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long, default_value = "none")]
        encryption: String,
    },
    /// List archive contents
    List {
        input: PathBuf,
    },
    /// Dump the raw decompressed file index
    DumpIndex {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {
        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output, encryption, flatten } => {
            let opts = PackOptions {
                profile: parse_profile(&encryption),
                flatten,
                ..PackOptions::default()
            };
            archive::pack_dir(&input, &output, &opts)?;
            println!("Created: {}", output.display());
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, encryption } => {
            let mut reader = archive::open(&input)?;
            let count = archive::extract_all(&mut reader, &output_dir, parse_profile(&encryption))?;
            println!("Extracted {count} file(s) to {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let reader = archive::open(&input)?;
            println!("Archive: {} ({} entries)", input.display(), reader.len());
            println!("{:<40} {:>12} {:>12} {:>5} {:>5}", "Path", "Size", "Stored", "Comp", "Enc");
            for entry in reader.entries() {
                println!(
                    "{:<40} {:>12} {:>12} {:>5} {:>5}",
                    entry.path(),
                    entry.uncompressed_size(),
                    entry.compressed_size(),
                    if entry.segments.iter().any(|s| s.is_compressed) { "yes" } else { "no" },
                    if entry.is_encrypted() { "yes" } else { "no" },
                );
            }
        }

        // ── DumpIndex ────────────────────────────────────────────────────────
        Commands::DumpIndex { input, output } => {
            let mut reader = archive::open(&input)?;
            let index = reader.dump_index()?;
            File::create(&output)?.write_all(&index)?;
            println!("Dumped {} index bytes to {}", index.len(), output.display());
        }
    }

    Ok(())
}

fn parse_profile(name: &str) -> &'static EncryptionProfile {
    EncryptionProfile::from_name(name).unwrap_or_else(|| {
        let known: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        eprintln!("Unknown encryption profile '{name}' (known: {}), defaulting to none", known.join(", "));
        &PROFILE_NONE
    })
}
