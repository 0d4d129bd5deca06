//! machseq - configure a machine test sequence inside a ZIP archive
//!
//! Command line host for the configuration engine.
//!
//! # Overview
//!
//! The binary drives a [`ConfigurationSession`] end to end:
//! - `inspect` uploads an archive and prints the resolved machine, the file
//!   sequence with its IST/SOLL values, and the allowed mount range
//! - `export` applies mode, features, mount count and reorders, then writes a
//!   copy of the archive with `config.json` added
//!
//! # Execution Flow
//!
//! 1. Load `machseq.yaml` (written with defaults on first run) from the config directory (plus `MACHSEQ_` env overrides)
//! 2. Initialize logging → logs/machseq.<date>
//! 3. Create the session and upload the archive into the uploads directory
//! 4. Run the subcommand

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use machseq::models::FeatureKey;
use machseq::services::NOT_FOUND;
use machseq::{APP_NAME, ConfigManager, ConfigurationSession, VERSION};

#[derive(Parser, Debug)]
#[command(name = "machseq", version, about = "Configure machine test sequences in ZIP archives")]
struct Cli {
    /// Directory containing machseq.yaml
    #[arg(long, global = true, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show machine identity, files and field values of an archive
    Inspect {
        archive: Utf8PathBuf,

        /// List profiles instead of bars
        #[arg(long)]
        profiles: bool,
    },

    /// Write a configured copy of an archive
    Export {
        archive: Utf8PathBuf,

        /// Output archive (default: <name>_konfiguriert.zip next to the input)
        #[arg(long, short)]
        output: Option<Utf8PathBuf>,

        /// Use the profiles folder instead of bars
        #[arg(long)]
        profiles: bool,

        #[arg(long)]
        mount_count: Option<String>,

        /// Feature to toggle, in order (shift-cut-device, small-shelf, big-shelf, robot-mode)
        #[arg(long = "feature", value_name = "KEY")]
        features: Vec<FeatureKey>,

        /// Move a file, zero-based (e.g. --move 3:0)
        #[arg(long = "move", value_name = "FROM:TO", value_parser = parse_move)]
        moves: Vec<(usize, usize)>,
    },
}

fn parse_move(value: &str) -> Result<(usize, usize), String> {
    let (from, to) = value
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got '{}'", value))?;
    let from = from
        .trim()
        .parse()
        .map_err(|e| format!("invalid FROM index '{}': {}", from, e))?;
    let to = to
        .trim()
        .parse()
        .map_err(|e| format!("invalid TO index '{}': {}", to, e))?;
    Ok((from, to))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    config_manager.ensure_config_file()?;
    let config = config_manager.load_config()?;

    // Held until exit to flush the file appender
    let _guard = machseq::logging::setup_from_settings(&config.logging, cli.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let mut session = ConfigurationSession::new(config).context("Failed to create session")?;

    match cli.command {
        Command::Inspect { archive, profiles } => {
            open_archive(&mut session, &archive, profiles)?;
            print_summary(&session);
        }
        Command::Export {
            archive,
            output,
            profiles,
            mount_count,
            features,
            moves,
        } => {
            open_archive(&mut session, &archive, profiles)?;

            for key in features {
                let outcome = session.toggle_feature(key);
                if outcome.reloaded {
                    println!("{} enabled: switched to bars", key);
                }
            }

            if let Some(raw) = mount_count {
                let result = session.validate_mount_count(&raw);
                if result.has_error {
                    println!(
                        "Mount count '{}' out of range, using {} ({})",
                        raw, result.value, result.hint
                    );
                }
            }

            for (from, to) in moves {
                session
                    .reorder_file(from, to)
                    .with_context(|| format!("Failed to move file {} to {}", from, to))?;
            }

            let destination = match output {
                Some(path) => path,
                None => default_destination(&session, &archive)?,
            };

            let descriptor = session.prepare_final_data();
            let json = descriptor
                .to_json_bytes()
                .context("Failed to serialize descriptor")?;
            println!("{}", String::from_utf8_lossy(&json));

            if !session.export_archive(&destination) {
                bail!("Failed to export archive to {}", destination);
            }
            println!("Exported {}", destination);
        }
    }

    tracing::info!("Done");
    Ok(())
}

fn open_archive(session: &mut ConfigurationSession, archive: &Utf8Path, profiles: bool) -> Result<()> {
    session
        .handle_upload(archive)
        .with_context(|| format!("Failed to upload {}", archive))?;
    session.start();

    if profiles {
        session
            .set_bars_mode(false)
            .context("Failed to switch to profiles")?;
    }
    Ok(())
}

fn default_destination(session: &ConfigurationSession, archive: &Utf8Path) -> Result<Utf8PathBuf> {
    let name = session
        .default_export_name()
        .with_context(|| format!("Cannot derive an export name from {}", archive))?;
    Ok(match archive.parent() {
        Some(parent) => parent.join(name),
        None => Utf8PathBuf::from(name),
    })
}

fn print_summary(session: &ConfigurationSession) {
    let identity = session.identity();
    println!("Machine:     {} ({})", identity.display_string, identity.model_name);
    println!(
        "Mode:        {}",
        if session.is_bars_mode() { "bars" } else { "profiles" }
    );
    println!(
        "Mount count: {} [{}]",
        session.mount_count(),
        session.mount_range().hint()
    );
    println!("Files in {}:", session.active_folder());

    let display_names = session.sequence().display_names();
    for (index, (name, caption)) in session.file_order().iter().zip(display_names).enumerate() {
        let values: Vec<String> = session
            .config()
            .xml_tags
            .iter()
            .map(|tag| {
                let value = session
                    .xml_fields_for(name)
                    .and_then(|fields| fields.get(tag))
                    .map(String::as_str)
                    .unwrap_or(NOT_FOUND);
                format!("{}={}", tag, value)
            })
            .collect();
        println!("  {:>3}  {:<32} {}", index, caption, values.join("  "));
    }
}
