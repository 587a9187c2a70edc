/*!
CoachVault CLI - create, inspect and restore trainer dashboard backups.

Records live in a directory store (one `<record>.json` file per record);
archives are written next to an append-only history log.
*/

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use coachvault_core::{
    create_engine_from_config, init_observability_with, list_archives, preview, validate, Archive,
    ArchiveFile, ArchiveFormat, BackupOptions, HistoryEntry, JsonLinesHistory, Outcome,
    Passphrase, RestoreOptions, Statistics, VaultConfig, VaultError,
};
use tabled::{Table, Tabled};
use tracing::{error, info};
use zeroize::Zeroizing;

/// Exit status for an operation that finished with per-record failures
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser)]
#[command(name = "coachvault")]
#[command(about = "Backup and restore for trainer dashboard records")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = "COACHVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Record store directory, overriding the configuration
    #[arg(short, long, global = true, env = "COACHVAULT_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Bak,
}

impl From<FormatArg> for ArchiveFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => ArchiveFormat::Json,
            FormatArg::Bak => ArchiveFormat::Bak,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot every record into a new archive
    Backup {
        /// Note stored in the archive metadata
        #[arg(short, long)]
        note: Option<String>,
        /// Archive format (file extension)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
        /// Compression level, 0 (none) to 100 (maximum)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        compression: Option<u8>,
        /// Encrypt the archive with a passphrase
        #[arg(short, long)]
        encrypt: bool,
        /// Passphrase; implies --encrypt, read from stdin when encrypting without one
        #[arg(long, env = "COACHVAULT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
        /// Output file, or directory for an automatically named file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore records from an archive
    Restore {
        /// Archive file
        archive: PathBuf,
        #[arg(long, env = "COACHVAULT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
        /// Refuse archives that are not encrypted
        #[arg(long)]
        require_encrypted: bool,
        /// Print what would be restored without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Check that a file is a well-formed archive
    Verify {
        /// Archive file
        archive: PathBuf,
        /// Also decrypt and check the contents of an encrypted archive
        #[arg(long, env = "COACHVAULT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
    /// Show the metadata and record counts of an archive
    Show {
        /// Archive file
        archive: PathBuf,
        #[arg(long, env = "COACHVAULT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
    /// List archives in the backup directory
    List {
        /// Directory to scan instead of the configured one
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Show the backup history log
    History {
        /// Only show the most recent entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Tabled)]
struct ArchiveRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Compression")]
    compression: String,
    #[tabled(rename = "Encrypted")]
    encrypted: String,
    #[tabled(rename = "Note")]
    note: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "When")]
    at: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Failed Records")]
    failed: String,
    #[tabled(rename = "Note")]
    note: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Partial) => ExitCode::from(EXIT_PARTIAL),
        Err(e) => {
            eprintln!("Error: {e:#}");
            let input_error = e
                .downcast_ref::<VaultError>()
                .is_some_and(VaultError::is_input_error);
            if input_error {
                eprintln!("Nothing was written. Check the archive, passphrase or options.");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Outcome, anyhow::Error> {
    init_logging(cli.verbose, cli.log_json)?;

    let config = load_config(&cli)?;

    let outcome = match cli.command {
        Commands::Backup {
            note,
            format,
            compression,
            encrypt,
            passphrase,
            output,
        } => {
            let options = backup_options(&config, note, format, compression, encrypt, passphrase)?;
            create_backup(&config, &options, output.as_deref())?
        }
        Commands::Restore {
            archive,
            passphrase,
            require_encrypted,
            dry_run,
        } => restore_backup(&config, &archive, passphrase, require_encrypted, dry_run)?,
        Commands::Verify {
            archive,
            passphrase,
        } => verify_archive(&config, &archive, passphrase)?,
        Commands::Show {
            archive,
            passphrase,
        } => show_archive(&config, &archive, passphrase)?,
        Commands::List { dir } => {
            list_backups(dir.as_deref().unwrap_or(config.backup_dir.as_path()))?
        }
        Commands::History { limit } => show_history(&config, limit)?,
    };

    Ok(outcome)
}

fn init_logging(verbose: bool, json: bool) -> Result<(), anyhow::Error> {
    let directive = if verbose {
        "coachvault=debug"
    } else {
        "coachvault=warn"
    };
    init_observability_with(json, directive)?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<VaultConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(path) => VaultConfig::from_file(path)?,
        None => VaultConfig::default(),
    };
    if let Some(store) = &cli.store {
        config.store_dir = store.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Backup options from command-line flags, falling back to the config
///
/// A supplied passphrase implies encryption even without `--encrypt`.
fn backup_options(
    config: &VaultConfig,
    note: Option<String>,
    format: Option<FormatArg>,
    compression: Option<u8>,
    encrypt: bool,
    passphrase: Option<String>,
) -> Result<BackupOptions, anyhow::Error> {
    let mut options = BackupOptions::new()
        .with_format(format.map(Into::into).unwrap_or(config.default_format))
        .with_compression(compression.unwrap_or(config.default_compression));
    if let Some(note) = note {
        options = options.with_note(note);
    }
    if !encrypt && passphrase.is_some() {
        info!("Passphrase supplied, encrypting the archive");
    }
    if let Some(passphrase) = resolve_passphrase(passphrase, encrypt)? {
        options = options.encrypted_with(passphrase);
    }
    Ok(options)
}

/// Use the given passphrase, or prompt on stdin when one is required
fn resolve_passphrase(
    given: Option<String>,
    required: bool,
) -> Result<Option<Passphrase>, anyhow::Error> {
    match given {
        Some(value) => Ok(Some(Passphrase::new(value)?)),
        None if required => Ok(Some(read_passphrase()?)),
        None => Ok(None),
    }
}

fn read_passphrase() -> Result<Passphrase, anyhow::Error> {
    eprint!("Passphrase: ");
    io::stderr().flush()?;

    let mut line = Zeroizing::new(String::new());
    io::stdin().read_line(&mut line)?;
    Ok(Passphrase::new(line.trim_end_matches(&['\r', '\n'][..]))?)
}

fn load_archive(path: &Path) -> Result<Archive, anyhow::Error> {
    ArchiveFile::new(path)
        .load()
        .with_context(|| format!("Failed to load archive {}", path.display()))
}

fn create_backup(
    config: &VaultConfig,
    options: &BackupOptions,
    output: Option<&Path>,
) -> Result<Outcome, anyhow::Error> {
    let engine = create_engine_from_config(config)?;

    let mut saved_to = None;
    let backup = engine.create_backup_with(options, |backup| {
        let file = match output {
            Some(path) if path.extension().is_some() && !path.is_dir() => ArchiveFile::new(path),
            Some(dir) => ArchiveFile::in_dir(dir, backup.archive.metadata()),
            None => ArchiveFile::in_dir(&config.backup_dir, backup.archive.metadata()),
        };
        file.save(&backup.archive)?;
        saved_to = Some(file);
        Ok(())
    })?;
    let file = saved_to.context("Backup archive was not saved")?;
    info!(path = %file.path().display(), "Backup saved");

    println!("✓ Backup written to {}", file.path().display());
    print_statistics(&backup.statistics);
    for failure in &backup.failures {
        println!("  ! {failure}");
    }

    Ok(backup.outcome())
}

fn restore_backup(
    config: &VaultConfig,
    path: &Path,
    passphrase: Option<String>,
    require_encrypted: bool,
    dry_run: bool,
) -> Result<Outcome, anyhow::Error> {
    let archive = load_archive(path)?;
    let engine = create_engine_from_config(config)?;

    let mut options = RestoreOptions::new();
    if let Some(passphrase) = resolve_passphrase(passphrase, archive.metadata().encrypted)? {
        options = options.with_passphrase(passphrase);
    }
    if require_encrypted {
        options = options.require_encrypted();
    }

    if dry_run {
        let statistics = engine.preview(&archive, &options)?;
        println!("Dry run, nothing was written. Would restore:");
        print_statistics(&statistics);
        return Ok(Outcome::Complete);
    }

    let report = match engine.restore_backup(&archive, &options) {
        Ok(report) => report,
        Err(e @ VaultError::Decryption(_)) => {
            error!("✗ Could not decrypt archive: {}", e);
            return Err(anyhow::Error::new(e).context("Wrong passphrase or corrupted archive"));
        }
        Err(e) => return Err(e.into()),
    };

    match report.outcome() {
        Outcome::Complete => println!("✓ Restored {} records", report.restored_records()),
        Outcome::Partial => println!(
            "⚠ Restored {} records, {} failed",
            report.restored_records(),
            report.failures.len()
        ),
    }
    print_statistics(&report.statistics);
    for failure in &report.failures {
        println!("  ! {failure}");
    }
    if !report.ignored.is_empty() {
        println!("  Ignored unknown keys: {}", report.ignored.join(", "));
    }

    Ok(report.outcome())
}

fn verify_archive(
    config: &VaultConfig,
    path: &Path,
    passphrase: Option<String>,
) -> Result<Outcome, anyhow::Error> {
    let text = ArchiveFile::new(path).read_to_string()?;
    let report = validate(&text);
    if !report.valid {
        let reason = report.reason.unwrap_or_default();
        error!("✗ Archive is malformed: {}", reason);
        return Err(VaultError::malformed(reason).into());
    }

    let archive = Archive::parse(&text)?;
    if archive.metadata().encrypted && passphrase.is_none() {
        println!("✓ Archive structure is valid (encrypted contents not checked)");
        return Ok(Outcome::Complete);
    }

    let mut options = RestoreOptions::new();
    if let Some(passphrase) = passphrase {
        options = options.with_passphrase(Passphrase::new(passphrase)?);
    }
    match preview(&archive, &config.catalog()?, &options) {
        Ok(_) => println!("✓ Archive is valid and its contents are readable"),
        Err(e @ VaultError::IntegrityCheckFailed { .. }) => {
            if let VaultError::IntegrityCheckFailed { expected, actual } = &e {
                error!("✗ Integrity check failed:");
                error!("  Expected hash: {}", expected);
                error!("  Actual hash: {}", actual);
            }
            return Err(e.into());
        }
        Err(e) => {
            error!("✗ Failed to verify archive: {}", e);
            return Err(e.into());
        }
    }

    Ok(Outcome::Complete)
}

fn show_archive(
    config: &VaultConfig,
    path: &Path,
    passphrase: Option<String>,
) -> Result<Outcome, anyhow::Error> {
    let archive = load_archive(path)?;
    let metadata = archive.metadata();

    println!("Archive Details:");
    println!("  File: {}", path.display());
    if let Some(id) = &metadata.archive_id {
        println!("  Archive ID: {id}");
    }
    println!(
        "  Created: {}",
        metadata
            .created_at
            .map(|at| format_timestamp(at.timestamp()))
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!("  Format: {}", metadata.format);
    println!("  Compression: {}", metadata.compression);
    println!("  Encrypted: {}", if metadata.encrypted { "yes" } else { "no" });
    println!("  Format Version: {}", metadata.format_version);
    if let Some(version) = metadata.catalog_version {
        println!("  Catalog Version: {version}");
    }
    if let Some(hash) = &metadata.content_hash {
        println!("  Content Hash: {hash}");
    }
    if let Some(note) = &metadata.note {
        println!("  Note: {note}");
    }

    if metadata.encrypted && passphrase.is_none() {
        println!("  Records: supply a passphrase to count records");
        return Ok(Outcome::Complete);
    }

    let mut options = RestoreOptions::new();
    if let Some(passphrase) = passphrase {
        options = options.with_passphrase(Passphrase::new(passphrase)?);
    }
    let statistics = preview(&archive, &config.catalog()?, &options)?;
    println!("  Records:");
    print_statistics(&statistics);

    Ok(Outcome::Complete)
}

fn list_backups(dir: &Path) -> Result<Outcome, anyhow::Error> {
    if !dir.exists() {
        println!("No backup directory found at: {}", dir.display());
        return Ok(Outcome::Complete);
    }

    let rows: Vec<ArchiveRow> = list_archives(dir)?
        .into_iter()
        .map(|listing| {
            let file = listing
                .path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let size = format_size(listing.size_bytes);
            match listing.metadata {
                Some(metadata) => ArchiveRow {
                    file,
                    created: metadata
                        .created_at
                        .map(|at| format_timestamp(at.timestamp()))
                        .unwrap_or_default(),
                    format: metadata.format.to_string(),
                    compression: metadata.compression.to_string(),
                    encrypted: if metadata.encrypted { "yes" } else { "no" }.to_string(),
                    note: metadata.note.unwrap_or_default(),
                    size,
                },
                None => ArchiveRow {
                    file,
                    created: String::new(),
                    format: "invalid".to_string(),
                    compression: String::new(),
                    encrypted: String::new(),
                    note: String::new(),
                    size,
                },
            }
        })
        .collect();

    if rows.is_empty() {
        println!("No backups found");
    } else {
        println!("{}", Table::new(rows));
    }

    Ok(Outcome::Complete)
}

fn show_history(config: &VaultConfig, limit: Option<usize>) -> Result<Outcome, anyhow::Error> {
    let Some(path) = &config.history_path else {
        println!("History is disabled in the configuration");
        return Ok(Outcome::Complete);
    };

    let mut entries = JsonLinesHistory::new(path).read_all()?;
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    if entries.is_empty() {
        println!("No history recorded yet");
    } else {
        let rows: Vec<HistoryRow> = entries.into_iter().map(history_row).collect();
        println!("{}", Table::new(rows));
    }

    Ok(Outcome::Complete)
}

fn history_row(entry: HistoryEntry) -> HistoryRow {
    HistoryRow {
        at: format_timestamp(entry.at.timestamp()),
        operation: format!("{:?}", entry.kind).to_lowercase(),
        outcome: entry.outcome.to_string(),
        entries: entry.statistics.total(),
        failed: entry.failed_records.join(", "),
        note: entry.note.unwrap_or_default(),
    }
}

fn print_statistics(statistics: &Statistics) {
    let mut shown = false;
    for (record, count) in statistics.non_zero() {
        println!("    {record}: {count}");
        shown = true;
    }
    if !shown {
        println!("    (no records)");
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_cli_parses_backup() {
        let cli = Cli::try_parse_from([
            "coachvault",
            "--store",
            "/tmp/records",
            "backup",
            "--note",
            "weekly",
            "--compression",
            "80",
            "--format",
            "bak",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("/tmp/records")));
        match cli.command {
            Commands::Backup {
                note,
                compression,
                format,
                encrypt,
                ..
            } => {
                assert_eq!(note.as_deref(), Some("weekly"));
                assert_eq!(compression, Some(80));
                assert!(matches!(format, Some(FormatArg::Bak)));
                assert!(!encrypt);
            }
            _ => panic!("expected backup command"),
        }
    }

    #[test]
    fn test_cli_rejects_compression_above_range() {
        let result = Cli::try_parse_from(["coachvault", "backup", "--compression", "150"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_passphrase_implies_encryption() {
        let config = VaultConfig::default();
        let options = backup_options(
            &config,
            None,
            None,
            None,
            false,
            Some("squat rack".to_string()),
        )
        .unwrap();
        assert!(options.encrypted);
        assert!(options.passphrase.is_some());

        let plain = backup_options(&config, None, None, Some(40), false, None).unwrap();
        assert!(!plain.encrypted);
        assert_eq!(plain.compression, 40);
    }

    #[test]
    fn test_unsaved_backup_leaves_history_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = VaultConfig::rooted_at(temp_dir.path());
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = create_backup(
            &config,
            &BackupOptions::new(),
            Some(&blocker.join("sub").join("out.json")),
        );

        assert!(result.is_err());
        let history = JsonLinesHistory::new(temp_dir.path().join("backups/history.jsonl"));
        assert!(history.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_saved_backup_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let config = VaultConfig::rooted_at(temp_dir.path());
        let output = temp_dir.path().join("out.json");

        let outcome = create_backup(&config, &BackupOptions::new(), Some(&output)).unwrap();

        assert_eq!(outcome, Outcome::Complete);
        assert!(output.exists());
        let history = JsonLinesHistory::new(temp_dir.path().join("backups/history.jsonl"));
        assert_eq!(history.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_history_row() {
        let mut stats = Statistics::new();
        stats.record("students", 3);
        stats.record("foods", 2);
        let mut entry = HistoryEntry::new(
            coachvault_core::OperationKind::Restore,
            Outcome::Partial,
            stats,
        );
        entry.failed_records = vec!["mealPlans".to_string()];

        let row = history_row(entry);
        assert_eq!(row.operation, "restore");
        assert_eq!(row.outcome, "partial");
        assert_eq!(row.entries, 5);
        assert_eq!(row.failed, "mealPlans");
    }
}
