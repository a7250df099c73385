//! filekit CLI - Cross-Dialect Paths and Verified File Transfers

use clap::Parser;
use console::style;
use filekit::config::{
    CliArgs, Commands, HashAlgorithm, OutputFormat, TransferArgs, TransferConfig,
};
use filekit::core::TransferEngine;
use filekit::error::{FilekitError, IoResultExt, Result};
use filekit::fs::{collect_file_metadata_with, find_files_with, FileMetadata, FindOptions};
use filekit::hash::{
    calculate_directory_hashes_multi, compare_directories_with, hash_file_multi,
    verify_copied_files,
};
use filekit::path::{split_drive_letter, validate_path_chars, PathResolver, Platform};
use filekit::progress::ProgressReporter;
use filekit::system::{check_disk_space, get_disk_usage, volume_info};
use humansize::{format_size, BINARY};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = CliArgs::parse();
    init_logging(&args);

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("filekit={}", default_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match args.output_format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Dispatch a subcommand; `Ok(false)` means "ran, but the check failed"
fn run(args: &CliArgs) -> Result<bool> {
    let format = args.output_format;
    match &args.command {
        Commands::Copy(transfer) => cmd_transfer(transfer, false, args.quiet, format),
        Commands::Move(transfer) => cmd_transfer(transfer, true, args.quiet, format),
        Commands::Hash {
            path,
            algorithm,
            output,
        } => cmd_hash(path, algorithm, output.as_deref(), format),
        Commands::Verify {
            source,
            destination,
            algorithm,
        } => cmd_verify(source, destination, *algorithm, format),
        Commands::Compare {
            left,
            right,
            algorithm,
        } => cmd_compare(left, right, *algorithm, format),
        Commands::Normalize { path, to } => cmd_normalize(path, *to, args.verbose > 0, format),
        Commands::Split { path } => cmd_split(path, format),
        Commands::CheckPath { path, platform } => {
            cmd_check_path(path, platform.unwrap_or_else(Platform::host), format)
        }
        Commands::Disk {
            path,
            required,
            margin,
        } => cmd_disk(path, required.as_deref(), *margin, format),
        Commands::Find {
            dir,
            include,
            exclude,
            ignore_case,
        } => cmd_find(dir, include, exclude, *ignore_case, format),
        Commands::Metadata {
            path,
            follow_symlinks,
        } => cmd_metadata(path, *follow_symlinks, format),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn native(path: &str) -> Result<PathBuf> {
    PathResolver::host().resolve(path)
}

fn mark(ok: bool) -> console::StyledObject<&'static str> {
    if ok {
        style("✓").green()
    } else {
        style("✗").red()
    }
}

fn cmd_transfer(args: &TransferArgs, is_move: bool, quiet: bool, format: OutputFormat) -> Result<bool> {
    let config = TransferConfig::from_args(args).map_err(FilekitError::Config)?;
    let source = native(&args.source)?;
    let destination = native(&args.destination)?;

    let progress = if args.progress && !quiet && format == OutputFormat::Text {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    };
    let engine = TransferEngine::new(config).with_progress(progress);

    let outcome = match (source.is_dir(), is_move) {
        (true, false) => engine.copy_tree(&source, &destination),
        (true, true) => engine.move_tree(&source, &destination),
        (false, false) => engine.copy_file(&source, &destination),
        (false, true) => engine.move_file(&source, &destination),
    };

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            if let Some(progress) = engine.progress() {
                progress.finish(false, &e.to_string());
            }
            return Err(e);
        }
    };

    if let Some(progress) = engine.progress() {
        let message = if result.is_success() {
            "Transfer complete"
        } else {
            "Transfer finished with errors"
        };
        progress.finish(result.is_success(), message);
    }

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text if !quiet => result.print_summary(),
        OutputFormat::Text => {}
    }
    Ok(result.is_success())
}

fn cmd_hash(path: &str, algorithms: &[HashAlgorithm], output: Option<&Path>, format: OutputFormat) -> Result<bool> {
    let path = native(path)?;
    let algorithms = if algorithms.is_empty() {
        vec![HashAlgorithm::default()]
    } else {
        algorithms.to_vec()
    };

    if path.is_file() {
        let results = hash_file_multi(&path, &algorithms)?;
        match format {
            OutputFormat::Json => print_json(&results)?,
            OutputFormat::Text => {
                for result in &results {
                    println!("{}  {}  {}", result.algorithm, result.hash, path.display());
                }
            }
        }
        return Ok(true);
    }

    let manifest = calculate_directory_hashes_multi(&path, &algorithms)?;
    let records = manifest.records();
    if let Some(output) = output {
        let file = std::fs::File::create(output).with_path(output)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &records)?;
    }
    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Text => {
            for record in &records {
                println!("{}  {}  {}", record.algorithm, record.digest, record.relative_path);
            }
            println!("\n{} files hashed", manifest.len());
        }
    }
    Ok(true)
}

fn cmd_verify(source: &str, destination: &str, algorithm: HashAlgorithm, format: OutputFormat) -> Result<bool> {
    let source = native(source)?;
    let destination = native(destination)?;
    let report = verify_copied_files(&source, &destination, algorithm)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!(
                "Verifying {} against {} ({})...\n",
                destination.display(),
                source.display(),
                algorithm
            );
            report.diff.print_summary();
            println!(
                "\n{} {}",
                mark(report.passed),
                if report.passed { "All files match" } else { "Verification failed" }
            );
        }
    }
    Ok(report.passed)
}

fn cmd_compare(left: &str, right: &str, algorithm: HashAlgorithm, format: OutputFormat) -> Result<bool> {
    let report = compare_directories_with(&native(left)?, &native(right)?, algorithm)?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => report.print_summary(),
    }
    Ok(!report.has_differences())
}

#[derive(Serialize)]
struct NormalizeOutput {
    input: String,
    dialect: filekit::path::Dialect,
    target: filekit::path::Dialect,
    normalized: String,
    path_type: filekit::path::PathType,
}

fn cmd_normalize(
    path: &str,
    to: Option<filekit::path::Dialect>,
    verbose: bool,
    format: OutputFormat,
) -> Result<bool> {
    let resolver = PathResolver::host();
    let normalized = resolver.normalize(path, to)?;
    let output = NormalizeOutput {
        input: path.to_string(),
        dialect: normalized.spec().dialect(),
        target: normalized.target(),
        normalized: normalized.as_str().to_string(),
        path_type: normalized.spec().path_type(resolver.capabilities()),
    };

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text if verbose => {
            println!("Input:      {}", output.input);
            println!("Dialect:    {}", output.dialect);
            println!("Target:     {}", output.target);
            println!("Path type:  {}", output.path_type);
            println!("Normalized: {}", output.normalized);
        }
        OutputFormat::Text => println!("{}", output.normalized),
    }
    Ok(true)
}

fn cmd_split(path: &str, format: OutputFormat) -> Result<bool> {
    let (drive, rest) = split_drive_letter(path)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "drive": drive, "path": rest }))?,
        OutputFormat::Text => {
            println!("Drive: {}", drive);
            println!("Path:  {}", rest);
        }
    }
    Ok(true)
}

fn cmd_check_path(path: &str, platform: Platform, format: OutputFormat) -> Result<bool> {
    let outcome = validate_path_chars(path, platform);
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "path": path,
            "platform": platform,
            "valid": outcome.is_ok(),
            "error": outcome.as_ref().err().map(|e| e.to_string()),
        }))?,
        OutputFormat::Text => match &outcome {
            Ok(()) => println!("{} valid on {}", mark(true), platform),
            Err(e) => println!("{} {}", mark(false), e),
        },
    }
    Ok(outcome.is_ok())
}

fn cmd_disk(path: &str, required: Option<&str>, margin: f64, format: OutputFormat) -> Result<bool> {
    let path = native(path)?;
    let usage = get_disk_usage(&path)?;
    let volume = volume_info(&path);
    let check = match required {
        Some(size) => {
            let bytes = filekit::config::parse_size(size).map_err(FilekitError::Config)?;
            Some(check_disk_space(&path, bytes, margin)?)
        }
        None => None,
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "path": path,
            "usage": &usage,
            "volume": &volume,
            "check": &check,
        }))?,
        OutputFormat::Text => {
            println!("=== Disk Usage: {} ===", path.display());
            if let Some(volume) = &volume {
                println!("Mount point: {}", volume.mount_point.display());
                println!("Filesystem:  {}", volume.file_system);
            }
            println!("Total:       {}", format_size(usage.total, BINARY));
            println!("Used:        {} ({:.1}%)", format_size(usage.used, BINARY), usage.used_percent());
            println!("Free:        {} ({:.1}%)", format_size(usage.free, BINARY), usage.free_percent());
            if let Some(check) = &check {
                println!("\n{} {}", mark(check.has_space), check.message);
            }
        }
    }
    Ok(check.map(|c| c.has_space).unwrap_or(true))
}

fn cmd_find(dir: &str, include: &[String], exclude: &[String], ignore_case: bool, format: OutputFormat) -> Result<bool> {
    let mut options = FindOptions::new(include, exclude);
    if ignore_case {
        options = options.case_insensitive(true);
    }

    let mut found = Vec::new();
    let mut clean = true;
    for entry in find_files_with(&native(dir)?, &options)? {
        match entry {
            Ok(path) => {
                if format == OutputFormat::Text {
                    println!("{}", path.display());
                }
                found.push(path);
            }
            Err(e) => {
                warn!("{}", e);
                clean = false;
            }
        }
    }

    if format == OutputFormat::Json {
        print_json(&found)?;
    }
    Ok(clean)
}

fn format_time(time: Option<SystemTime>) -> String {
    time.map(|t| {
        chrono::DateTime::<chrono::Local>::from(t)
            .format("%Y-%m-%d %H:%M:%S%.3f %z")
            .to_string()
    })
    .unwrap_or_else(|| "-".to_string())
}

fn print_metadata(path: &Path, md: &FileMetadata) {
    println!("=== {} ===", path.display());
    println!("Size:        {}", format_size(md.size, BINARY));
    println!("Modified:    {}", format_time(md.modified));
    println!("Accessed:    {}", format_time(md.accessed));
    println!("Changed:     {}", format_time(md.changed));
    match md.permissions.mode {
        Some(mode) => println!("Mode:        {:o}{}", mode, if md.permissions.readonly { " (read-only)" } else { "" }),
        None => println!("Read-only:   {}", md.permissions.readonly),
    }
    if let Some(owner) = &md.ownership {
        println!("Owner:       uid={} gid={}", owner.uid, owner.gid);
    }
    if let Some(attrs) = md.windows_attributes {
        println!("Attributes:  {:#x}", attrs);
    }
    if md.is_symlink || md.is_junction {
        let kind = if md.is_junction { "Dir link" } else { "Symlink" };
        match &md.symlink_target {
            Some(target) => println!("{}:     -> {}", kind, target.display()),
            None => println!("{}", kind),
        }
    }
    for (name, value) in &md.extended_attrs {
        println!("xattr:       {} ({} bytes)", name, value.len());
    }
}

fn cmd_metadata(path: &str, follow_symlinks: bool, format: OutputFormat) -> Result<bool> {
    let path = native(path)?;
    let md = collect_file_metadata_with(&path, follow_symlinks)?;
    match format {
        OutputFormat::Json => print_json(&md)?,
        OutputFormat::Text => print_metadata(&path, &md),
    }
    Ok(true)
}
