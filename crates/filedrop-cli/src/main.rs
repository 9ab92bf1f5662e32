//! filedrop CLI
//!
//! Thin wrapper around filedrop-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Upload two files into a bucket folder
//! filedrop upload a.pdf b.pdf --bucket media/docs --multiple
//!
//! # Upload an avatar, cropped to 340x255 and scaled to 170x128
//! filedrop upload face.png --bucket media --path avatars --crop 10,10,340,255 --final-size 170x128
//!
//! # Try the rules without touching the bucket
//! filedrop upload face.png --bucket media --dry-run
//!
//! # Check files against the rules only
//! filedrop validate report.csv --allowed-type csv --max-filename-length 40
//!
//! # Crop locally
//! filedrop crop in.jpg out.jpg --area 0,0,200,200
//!
//! # Show the effective configuration
//! filedrop config show
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use filedrop_core::config::default_config_path;
use filedrop_core::crop::edit_image;
use filedrop_core::decode::decode_image;
use filedrop_core::logging::JournalLayer;
use filedrop_core::validator::{check_selection_count, validate_image_size, validate_selection};
use filedrop_core::{
    mime_for_name, CropArea, EditParams, FilePicker, FileSelection, MemoryStore, ObjectLocation,
    ObjectStore, PickerConfig, PickerEvent, PickerState, S3Store,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// filedrop - validated, croppable uploads straight to a bucket
#[derive(Parser)]
#[command(name = "filedrop")]
#[command(version = "0.1.0")]
#[command(about = "filedrop - validated, croppable uploads straight to a bucket")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.config/filedrop/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also append a JSONL journal of this run under this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and upload files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Bucket name, optionally followed by /folders
        #[arg(short, long)]
        bucket: Option<String>,

        #[command(flatten)]
        rules: RuleArgs,

        /// Crop the uploaded image to X,Y,W,H (single image only)
        #[arg(long, value_parser = parse_area)]
        crop: Option<CropArea>,

        /// Scale the cropped image to WxH
        #[arg(long, value_parser = parse_size, requires = "crop")]
        final_size: Option<(u32, u32)>,

        /// Upload into memory instead of the bucket
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check files against the selection rules without uploading
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        rules: RuleArgs,
    },

    /// Crop an image locally
    Crop {
        input: PathBuf,

        output: PathBuf,

        /// Area to keep, as X,Y,W,H
        #[arg(long, value_parser = parse_area)]
        area: CropArea,

        /// Scale the result to WxH
        #[arg(long, value_parser = parse_size)]
        final_size: Option<(u32, u32)>,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
}

/// Selection rules; each flag overrides the config file.
#[derive(Args)]
struct RuleArgs {
    /// Accept several files at once
    #[arg(long)]
    multiple: bool,

    /// Folder inside the bucket
    #[arg(long)]
    path: Option<String>,

    /// Allowed extension (repeatable or comma separated)
    #[arg(long = "allowed-type", value_delimiter = ',')]
    allowed_types: Vec<String>,

    /// Allowed mime type, `type/*` for a family (repeatable or comma separated)
    #[arg(long = "allowed-mime", value_delimiter = ',')]
    allowed_mimes: Vec<String>,

    /// Refused mime type (repeatable or comma separated)
    #[arg(long = "excluded-mime", value_delimiter = ',')]
    excluded_mimes: Vec<String>,

    #[arg(long)]
    max_filename_length: Option<usize>,

    #[arg(long)]
    min_width: Option<u32>,

    #[arg(long)]
    min_height: Option<u32>,

    #[arg(long)]
    max_width: Option<u32>,

    #[arg(long)]
    max_height: Option<u32>,
}

impl RuleArgs {
    fn apply(&self, config: &mut PickerConfig) {
        let options = &mut config.options;
        if self.multiple {
            options.allow_multiple = true;
        }
        if let Some(path) = &self.path {
            options.path = Some(path.clone());
        }
        if !self.allowed_types.is_empty() {
            options.allowed_types = Some(self.allowed_types.clone());
        }
        if !self.allowed_mimes.is_empty() {
            options.allowed_mimes = Some(self.allowed_mimes.clone());
        }
        if !self.excluded_mimes.is_empty() {
            options.excluded_mimes = Some(self.excluded_mimes.clone());
        }
        if self.max_filename_length.is_some() {
            options.max_filename_length = self.max_filename_length;
        }

        let image = &mut config.image;
        image.min_width = self.min_width.or(image.min_width);
        image.min_height = self.min_height.or(image.min_height);
        image.max_width = self.max_width.or(image.max_width);
        image.max_height = self.max_height.or(image.max_height);
    }
}

fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let journal = match log_dir {
        Some(dir) => {
            let run = ulid::Ulid::new().to_string();
            Some(
                JournalLayer::new(dir, run)
                    .with_context(|| format!("Failed to open journal in {}", dir.display()))?,
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(journal)
        .init();
    Ok(())
}

/// Parse `X,Y,W,H`
fn parse_area(s: &str) -> std::result::Result<CropArea, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("Invalid crop area '{}': {}", s, e))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0 && *h > 0 => Ok(CropArea::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err(format!("Crop area '{}' must have a non-zero size", s)),
        _ => Err(format!("Crop area '{}' must be X,Y,W,H", s)),
    }
}

/// Parse `WxH`
fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Size '{}' must be WxH", s))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("Invalid width '{}': {}", w, e))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("Invalid height '{}': {}", h, e))?;
    Ok((w, h))
}

fn load_config(path: &Path) -> Result<PickerConfig> {
    let mut config = PickerConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env()?;
    tracing::debug!(path = %path.display(), bucket = %config.store.bucket, "Loaded config");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_dir.as_deref())?;

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path)?;

    match cli.command {
        Commands::Upload {
            files,
            bucket,
            rules,
            crop,
            final_size,
            dry_run,
            json,
        } => {
            if let Some(bucket) = bucket {
                config.store.bucket = bucket;
            }
            rules.apply(&mut config);
            if crop.is_some() {
                config.options.crop = true;
            }
            let request = UploadRequest {
                files,
                crop,
                final_size,
                json,
                verbose: cli.verbose > 0,
            };

            if dry_run {
                let store = MemoryStore::new();
                run_upload(store.clone(), &config, request).await?;
                if !json {
                    println!("Dry run: {} upload(s), nothing left this machine", store.put_count());
                }
            } else {
                let location = ObjectLocation::new(&config.store.bucket, None);
                let credentials = config.store.credentials.as_ref().context(
                    "No session credentials. Set FILEDROP_ACCESS_KEY_ID, FILEDROP_SECRET_ACCESS_KEY, \
                     FILEDROP_SESSION_TOKEN and FILEDROP_CREDENTIALS_EXPIRE_AT, or use --dry-run",
                )?;
                let store = S3Store::connect(
                    location.bucket(),
                    &config.store.region,
                    config.store.endpoint.as_deref(),
                    credentials,
                )
                .await?;
                run_upload(store, &config, request).await?;
            }
        }

        Commands::Validate { files, rules } => {
            rules.apply(&mut config);
            let options = config.checked_options()?;
            let selection = FileSelection::from_paths(&files).await?;

            check_selection_count(&selection, &options)?;
            validate_selection(&selection, &options)?;
            if options.crop {
                for file in selection.iter().filter(|f| f.is_image()) {
                    let image = decode_image(&file.body, &file.mime)?;
                    validate_image_size(image.width(), image.height(), &config.image)?;
                }
            }

            println!("✓ {} file(s) pass validation", selection.len());
            for file in selection.iter() {
                println!("  {} ({}, {} bytes)", file.name, file.mime, file.size);
            }
        }

        Commands::Crop {
            input,
            output,
            area,
            final_size,
        } => {
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let source = decode_image(&bytes, &mime_for_name(&input.to_string_lossy()))?;

            let mut params = EditParams::from_area(&area);
            if let Some((w, h)) = final_size {
                params = params.with_final_size(w, h);
            }
            let out_name = output.to_string_lossy();
            let blob = edit_image(&source, &params, &out_name, &mime_for_name(&out_name))?;

            tokio::fs::write(&output, &blob.body)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "✓ Cropped {}x{} → {}x{} ({})",
                source.width(),
                source.height(),
                blob.width,
                blob.height,
                output.display()
            );
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = config.clone();
                if let Some(creds) = shown.store.credentials.as_mut() {
                    creds.secret_access_key = "<redacted>".to_string();
                    if creds.session_token.is_some() {
                        creds.session_token = Some("<redacted>".to_string());
                    }
                }
                println!("{}", serde_json::to_string_pretty(&shown)?);
            }
            ConfigAction::Path => {
                println!("{}", config_path.display());
            }
        },
    }

    Ok(())
}

struct UploadRequest {
    files: Vec<PathBuf>,
    crop: Option<CropArea>,
    final_size: Option<(u32, u32)>,
    json: bool,
    verbose: bool,
}

async fn run_upload<S: ObjectStore>(
    store: S,
    config: &PickerConfig,
    request: UploadRequest,
) -> Result<()> {
    let mut picker = FilePicker::from_config(store, config)?;

    let printer = {
        let mut rx = picker.subscribe();
        let quiet = request.json;
        let verbose = request.verbose;
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if !quiet => print_event(&event, verbose),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let outcome = upload(&mut picker, &request).await;
    let result = picker.result().cloned();
    drop(picker);
    let _ = printer.await;

    match (outcome?, result) {
        (PickerState::Completed, Some(result)) => {
            if request.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Uploaded {} file(s):", result.len());
                for url in &result.urls {
                    println!("  {}", url);
                }
            }
            Ok(())
        }
        (state, _) => anyhow::bail!("Upload did not complete ({})", state),
    }
}

async fn upload<S: ObjectStore>(
    picker: &mut FilePicker<S>,
    request: &UploadRequest,
) -> Result<PickerState> {
    let selection = FileSelection::from_paths(&request.files).await?;
    let state = picker.select(selection).await?;
    if state != PickerState::AwaitingCrop {
        return Ok(state);
    }

    match request.crop {
        Some(area) => Ok(picker.apply_crop(area, request.final_size).await?),
        None => {
            picker.cancel_crop()?;
            anyhow::bail!("Crop is enabled but no --crop area was given")
        }
    }
}

fn print_event(event: &PickerEvent, verbose: bool) {
    match event {
        PickerEvent::SelectionAccepted { files, total_size } => {
            println!("Uploading {} file(s), {} bytes", files, total_size);
        }
        PickerEvent::Progress { index, percent } if verbose => {
            println!("  [{}] {:>3}%", index, percent);
        }
        PickerEvent::FileUploaded { index, url } => {
            println!("  ✓ [{}] {}", index, url);
        }
        PickerEvent::CropRequested {
            width, height, ..
        } => {
            println!("Cropping {}x{} source", width, height);
        }
        PickerEvent::Failed { message } => {
            eprintln!("✗ {}", message);
        }
        PickerEvent::Cancelled => {
            println!("Cancelled");
        }
        _ => {}
    }
}
