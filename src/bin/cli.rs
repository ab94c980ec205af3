//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `get-object`, `upload-random`, and `checksum`.
//!
//! Examples:
//! ```bash
//! s3pin --host-url https://store.example:9000 get-object   --bucket b --key k
//! s3pin --host-url https://store.example     --address 10.0.0.5:443 \
//!       upload-random --bucket b --key k --size 64MiB --seed 7
//! s3pin upload-random --bucket b --key k --file ./blob.bin
//! s3pin checksum ./blob.bin                      # local md5 to compare with a report
//! ```
//!
//! Credentials come from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
//! (environment or `.env`), the matching flags, or the settings file.
//!
//! Settings resolve in order: command line, environment, then the YAML file
//! given by `--config` (or `~/.s3pin.yaml` when it exists).

use anyhow::{Context, Result, bail};
use clap::parser::ValueSource;
use clap::{ArgAction, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use s3pin::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_UPLOAD_SIZE};
use s3pin::{
    ConnectionConfig, DigestWriter, RawConnectionSettings, SettingsFile, StaticCredentials,
    TransferProgress, TransferRequest, TransferResult, UploadOptions, UploadSource, download_object,
    upload_object,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

// -- Commands

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity: -v = Info, -vv = Debug"
    )]
    verbose: u8,

    /// Same as -vv, and dumps the resolved configuration.
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    conn: ConnectionArgs,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// YAML settings file [default: ~/.s3pin.yaml, if present]
    #[arg(long = "config", env = "S3PIN_CONFIG", global = true)]
    config_file: Option<PathBuf>,

    /// Endpoint URL, e.g. https://store.example:9000
    #[arg(long, env = "S3PIN_HOST_URL", global = true)]
    host_url: Option<String>,

    /// host:port every connection is dialed to, regardless of the URL host
    #[arg(long, env = "S3PIN_ADDRESS", global = true)]
    address: Option<String>,

    /// Name verified against the server certificate (defaults to the URL host)
    #[arg(long, env = "S3PIN_SERVER_NAME", global = true)]
    server_name: Option<String>,

    /// PEM file with extra CA certificates to trust
    #[arg(long, env = "S3PIN_CA_FILE", global = true)]
    ca_file: Option<PathBuf>,

    /// Accept any server certificate
    #[arg(long, global = true)]
    skip_verify: bool,

    /// Read/copy buffer size in bytes
    #[arg(long, env = "S3PIN_BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE, global = true)]
    buffer_size: usize,

    /// Signing region (defaults to us-east-1)
    #[arg(long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    /// Bound on dial + TLS handshake, e.g. 10s. Unbounded if unset.
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    connect_timeout: Option<Duration>,

    /// Bound on each storage request, e.g. 5m. Unbounded if unset.
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    operation_timeout: Option<Duration>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true, global = true)]
    access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    secret_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Download one object, discard the bytes, and report size and MD5.
    GetObject {
        #[arg(short, long)]
        bucket: String,
        #[arg(short, long)]
        key: String,
    },

    /// Upload random bytes (or a local file) as one object and report size and MD5.
    UploadRandom {
        #[arg(short, long)]
        bucket: String,
        #[arg(short, long)]
        key: String,

        /// Number of random bytes, e.g. 1048576, 64MiB, 2GB
        #[arg(short, long, default_value_t = DEFAULT_UPLOAD_SIZE, value_parser = parse_size)]
        size: u64,

        /// Seed for reproducible data
        #[arg(long, conflicts_with = "file")]
        seed: Option<u64>,

        /// Upload this file instead of random data
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Compute the MD5 of a local file the same way transfers do.
    Checksum {
        path: PathBuf,
    },
}

impl ConnectionArgs {
    fn raw_settings(&self) -> RawConnectionSettings {
        RawConnectionSettings {
            host_url: self.host_url.clone(),
            address: self.address.clone(),
            server_name: self.server_name.clone(),
            ca_file: self.ca_file.clone(),
            skip_verify: self.skip_verify,
            buffer_size: self.buffer_size,
            region: self.region.clone(),
            connect_timeout: self.connect_timeout,
            operation_timeout: self.operation_timeout,
        }
    }

    fn credentials(&self, file: Option<&SettingsFile>) -> Result<StaticCredentials> {
        let access_key = self.access_key.clone().or_else(|| file.and_then(|f| f.access_key.clone()));
        let secret_key = self.secret_key.clone().or_else(|| file.and_then(|f| f.secret_key.clone()));
        match (access_key, secret_key) {
            (Some(ak), Some(sk)) if !ak.is_empty() && !sk.is_empty() => Ok(StaticCredentials::new(ak, sk)),
            _ => bail!(
                "Missing credentials. Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY either in your environment or in a .env file, pass --access-key/--secret-key, or add access_key/secret_key to the settings file."
            ),
        }
    }
}

/// Accept plain byte counts or humanized sizes (KiB/MiB/GiB and KB/MB/GB).
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().map_err(|_| format!("invalid size `{s}`"))?;
    let mult: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "kib" => 1 << 10,
        "m" | "mb" => 1_000_000,
        "mib" => 1 << 20,
        "g" | "gb" => 1_000_000_000,
        "gib" => 1 << 30,
        other => return Err(format!("unknown size unit `{other}`")),
    };
    n.checked_mul(mult).ok_or_else(|| format!("size `{s}` overflows"))
}

fn progress_for(verbose: u8, operation: &str) -> TransferProgress {
    if verbose > 0 {
        TransferProgress::new(operation, None)
    } else {
        TransferProgress::hidden()
    }
}

fn report(result: &TransferResult) -> Result<()> {
    safe_println!("total bytes: {}", result.bytes_transferred);
    safe_println!("md5sum: {}", result.digest_hex);
    if let Some(w) = &result.warning {
        warn!("{w}");
        eprintln!("warning: {w}");
    }
    Ok(())
}

fn checksum_cmd(path: &Path, buffer_size: usize) -> Result<()> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = io::BufReader::with_capacity(buffer_size, file);
    let mut writer = DigestWriter::new(io::sink());
    io::copy(&mut reader, &mut writer).with_context(|| format!("reading {}", path.display()))?;
    let digest = writer.finalize();
    safe_println!("total bytes: {}", digest.bytes);
    safe_println!("md5sum: {}", digest.hex);
    Ok(())
}

fn resolve_connection(
    conn: &ConnectionArgs,
    buffer_size_is_default: bool,
    dump: bool,
) -> Result<(ConnectionConfig, StaticCredentials)> {
    let file = SettingsFile::discover(conn.config_file.as_deref()).context("loading settings file")?;
    let mut raw = conn.raw_settings();
    if let Some(file) = &file {
        file.fill_unset(&mut raw, buffer_size_is_default);
    }
    if dump {
        debug!(settings = ?raw, "raw connection settings");
    }
    let config = ConnectionConfig::derive(&raw).context("invalid connection settings")?;
    let credentials = conn.credentials(file.as_ref())?;
    if dump {
        debug!(?credentials, "credentials");
    }
    info!(address = %config.address, tls = config.use_tls, "using pinned endpoint");
    Ok((config, credentials))
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    // only a buffer size the user actually chose should override the settings file
    let buffer_size_is_default = matches!(
        matches.value_source("buffer_size"),
        None | Some(ValueSource::DefaultValue)
    );
    let verbose = if cli.debug { cli.verbose.max(2) } else { cli.verbose };

    let filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.cmd {
        Command::Checksum { path } => {
            checksum_cmd(&path, cli.conn.buffer_size.max(1))?;
        }

        Command::GetObject { bucket, key } => {
            let (config, credentials) = resolve_connection(&cli.conn, buffer_size_is_default, cli.debug)?;
            let request = TransferRequest::new(bucket, key).with_buffer_size(config.buffer_size);
            let progress = progress_for(verbose, "download");
            let result = download_object(&config, &credentials, &request, &progress)
                .await
                .context("get-object failed")?;
            report(&result)?;
        }

        Command::UploadRandom {
            bucket,
            key,
            size,
            seed,
            file,
        } => {
            let (config, credentials) = resolve_connection(&cli.conn, buffer_size_is_default, cli.debug)?;
            let source = match file {
                Some(path) => UploadSource::File(path),
                None => UploadSource::Random { size, seed },
            };
            let request = TransferRequest::new(bucket, key).with_buffer_size(config.buffer_size);
            let progress = progress_for(verbose, "upload");
            let result = upload_object(
                &config,
                &credentials,
                &request,
                &source,
                &UploadOptions::default(),
                &progress,
            )
            .await
            .context("upload failed")?;
            report(&result)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_parse_with_units() {
        assert_eq!(parse_size("1048576").unwrap(), 1_048_576);
        assert_eq!(parse_size("64MiB").unwrap(), 64 << 20);
        assert_eq!(parse_size("2gb").unwrap(), 2_000_000_000);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("MiB").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn buffer_size_source_is_visible() {
        let matches = Cli::command()
            .try_get_matches_from(["s3pin", "get-object", "-b", "b", "-k", "k"])
            .unwrap();
        assert_eq!(matches.value_source("buffer_size"), Some(ValueSource::DefaultValue));

        let matches = Cli::command()
            .try_get_matches_from(["s3pin", "--buffer-size", "4096", "get-object", "-b", "b", "-k", "k"])
            .unwrap();
        assert_eq!(matches.value_source("buffer_size"), Some(ValueSource::CommandLine));
    }

    #[test]
    fn credentials_fall_back_to_settings_file() {
        let mut cli = Cli::try_parse_from(["s3pin", "--access-key", "AKIDFLAG", "checksum", "x"]).unwrap();
        // ignore whatever the surrounding environment provides
        cli.conn.secret_key = None;
        let file = SettingsFile::parse("access_key: AKIDFILE\nsecret_key: from-file\n").unwrap();
        let creds = cli.conn.credentials(Some(&file)).unwrap();
        assert_eq!(creds.access_key_id, "AKIDFLAG");
        assert_eq!(creds.secret_access_key, "from-file");
    }
}
