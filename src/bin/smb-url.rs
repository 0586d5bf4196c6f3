//! SMB URL CLI
//!
//! Drives the `smb://` handler from the command line. With `--share` the
//! URLs are served from local directories; otherwise they go to real servers
//! through libsmbclient (the `smbclient` feature).

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use rust_smb_url::{
    AvioFlags, EntryType, LocalLibrary, LocalShare, SmbLibrary, SmbOptions, SmbProtocol, UrlProtocol,
    UrlStream,
};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "smb-url")]
#[command(about = "Access smb:// URLs on SMB servers or local loopback shares", long_about = None)]
struct Args {
    /// Serve SERVER/SHARE from a local directory instead of the network, as SERVER/SHARE=DIR
    #[arg(short = 's', long = "share", value_parser = parse_share)]
    shares: Vec<(String, String, PathBuf)>,

    /// User name required by the local shares
    #[arg(short = 'u', long, requires_all = ["password", "shares"])]
    user: Option<String>,

    /// Password required by the local shares
    #[arg(short = 'P', long, requires_all = ["user", "shares"])]
    password: Option<String>,

    /// Connection timeout in milliseconds
    #[arg(short = 't', long)]
    timeout: Option<i32>,

    /// Keep existing contents when writing
    #[arg(long)]
    no_truncate: bool,

    /// Workgroup used when connecting
    #[arg(short = 'w', long)]
    workgroup: Option<String>,

    /// Set a handler option, as name=value
    #[arg(short = 'o', long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Log level
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a file to stdout
    Cat { url: String },

    /// Upload a local file
    Put {
        /// Local file path
        local: PathBuf,
        /// Destination URL
        url: String,
    },

    /// List a directory
    Ls { url: String },

    /// Delete a file or empty directory
    Rm { url: String },

    /// Rename a file or directory within its share
    Mv { src: String, dst: String },

    /// Print the size of a file
    Size { url: String },
}

fn parse_share(arg: &str) -> Result<(String, String, PathBuf), String> {
    let (name, dir) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected SERVER/SHARE=DIR, got '{}'", arg))?;
    let (server, share) = name
        .split_once('/')
        .filter(|(server, share)| !server.is_empty() && !share.is_empty())
        .ok_or_else(|| format!("expected SERVER/SHARE before '=', got '{}'", name))?;
    Ok((server.to_string(), share.to_string(), PathBuf::from(dir)))
}

fn parse_option(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))
}

fn format_time(micros: i64) -> String {
    if micros < 0 {
        return "-".to_string();
    }
    match Local.timestamp_micros(micros).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

fn run<L: SmbLibrary>(library: L, command: Commands, options: SmbOptions) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Cat { url } => {
            let proto = SmbProtocol::open_url(library, &url, AvioFlags::READ, options)?;
            let mut stream = UrlStream::new(proto);
            let copied = io::copy(&mut stream, &mut io::stdout().lock())?;
            tracing::info!("Read {} bytes from {}", copied, url);
            stream.close()?;
        }

        Commands::Put { local, url } => {
            let mut file = std::fs::File::open(&local)?;
            let proto = SmbProtocol::open_url(library, &url, AvioFlags::WRITE, options)?;
            let mut stream = UrlStream::new(proto);
            let copied = io::copy(&mut file, &mut stream)?;
            tracing::info!("Uploaded {} bytes to {}", copied, url);
            stream.close()?;
        }

        Commands::Ls { url } => {
            let mut proto = SmbProtocol::with_options(library, url, options);
            proto.open_dir()?;
            let mut out = io::stdout().lock();
            while let Some(entry) = proto.read_dir()? {
                let kind = match entry.entry_type {
                    EntryType::Directory => 'd',
                    EntryType::File => '-',
                    EntryType::Unknown => '?',
                };
                writeln!(
                    out,
                    "{} {:>12} {} {}",
                    kind,
                    entry.size,
                    format_time(entry.modification_timestamp),
                    entry.name
                )?;
            }
            proto.close_dir()?;
        }

        Commands::Rm { url } => {
            SmbProtocol::with_options(library, url.as_str(), options).delete()?;
            tracing::info!("Deleted {}", url);
        }

        Commands::Mv { src, dst } => {
            SmbProtocol::with_options(library, src.as_str(), options).move_to(&dst)?;
            tracing::info!("Moved {} -> {}", src, dst);
        }

        Commands::Size { url } => {
            let mut stream = UrlStream::new(SmbProtocol::open_url(library, &url, AvioFlags::READ, options)?);
            println!("{}", stream.size()?);
            stream.close()?;
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut options = SmbOptions::default();
    if let Some(timeout) = args.timeout {
        options.set("timeout", &timeout.to_string())?;
    }
    if args.no_truncate {
        options.truncate = false;
    }
    if let Some(workgroup) = &args.workgroup {
        options.set("workgroup", workgroup)?;
    }
    for (name, value) in &args.options {
        options.set(name, value)?;
    }

    if !args.shares.is_empty() {
        let mut library = LocalLibrary::new();
        for (server, share, dir) in &args.shares {
            let mut local = LocalShare::new(dir);
            if let (Some(user), Some(password)) = (&args.user, &args.password) {
                local = local.with_credentials(user, password);
            }
            tracing::info!("Exporting {} as {}/{}", dir.display(), server, share);
            library = library.with_share(server, share, local);
        }
        return run(library, args.command, options);
    }

    #[cfg(feature = "smbclient")]
    {
        run(rust_smb_url::SmbClientLibrary::new(), args.command, options)
    }

    #[cfg(not(feature = "smbclient"))]
    {
        Err("no --share given and this build has no network client (enable the `smbclient` feature)".into())
    }
}
