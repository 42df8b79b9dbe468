use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use packfs_core::archive::zip::{METHOD_DEFLATE, METHOD_STORED};
use packfs_core::{
    filter_by_extension, normalize, DirectoryEntry, LogLevel, NormalizedPath, SequentialArchive,
    SequentialArchiveWriter, Vfs, VfsConfig, ZipArchive,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "packfs")]
#[command(about = "Archive tooling and virtual filesystem queries")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOptions {
    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// JSON file with VFS configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory relative real paths resolve against
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Mount a ZIP container: FILE or FILE=MOUNT_POINT
    #[arg(long = "zip", value_name = "FILE[=MOUNT]", global = true)]
    zips: Vec<String>,

    /// Overlay a real directory: REAL=MOUNT_POINT
    #[arg(long = "overlay", value_name = "REAL=MOUNT", global = true)]
    overlays: Vec<String>,

    /// Add a sequential archive to the search list
    #[arg(long = "archive", value_name = "FILE", global = true)]
    archives: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a sequential archive from real files
    Pack {
        /// Archive to create
        archive: PathBuf,

        /// Files to store
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Store names relative to this directory
        #[arg(long)]
        relative_to: Option<String>,
    },

    /// List the files of a sequential archive
    List {
        archive: PathBuf,

        /// Show sizes
        #[arg(short, long)]
        long: bool,
    },

    /// Extract entries of a sequential archive
    Extract {
        archive: PathBuf,

        /// Entries to extract (all when omitted)
        names: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Write entries of a sequential archive to stdout
    Dump {
        archive: PathBuf,

        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List the entries of a ZIP container
    ZipList {
        zip: PathBuf,

        /// Recompute each entry's CRC-32 and compare it with the stored one
        #[arg(long)]
        verify: bool,
    },

    /// Print a file resolved through the VFS
    Cat { path: String },

    /// List a directory resolved through the VFS
    Ls {
        #[arg(default_value = "")]
        path: String,

        /// Only show files with these extensions (comma separated)
        #[arg(long)]
        ext: Option<String>,
    },

    /// Show where and what a path is
    Stat { path: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;
    init_logging(cli.global.log_level, config.log_level);

    match cli.command {
        Commands::Pack {
            archive,
            files,
            relative_to,
        } => pack(&archive, &files, relative_to.as_deref()),
        Commands::List { archive, long } => list(&archive, long),
        Commands::Extract {
            archive,
            names,
            output,
        } => extract(&archive, &names, &output),
        Commands::Dump { archive, names } => dump(&archive, &names),
        Commands::ZipList { zip, verify } => zip_list(&zip, verify),
        Commands::Cat { path } => {
            let vfs = build_vfs(&cli.global, config)?;
            cat(&vfs, &path)
        }
        Commands::Ls { path, ext } => {
            let vfs = build_vfs(&cli.global, config)?;
            ls(&vfs, &path, ext.as_deref())
        }
        Commands::Stat { path } => {
            let vfs = build_vfs(&cli.global, config)?;
            stat(&vfs, &path)
        }
    }
}

fn init_logging(cli_level: Option<LogLevel>, config_level: LogLevel) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(format!("packfs={}", level)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("packfs={}", config_level))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_config(global: &GlobalOptions) -> Result<VfsConfig> {
    let mut config = match &global.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => VfsConfig::default(),
    };
    if let Some(dir) = &global.base_dir {
        config.base_dir = Some(dir.clone());
    }
    Ok(config)
}

fn build_vfs(global: &GlobalOptions, config: VfsConfig) -> Result<Vfs> {
    let mut vfs = Vfs::new(config).context("Invalid VFS configuration")?;

    for mapping in &global.overlays {
        let (real, mount_point) = mapping
            .split_once('=')
            .ok_or_else(|| anyhow!("Overlay '{}' must be REAL=MOUNT", mapping))?;
        vfs.mount_overlay(real, mount_point);
    }

    for zip in &global.zips {
        let (file, mount_point) = zip.split_once('=').unwrap_or((zip.as_str(), ""));
        if !vfs.mount_zip_file(file, mount_point) {
            bail!("Failed to mount zip {}", file);
        }
    }

    for archive in &global.archives {
        if !vfs.add_search_archive(archive) {
            bail!("Failed to open archive {}", archive.display());
        }
    }

    Ok(vfs)
}

fn pack(archive: &Path, files: &[PathBuf], relative_to: Option<&str>) -> Result<()> {
    let mut writer = SequentialArchiveWriter::create(archive)
        .with_context(|| format!("Failed to create {}", archive.display()))?;

    for file in files {
        if file.is_dir() {
            debug!("Skipping directory {}", file.display());
            continue;
        }
        let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let path = file.to_string_lossy();
        let name = match relative_to {
            Some(base) => packfs_core::make_relative_path(&path, base),
            None => normalize(&path),
        };
        writer
            .add_file(&name, &data)
            .with_context(|| format!("Failed to add {}", name))?;
        debug!("Packed {} ({} bytes)", name, data.len());
    }

    let records = writer.records();
    writer.finish().context("Failed to finish archive")?;
    info!("Wrote {} records to {}", records, archive.display());
    Ok(())
}

fn open_archive(archive: &Path) -> Result<SequentialArchive> {
    SequentialArchive::open_path(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))
}

fn list(archive: &Path, long: bool) -> Result<()> {
    let archive = open_archive(archive)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in archive.list_files() {
        if long {
            let size = archive.file_size(name).unwrap_or(0);
            writeln!(out, "{:>12} {}", size, name)?;
        } else {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(())
}

fn extract(archive_path: &Path, names: &[String], output: &Path) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let names: Vec<String> = if names.is_empty() {
        archive.list_files().map(str::to_string).collect()
    } else {
        names.iter().map(|n| normalize(n)).collect()
    };

    for name in &names {
        let entry = NormalizedPath::new(name);
        if entry.is_rooted() || entry.parent_levels() > 0 || entry.is_full() {
            bail!("Refusing to extract '{}' outside the output directory", name);
        }
        let data = archive
            .load_file(name)
            .ok_or_else(|| anyhow!("'{}' is not in {}", name, archive_path.display()))?;

        let target = entry.to_host_path(Some(output));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, &data)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        info!("Extracted {} ({} bytes)", name, data.len());
    }
    Ok(())
}

fn dump(archive_path: &Path, names: &[String]) -> Result<()> {
    let archive = open_archive(archive_path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in names {
        let data = archive
            .load_file(name)
            .ok_or_else(|| anyhow!("'{}' is not in {}", name, archive_path.display()))?;
        out.write_all(&data)?;
    }
    out.flush()?;
    Ok(())
}

fn method_name(method: u16) -> String {
    match method {
        METHOD_STORED => "stored".to_string(),
        METHOD_DEFLATE => "deflate".to_string(),
        other => format!("method {}", other),
    }
}

fn zip_list(zip: &Path, verify: bool) -> Result<()> {
    let archive = ZipArchive::open_path(zip)
        .with_context(|| format!("Failed to open zip {}", zip.display()))?;
    if !archive.is_complete() {
        info!("{} is damaged; listing the entries found before the damage", zip.display());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for dir in archive.list_directories() {
        writeln!(out, "{:>12} {:>8} {:>8} {}/", "-", "dir", "-", dir)?;
    }

    let mut mismatches = 0;
    for name in archive.list_files() {
        let Some(entry) = archive.entry(name) else {
            continue;
        };
        write!(
            out,
            "{:>12} {:>8} {:08x} {}",
            entry.uncompressed_len,
            method_name(entry.method),
            entry.crc32,
            name
        )?;
        if verify {
            match archive.checksum_entry(name) {
                Some(crc) if crc == entry.crc32 => write!(out, "  ok")?,
                Some(crc) => {
                    mismatches += 1;
                    write!(out, "  MISMATCH ({:08x})", crc)?;
                }
                None => write!(out, "  unreadable")?,
            }
        }
        writeln!(out)?;
    }

    if mismatches > 0 {
        bail!("{} entries failed CRC verification", mismatches);
    }
    Ok(())
}

fn cat(vfs: &Vfs, path: &str) -> Result<()> {
    let data = vfs
        .load_file(path)
        .ok_or_else(|| anyhow!("{} not found", path))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(&data)?;
    out.flush()?;
    debug!("{}", vfs.stats());
    Ok(())
}

fn ls(vfs: &Vfs, path: &str, extensions: Option<&str>) -> Result<()> {
    if !vfs.is_dir(path) {
        bail!("{} is not a directory", path);
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match extensions {
        Some(extensions) => {
            for name in filter_by_extension(extensions, &vfs.list_files(path)) {
                writeln!(out, "{}", name)?;
            }
        }
        None => {
            let mut entries = vfs.read_dir(path);
            DirectoryEntry::sort_by_type(&mut entries);
            for entry in entries {
                if entry.is_directory() {
                    writeln!(out, "{}/", entry.name)?;
                } else {
                    writeln!(out, "{}", entry.name)?;
                }
            }
        }
    }
    Ok(())
}

fn stat(vfs: &Vfs, path: &str) -> Result<()> {
    let info = vfs.stat(path).ok_or_else(|| anyhow!("{} not found", path))?;
    let flags = vfs.file_flags(path);

    println!("path:     {}", normalize(path));
    println!("kind:     {}", if info.is_dir() { "directory" } else { "file" });
    if info.is_file() {
        println!("size:     {}", info.size);
    }
    println!("source:   {}", info.source);
    println!("on disk:  {}", flags.on_disk);
    println!("archived: {}", flags.archived);
    if let Some(modified) = info.modified {
        if let Ok(age) = modified.elapsed() {
            println!("modified: {}s ago", age.as_secs());
        }
    }
    Ok(())
}
