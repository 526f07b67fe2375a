use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use unifs_vfs::{
    local, FileAdapter, FileAddress, FileAttributes, FileFactory, FileMonitor, FileResolver,
    MonitorConfig, VfsConfig,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("unifs - one file contract over many storage backends");
    println!();
    println!("USAGE:");
    println!("    unifs <COMMAND> <ADDRESS> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    ls <ADDRESS>       List a directory");
    println!("    stat <ADDRESS>     Show the attributes of a file");
    println!("    watch <ADDRESS>    Print attribute changes until Ctrl+C");
    println!();
    println!("WATCH OPTIONS:");
    println!("    --interval <MS>    Poll period in milliseconds");
    println!("    --attrs <LIST>     Comma separated: modified,size,permissions,directory,exists");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version");
    println!();
    println!("ADDRESS:");
    println!("    file:///tmp/notes.txt, or a plain path on this machine");
    println!();
    println!("CONFIG:");
    println!("    {}", VfsConfig::default_config_path().display());
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG           Log filter (default: info)");
}

/// Parse `--interval` / `--attrs`, starting from the configured defaults
fn parse_watch_options(
    args: &[String],
    defaults: &MonitorConfig,
) -> Result<(Duration, FileAttributes)> {
    let mut interval = defaults.poll_interval();
    let mut attributes = defaults.attribute_mask();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--interval" | "-i" if i + 1 < args.len() => {
                let millis: u64 = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid interval: {}", args[i + 1]))?;
                interval = Duration::from_millis(millis);
                i += 2;
            }
            "--attrs" | "-a" if i + 1 < args.len() => {
                attributes = FileAttributes::empty();
                for name in args[i + 1].split(',').filter(|s| !s.trim().is_empty()) {
                    match FileAttributes::from_config_name(name) {
                        Some(attr) => attributes |= attr,
                        None => bail!("unknown attribute: {name}"),
                    }
                }
                i += 2;
            }
            other => bail!("unexpected argument: {other}"),
        }
    }

    if attributes.is_empty() {
        bail!("no attribute to watch");
    }
    Ok((interval, attributes))
}

/// Resolve a full address, or a plain path as a local file
fn resolve(factory: &FileFactory, target: &str) -> Result<Arc<dyn FileAdapter>> {
    let address = if target.contains("://") {
        FileAddress::parse(target)?
    } else {
        local::address_of(Path::new(target))?
    };
    Ok(factory.resolve(&address)?)
}

fn format_time(time: Option<SystemTime>) -> String {
    time.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or_else(|| "-".to_string(), |d| format!("{}s since epoch", d.as_secs()))
}

async fn cmd_ls(file: Arc<dyn FileAdapter>) -> Result<()> {
    let children = file
        .list(None)
        .await
        .with_context(|| format!("cannot list {}", file.absolute_path()))?;

    for child in children {
        let kind = if child.is_directory().await? { 'd' } else { '-' };
        println!(
            "{kind} {:03o} {:>12} {}",
            child.permissions().await?.bits(),
            child.size().await?,
            child.name()
        );
    }
    Ok(())
}

async fn cmd_stat(file: Arc<dyn FileAdapter>) -> Result<()> {
    println!("address:      {}", file.absolute_path());
    println!("exists:       {}", file.exists().await?);
    println!("directory:    {}", file.is_directory().await?);
    println!("symlink:      {}", file.is_symlink().await?);
    println!("size:         {}", file.size().await?);
    println!("modified:     {}", format_time(file.modified_time().await?));
    println!("permissions:  {:03o}", file.permissions().await?.bits());
    println!("capabilities: {:?}", file.capabilities());
    Ok(())
}

async fn cmd_watch(
    file: Arc<dyn FileAdapter>,
    interval: Duration,
    attributes: FileAttributes,
) -> Result<()> {
    let monitor = FileMonitor::with_options(file, attributes, interval);
    let printer = Arc::new(|file: &Arc<dyn FileAdapter>, changed: FileAttributes| {
        println!("{} changed: {changed:?}", file.absolute_path());
    });
    monitor.add_listener(&printer);
    monitor.start_monitoring()?;

    tokio::signal::ctrl_c().await?;
    info!("interrupted");
    monitor.stop_monitoring();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--version" | "-v" => {
            println!("unifs {VERSION}");
            return Ok(());
        }
        "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    let Some(target) = args.get(2) else {
        bail!("{command}: missing ADDRESS (see --help)");
    };

    let config = VfsConfig::load();
    let factory = FileFactory::new();
    local::register(&factory);
    let file = resolve(&factory, target)?;

    match command.as_str() {
        "ls" => cmd_ls(file).await,
        "stat" => cmd_stat(file).await,
        "watch" => {
            let (interval, attributes) = parse_watch_options(&args[3..], &config.monitor)?;
            cmd_watch(file, interval, attributes).await
        }
        other => bail!("unknown command: {other} (see --help)"),
    }
}
