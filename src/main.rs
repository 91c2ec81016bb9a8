//! PyDeck command-line front-end.
//!
//! Wires the library crates together: board discovery, raw-REPL execution,
//! filesystem operations and directory synchronisation.  All file-manager
//! output arrives as events on a channel and is rendered here.

use clap::{Parser, Subcommand};
use pydeck_core::config::PydeckConfig;
use pydeck_files::files::manager::FileManager;
use pydeck_files::files::remote::ReplFileSystem;
use pydeck_files::files::sync::SyncOptions;
use pydeck_files::files::types::{ClockValues, FileManagerEvent};
use pydeck_repl::repl::diagnostics::probe_port;
use pydeck_repl::repl::executor::ReplExecutor;
use pydeck_serial::serial::scanner::{detect_boards, ScanOptions};
use pydeck_serial::serial::system::SystemTransport;
use pydeck_serial::serial::types::{BoardFamily, LinkConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pydeck", about = "Manage MicroPython / CircuitPython boards over the serial raw REPL", version)]
struct Cli {
    /// Serial port (defaults to the first detected board).
    #[arg(long, global = true)]
    port: Option<String>,

    /// Read timeout in milliseconds for board exchanges.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Configuration file (TOML).
    #[arg(long, global = true, default_value = "pydeck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports and detected boards.
    Ports {
        /// Only show recognised boards.
        #[arg(long)]
        known_only: bool,
        /// Emit the port list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Probe the connection step by step.
    Doctor,
    /// Execute Python source on the board and print its output.
    Exec { code: String },
    /// List a board directory.
    Ls {
        #[arg(default_value = "/")]
        dir: String,
        /// Include hidden entries.
        #[arg(short = 'a', long)]
        all: bool,
    },
    /// Print a board file.
    Cat { device_file: String },
    /// Copy a board file to the host.
    Get {
        device_file: String,
        local_file: PathBuf,
    },
    /// Copy a host file to the board.
    Put {
        local_file: PathBuf,
        device_file: String,
    },
    /// Remove a board file (or a tree with --recursive).
    Rm {
        name: String,
        #[arg(short, long)]
        recursive: bool,
        /// Ignore board-side errors and keep deleting.
        #[arg(short, long)]
        force: bool,
    },
    /// Create a board directory.
    Mkdir { dir: String },
    /// Remove an empty board directory.
    Rmdir { dir: String },
    /// Synchronise a local directory onto the board.
    Sync {
        local_dir: PathBuf,
        device_dir: String,
        /// Delete board entries absent locally.
        #[arg(long)]
        mirror: bool,
        /// Include hidden entries.
        #[arg(short = 'a', long)]
        all: bool,
        /// The board is mounted as a volume at DEVICE_DIR; copy locally
        /// instead of using the serial protocol.
        #[arg(long)]
        mounted: bool,
    },
    /// Show board filesystem capacity.
    Df,
    /// Show board firmware and implementation details.
    Version,
    /// Show the board clock, or set it from the host clock.
    Clock {
        #[arg(long)]
        set: bool,
    },
}

fn resolve_port(cli_port: &Option<String>, config: &PydeckConfig) -> Result<String, String> {
    if let Some(port) = cli_port.clone().or_else(|| config.serial.port.clone()) {
        return Ok(port);
    }
    let boards = detect_boards(&ScanOptions {
        known_only: true,
        name_filter: None,
    })?;
    boards
        .first()
        .map(|b| b.port.port_name.clone())
        .ok_or_else(|| "no board detected; pass --port".to_string())
}

fn resolve_family(port_name: &str) -> BoardFamily {
    detect_boards(&ScanOptions::default())
        .ok()
        .and_then(|boards| {
            boards
                .into_iter()
                .find(|b| b.port.port_name == port_name)
                .and_then(|b| b.port.family)
        })
        .unwrap_or(BoardFamily::Generic)
}

async fn open_filesystem(
    cli: &Cli,
    config: &PydeckConfig,
) -> Result<ReplFileSystem<ReplExecutor>, String> {
    let port = resolve_port(&cli.port, config)?;
    let mut link = LinkConfig::from_settings(port.as_str(), &config.serial);
    if let Some(timeout_ms) = cli.timeout_ms {
        link.read_timeout_ms = timeout_ms;
    }

    log::debug!("using {} with a {} ms timeout", link.port_name, link.read_timeout_ms);
    let transport = SystemTransport::new(port);
    let mut executor = ReplExecutor::new(transport, link);
    executor.connect().await?;
    Ok(ReplFileSystem::new(executor))
}

fn render_event(event: &FileManagerEvent) {
    match event {
        FileManagerEvent::Listing { directory, entries } => {
            println!("{}:", directory);
            for entry in entries {
                let marker = if entry.is_dir() { "d" } else { "-" };
                println!("{} {:>9}  {:>12}  {}", marker, entry.size, entry.mtime, entry.name);
            }
        }
        FileManagerEvent::CurrentDirectory { directory } => println!("{}", directory),
        FileManagerEvent::GetDone {
            device_file,
            local_file,
        } => println!("{} -> {}", device_file, local_file),
        FileManagerEvent::PutDone {
            local_file,
            device_file,
        } => println!("{} -> {}", local_file, device_file),
        FileManagerEvent::Removed { name } => println!("removed {}", name),
        FileManagerEvent::DirCreated { name } => println!("created {}", name),
        FileManagerEvent::DirRemoved { name } => println!("removed {}", name),
        FileManagerEvent::FsInfoResult { mounts } => {
            println!("{:<12} {:>12} {:>12} {:>12}", "mount", "total", "used", "free");
            for mount in mounts {
                println!(
                    "{:<12} {:>12} {:>12} {:>12}",
                    mount.name, mount.total_bytes, mount.used_bytes, mount.free_bytes
                );
            }
        }
        FileManagerEvent::SyncProgress { depth, message } => {
            println!("{}{}", "  ".repeat(*depth), message);
        }
        FileManagerEvent::SyncErrors { messages } => {
            for message in messages {
                eprintln!("warning: {}", message);
            }
        }
        FileManagerEvent::SyncDone {
            local_dir,
            device_dir,
        } => println!("sync done: {} -> {}", local_dir, device_dir),
        FileManagerEvent::OperationFailed { operation, message } => {
            eprintln!("{} failed: {}", operation, message);
        }
    }
}

/// Run one manager operation and render everything it emits.
async fn with_manager<F, Fut>(fs: ReplFileSystem<ReplExecutor>, op: F) -> Result<(), String>
where
    F: FnOnce(FileManager<ReplFileSystem<ReplExecutor>>) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let (manager, mut rx) = FileManager::new(fs);
    let printer = tokio::spawn(async move {
        let mut failed = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, FileManagerEvent::OperationFailed { .. }) {
                failed = true;
            }
            render_event(&event);
        }
        failed
    });

    let ok = op(manager).await;
    let failed = printer.await.map_err(|e| e.to_string())?;
    if ok && !failed {
        Ok(())
    } else {
        Err("operation failed".to_string())
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = PydeckConfig::load_or_default(&cli.config);

    match &cli.command {
        Command::Ports { known_only, json } => {
            let boards = detect_boards(&ScanOptions {
                known_only: *known_only,
                name_filter: None,
            })?;
            if *json {
                let ports: Vec<_> = boards.iter().map(|b| &b.port).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ports).map_err(|e| e.to_string())?
                );
                return Ok(());
            }
            if boards.is_empty() {
                println!("no ports found");
            }
            for board in boards {
                match board.description {
                    Some(description) => {
                        println!("{}  [{}]", board.port.display_name, description)
                    }
                    None => println!("{}", board.port.display_name),
                }
            }
            Ok(())
        }

        Command::Doctor => {
            let port = resolve_port(&cli.port, &config)?;
            let mut link = LinkConfig::from_settings(port, &config.serial);
            if let Some(timeout_ms) = cli.timeout_ms {
                link.read_timeout_ms = timeout_ms;
            }
            let report = probe_port(&link).await;
            for step in &report.steps {
                println!("[{:>4}] {}: {}", step.status, step.name, step.message);
            }
            println!("{}", report.summary);
            if let Some(hint) = &report.root_cause_hint {
                println!("hint: {}", hint);
            }
            if report.passed() {
                Ok(())
            } else {
                Err("diagnostics failed".to_string())
            }
        }

        Command::Exec { code } => {
            let mut fs = open_filesystem(&cli, &config).await?;
            let (stdout, stderr) = fs.executor_mut().execute_one(code).await;
            print!("{}", String::from_utf8_lossy(&stdout));
            if stderr.is_empty() {
                Ok(())
            } else {
                Err(String::from_utf8_lossy(&stderr).to_string())
            }
        }

        Command::Ls { dir, all } => {
            let fs = open_filesystem(&cli, &config).await?;
            let dir = dir.clone();
            let all = *all;
            with_manager(fs, |mut manager| async move {
                manager.lls(&dir, all).await;
                true
            })
            .await
        }

        Command::Cat { device_file } => {
            let mut fs = open_filesystem(&cli, &config).await?;
            let data = pydeck_files::files::remote::RemoteFileSystem::get_bytes(
                &mut fs,
                device_file,
            )
            .await?;
            print!("{}", String::from_utf8_lossy(&data));
            Ok(())
        }

        Command::Get {
            device_file,
            local_file,
        } => {
            let fs = open_filesystem(&cli, &config).await?;
            let device_file = device_file.clone();
            let local_file = local_file.clone();
            with_manager(fs, |mut manager| async move {
                manager.get(&device_file, &local_file).await;
                true
            })
            .await
        }

        Command::Put {
            local_file,
            device_file,
        } => {
            let fs = open_filesystem(&cli, &config).await?;
            let device_file = device_file.clone();
            let local_file = local_file.clone();
            with_manager(fs, |mut manager| async move {
                manager.put(&local_file, &device_file).await;
                true
            })
            .await
        }

        Command::Rm {
            name,
            recursive,
            force,
        } => {
            let mut fs = open_filesystem(&cli, &config).await?;
            if *recursive || *force {
                let removed = pydeck_files::files::remote::RemoteFileSystem::rmrf(
                    &mut fs, name, *recursive, *force,
                )
                .await?;
                if removed {
                    println!("removed {}", name);
                    Ok(())
                } else {
                    Err(format!("cannot remove '{}'", name))
                }
            } else {
                let name = name.clone();
                with_manager(fs, |mut manager| async move {
                    manager.delete(&name).await;
                    true
                })
                .await
            }
        }

        Command::Mkdir { dir } => {
            let fs = open_filesystem(&cli, &config).await?;
            let dir = dir.clone();
            with_manager(fs, |mut manager| async move {
                manager.mkdir(&dir).await;
                true
            })
            .await
        }

        Command::Rmdir { dir } => {
            let fs = open_filesystem(&cli, &config).await?;
            let dir = dir.clone();
            with_manager(fs, |mut manager| async move {
                manager.rmdir(&dir).await;
                true
            })
            .await
        }

        Command::Sync {
            local_dir,
            device_dir,
            mirror,
            all,
            mounted,
        } => {
            let mut options = SyncOptions::from_config(&config);
            if *mirror {
                options.mirror = true;
            }
            if *all {
                options.show_hidden = true;
            }
            if *mounted {
                let (tx, mut rx) = tokio::sync::mpsc::channel(256);
                let printer = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        render_event(&event);
                    }
                });
                let report = pydeck_files::files::sync::sync_mounted(
                    local_dir,
                    &PathBuf::from(device_dir),
                    &options,
                    &tx,
                )
                .await;
                drop(tx);
                let _ = printer.await;
                return if report.errors.is_empty() {
                    Ok(())
                } else {
                    Err(format!("{} error(s) during sync", report.errors.len()))
                };
            }

            let fs = open_filesystem(&cli, &config).await?;
            let local_dir = local_dir.clone();
            let device_dir = device_dir.clone();
            with_manager(fs, |mut manager| async move {
                let report = manager.rsync(&local_dir, &device_dir, &options).await;
                report.errors.is_empty()
            })
            .await
        }

        Command::Df => {
            let fs = open_filesystem(&cli, &config).await?;
            with_manager(fs, |mut manager| async move {
                manager.fs_info().await;
                true
            })
            .await
        }

        Command::Version => {
            let mut fs = open_filesystem(&cli, &config).await?;
            let version = fs.version().await?;
            let implementation = fs.implementation().await?;
            println!("{} {} ({})", implementation.name, implementation.version, version.release);
            println!("machine: {}", version.machine);
            println!("build:   {}", version.version);
            Ok(())
        }

        Command::Clock { set } => {
            let port = resolve_port(&cli.port, &config)?;
            let family = resolve_family(&port);
            let mut fs = open_filesystem(&cli, &config).await?;
            if *set {
                let clock = ClockValues::from_local_now();
                if fs.set_clock(family, &clock).await? {
                    println!("board clock set from host clock");
                } else {
                    println!("{} has no settable clock", family.label());
                }
            }
            println!("{}", fs.get_clock().await?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("pydeck: {}", e);
        std::process::exit(1);
    }
}
