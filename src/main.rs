//! Changelists - named groups of pending git changes
//!
//! Groups a working tree's uncommitted files, and individual hunks within
//! them, into changelists that survive edits, refreshes and restarts.

use anyhow::Result;
use changelists::changelist::ChangelistService;
use changelists::cli::{
    activate, clear, commit, config, create, delete, move_all, move_file, move_hunk,
    print_partition_json, print_partition_text, rename, revert, stash, status, summary_line,
    unversion, Cli, Commands, OutputFormat, Session,
};
use changelists::repo::RepoConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Get repository path
    let repo_path = Path::new(&cli.path);

    // Execute command
    match cli.command {
        Commands::Status(args) => {
            let session = Session::load(repo_path)?;
            match cli.format {
                OutputFormat::Json => print_partition_json(&session.manager.partition())?,
                OutputFormat::Text => status(&session, args.hunks),
            }
        }

        Commands::Create(args) => {
            let mut session = Session::load(repo_path)?;
            create(&mut session, &args.name, args.description, args.activate)?;
        }

        Commands::Delete(args) => {
            let mut session = Session::load(repo_path)?;
            delete(&mut session, &args.changelist)?;
        }

        Commands::Rename(args) => {
            let mut session = Session::load(repo_path)?;
            rename(&mut session, &args.changelist, &args.name)?;
        }

        Commands::Activate(args) => {
            let mut session = Session::load(repo_path)?;
            activate(&mut session, &args.changelist)?;
        }

        Commands::Move(args) => {
            let mut session = Session::load(repo_path)?;
            move_file(&mut session, &args.file, &args.changelist, args.from.as_deref())?;
        }

        Commands::MoveHunk(args) => {
            let mut session = Session::load(repo_path)?;
            move_hunk(&mut session, &args.hunk_id, &args.changelist)?;
        }

        Commands::Unversion(args) => {
            let mut session = Session::load(repo_path)?;
            unversion(&mut session, &args.file)?;
        }

        Commands::MoveAll(args) => {
            let mut session = Session::load(repo_path)?;
            move_all(&mut session, &args.from, &args.to)?;
        }

        Commands::Commit(args) => {
            let mut session = Session::load(repo_path)?;
            commit(&mut session, &args.changelist, &args.message, args.amend)?;
        }

        Commands::Revert(args) => {
            let mut session = Session::load(repo_path)?;
            revert(&mut session, &args.changelist)?;
        }

        Commands::Stash(args) => {
            let mut session = Session::load(repo_path)?;
            stash(&mut session, &args.changelist, &args.message)?;
        }

        Commands::Clear(args) => {
            let mut session = Session::load(repo_path)?;
            clear(&mut session, args.yes)?;
        }

        Commands::Config(args) => {
            config(
                repo_path,
                args.show,
                args.set.as_deref(),
                args.get.as_deref(),
                args.reset,
            )?;
        }

        Commands::Watch(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_watch(repo_path, args.debounce, cli.format))?;
        }
    }

    Ok(())
}

/// Run in watch mode
async fn run_watch(path: &Path, debounce_ms: Option<u64>, format: OutputFormat) -> Result<()> {
    use notify::{RecursiveMode, Watcher};
    use tokio::sync::broadcast::error::RecvError;

    let session = Session::open(path)?;
    let root = session.root.clone();
    let config = session.config.clone();
    let debounce = debounce_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.watch_debounce());

    let service = Arc::new(ChangelistService::new(session.manager));
    let mut updates = service.subscribe().await;

    // Print every published partition
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(partition) => match format {
                    OutputFormat::Json => {
                        if let Err(e) = print_partition_json(&partition) {
                            tracing::warn!("Failed to print partition: {}", e);
                        }
                    }
                    OutputFormat::Text => {
                        println!(
                            "\n[{}] {}",
                            chrono::Local::now().format("%H:%M:%S"),
                            summary_line(&partition)
                        );
                        print_partition_text(&partition, false);
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "watch output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let _ = tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    println!("Watching for changes in {:?}...", root);
    println!("Press Ctrl+C to stop.\n");

    service.request_refresh().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                println!("\nStopped watching.");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let relevant = match event {
                    Ok(event) => is_relevant(&event, &root, &config),
                    Err(e) => {
                        tracing::warn!("Watch error: {}", e);
                        false
                    }
                };
                if !relevant {
                    continue;
                }

                // Debounce: wait until events stop arriving
                while let Ok(Some(_)) = tokio::time::timeout(debounce, rx.recv()).await {}

                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service.request_refresh().await;
                });
            }
        }
    }

    Ok(())
}

/// Whether a watcher event touches a path that can change the partition
fn is_relevant(event: &notify::Event, root: &Path, config: &RepoConfig) -> bool {
    if matches!(event.kind, notify::EventKind::Access(_)) {
        return false;
    }

    event.paths.iter().any(|path| {
        let relative = path.strip_prefix(root).unwrap_or(path.as_path());
        let relative = relative.to_string_lossy().replace('\\', "/");
        !config.should_ignore(&relative)
    })
}
