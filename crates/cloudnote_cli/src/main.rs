//! Command-line front end for the cloudnote core.
//!
//! # Responsibility
//! - Open the SQLite gateway, load the store and print derived views.
//! - Run single mutations through the coordinator and wait for them to land.
//!
//! Output is line-oriented and deterministic for quick local checks.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cloudnote_core::{
    export_note, init_logging, ClientConfig, ExportFormat, FolderId, MutationCoordinator, Note,
    NoteId, SortOption, SqliteGateway, StateStore, SyncEvent,
};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cloudnote")]
#[command(about = "Inspect and edit a local cloudnote database")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "cloudnote.json")]
    config: PathBuf,

    /// Database file; overrides `database_path` from the config
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print core linkage and version
    Ping,
    /// List notes the way the note list shows them
    #[command(alias = "ls")]
    List(ListArgs),
    /// List every tag in use
    Tags,
    /// List folders with note counts
    Folders,
    /// Create a note
    New(NewArgs),
    /// Replace a note's title and/or content
    Edit(EditArgs),
    /// Toggle the favorite flag
    Favorite { id: String },
    /// Toggle the pinned flag
    Pin { id: String },
    /// Replace a note's tags
    Tag {
        id: String,
        /// New tag list; empty clears every tag
        tags: Vec<String>,
    },
    /// File a note into a folder, or unfile it without `--folder`
    Move {
        id: String,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Copy a note
    Duplicate { id: String },
    /// Delete a note
    Delete { id: String },
    /// Folder management
    Folder {
        #[command(subcommand)]
        action: FolderCommand,
    },
    /// Export one note to a file
    Export(ExportArgs),
}

#[derive(Subcommand, Debug)]
enum FolderCommand {
    /// Create a folder
    New { name: String },
    /// Rename a folder
    Rename { id: String, name: String },
    /// Delete a folder and unfile its notes
    Delete { id: String },
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Case-insensitive text filter over title and content
    #[arg(short, long, default_value = "")]
    search: String,
    #[arg(short, long)]
    tag: Option<String>,
    /// Folder id; without it only unfiled notes are listed unless filtering
    #[arg(short, long)]
    folder: Option<String>,
    /// lastEditTime | title | createdTime
    #[arg(long, default_value = "lastEditTime")]
    sort: SortOption,
}

#[derive(Args, Debug)]
struct NewArgs {
    #[arg(short, long)]
    title: Option<String>,
    #[arg(short, long)]
    content: Option<String>,
}

#[derive(Args, Debug)]
struct EditArgs {
    id: String,
    #[arg(short, long)]
    title: Option<String>,
    #[arg(short, long)]
    content: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    id: String,
    /// md | txt | html
    #[arg(short, long, default_value = "md")]
    format: ExportFormat,
    /// Target directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
}

type Coordinator = MutationCoordinator<SqliteGateway>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if matches!(cli.command, Commands::Ping) {
        println!("cloudnote_core ping={}", cloudnote_core::ping());
        println!("cloudnote_core version={}", cloudnote_core::core_version());
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config)
        .with_context(|| format!("loading config `{}`", cli.config.display()))?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir)?;
    }

    let gateway = SqliteGateway::open(&config.database_path)
        .with_context(|| format!("opening `{}`", config.database_path.display()))?;
    let coordinator =
        MutationCoordinator::new(Arc::new(StateStore::new()), Arc::new(gateway), config.sync)?;
    coordinator.load().await?;
    let mut events = coordinator.subscribe_events();

    info!("event=cli_command module=cli status=start");
    run(&coordinator, cli.command).await?;
    coordinator.flush().await;

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::WriteFailed {
            operation,
            target,
            message,
            ..
        } = event
        {
            eprintln!("write failed: {operation} {target}: {message}");
            failures += 1;
        }
    }
    if failures > 0 {
        bail!("{failures} write(s) did not reach the database");
    }
    Ok(())
}

async fn run(coordinator: &Coordinator, command: Commands) -> Result<()> {
    let store = coordinator.store();
    match command {
        Commands::Ping => {}
        Commands::List(args) => {
            store.set_search_query(args.search);
            store.set_selected_tag(args.tag);
            store.select_folder(args.folder.map(FolderId::new));
            store.set_sort_option(args.sort);
            for note in store.filtered_notes() {
                print_note_line(&note);
            }
        }
        Commands::Tags => {
            for tag in store.all_tags() {
                println!("{tag}");
            }
        }
        Commands::Folders => {
            let counts = store.folder_note_counts();
            println!("-\tunfiled\t{}", counts.unfiled);
            for folder in store.folders() {
                let count = counts.by_folder.get(&folder.id).copied().unwrap_or(0);
                println!("{}\t{}\t{count}", folder.id, folder.name);
            }
        }
        Commands::New(args) => {
            let local_id = coordinator.create_note();
            if args.title.is_some() || args.content.is_some() {
                coordinator.update_note(&local_id, args.title.as_deref(), args.content.as_deref())?;
            }
            coordinator.flush().await;
            println!("{}", coordinator.resolve_note_id(&local_id));
        }
        Commands::Edit(args) => {
            let note = coordinator.update_note(
                &NoteId::new(args.id),
                args.title.as_deref(),
                args.content.as_deref(),
            )?;
            print_note_line(&note);
        }
        Commands::Favorite { id } => {
            let value = coordinator.toggle_favorite(&NoteId::new(id))?;
            println!("favorite={value}");
        }
        Commands::Pin { id } => {
            let value = coordinator.toggle_pinned(&NoteId::new(id))?;
            println!("pinned={value}");
        }
        Commands::Tag { id, tags } => {
            let tags = coordinator.update_tags(&NoteId::new(id), &tags)?;
            println!("{}", tags.join(","));
        }
        Commands::Move { id, folder } => {
            let folder = folder.map(FolderId::new);
            coordinator.move_note_to_folder(&NoteId::new(id), folder.as_ref())?;
        }
        Commands::Duplicate { id } => {
            let copy_id = coordinator.duplicate_note(&NoteId::new(id)).await?;
            println!("{copy_id}");
        }
        Commands::Delete { id } => coordinator.delete_note(&NoteId::new(id))?,
        Commands::Folder { action } => run_folder(coordinator, action).await?,
        Commands::Export(args) => {
            let Some(note) = store.note(&NoteId::new(args.id.as_str())) else {
                bail!("note `{}` not found", args.id);
            };
            let artifact = export_note(&note.title, &note.content, args.format);
            let path = artifact.write_into(&args.out)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn run_folder(coordinator: &Coordinator, action: FolderCommand) -> Result<()> {
    match action {
        FolderCommand::New { name } => {
            let local_id = coordinator.create_folder(&name)?;
            coordinator.flush().await;
            println!("{}", coordinator.resolve_folder_id(&local_id));
        }
        FolderCommand::Rename { id, name } => {
            coordinator.rename_folder(&FolderId::new(id), &name)?;
        }
        FolderCommand::Delete { id } => {
            let unfiled = coordinator.delete_folder(&FolderId::new(id))?;
            println!("unfiled={unfiled}");
        }
    }
    Ok(())
}

fn print_note_line(note: &Note) {
    let mut flags = String::new();
    if note.is_pinned {
        flags.push('P');
    }
    if note.is_favorite {
        flags.push('*');
    }
    println!(
        "{}\t{}\t{}\t{}\t[{}]",
        note.id,
        if flags.is_empty() { "-" } else { flags.as_str() },
        note.last_edit_time,
        note.title,
        note.tags.join(",")
    );
}
