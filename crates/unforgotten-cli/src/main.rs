//! Unforgotten CLI - family notes from the terminal
//!
//! Local-first: every command works offline; pushes and pulls happen when
//! the backend is configured.

use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use unforgotten_core::sync::{HttpNoteTransport, StaticSession, SyncService};
use unforgotten_core::{Note, NoteId, NoteStoreService, NoteTheme, RichText};

#[derive(Parser)]
#[command(name = "unforgotten")]
#[command(about = "Shared family notes from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Quick capture: unforgotten "pick up milk"
    #[arg(trailing_var_arg = true)]
    note: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long)]
        title: Option<String>,
        /// Theme name (plain, sunrise, meadow, ocean, lavender)
        #[arg(long)]
        theme: Option<String>,
        /// Pin the note to the top of the list
        #[arg(long)]
        pin: bool,
        /// Note body
        content: Vec<String>,
    },
    /// List notes, pinned first, then most recently edited
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a note's body in $EDITOR
    Edit {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Delete a note locally and on the backend
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Pin or unpin a note
    Pin {
        /// Note ID or unique ID prefix
        id: String,
        /// Remove the pin instead
        #[arg(long)]
        remove: bool,
    },
    /// Change a note's theme
    Theme {
        /// Note ID or unique ID prefix
        id: String,
        /// Theme name (plain, sunrise, meadow, ocean, lavender)
        theme: String,
    },
    /// Push pending local edits and pull remote changes
    Sync,
    /// Show sync state: watermark, pending edits, recent conflicts
    Status,
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] unforgotten_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error(
        "Sync is not configured. Set UNFORGOTTEN_API_URL and UNFORGOTTEN_ACCESS_TOKEN to enable `unforgotten sync`."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("unforgotten=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let ctx = Context::resolve(cli.db_path)?;

    match cli.command {
        Some(Commands::Add {
            title,
            theme,
            pin,
            content,
        }) => run_add(&ctx, title.as_deref(), theme.as_deref(), pin, &content).await?,
        Some(Commands::List { limit, json }) => run_list(&ctx, limit, json).await?,
        Some(Commands::Edit { id }) => run_edit(&ctx, &id).await?,
        Some(Commands::Delete { id }) => run_delete(&ctx, &id).await?,
        Some(Commands::Pin { id, remove }) => run_pin(&ctx, &id, !remove).await?,
        Some(Commands::Theme { id, theme }) => run_theme(&ctx, &id, &theme).await?,
        Some(Commands::Sync) => run_sync(&ctx).await?,
        Some(Commands::Status) => run_status(&ctx).await?,
        Some(Commands::Conflicts { limit }) => run_conflicts(&ctx, limit).await?,
        None => {
            // Quick capture mode: unforgotten "pick up milk"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&ctx, None, None, false, &cli.note).await?;
            }
        }
    }

    Ok(())
}

/// Resolved runtime context: store, account, and optional backend.
struct Context {
    store: NoteStoreService,
    account_id: String,
    sync: Option<SyncService>,
}

impl Context {
    fn resolve(cli_db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let db_path = resolve_db_path(cli_db_path);
        let store = NoteStoreService::open_path(&db_path)?;
        let account_id =
            env::var("UNFORGOTTEN_ACCOUNT_ID").unwrap_or_else(|_| "default".to_string());

        let sync = match transport_from_env()? {
            Some(transport) => Some(SyncService::new(store.clone(), transport)),
            None => None,
        };

        Ok(Self {
            store,
            account_id,
            sync,
        })
    }

    fn require_sync(&self) -> Result<&SyncService, CliError> {
        self.sync.as_ref().ok_or(CliError::SyncNotConfigured)
    }

    /// Push one note, tolerating failures: a dirty note is picked up by the
    /// next `sync` run.
    async fn try_push(&self, note: &Note) {
        if let Some(sync) = &self.sync {
            if let Err(error) = sync.sync_immediately(note).await {
                tracing::warn!(note_id = %note.id, %error, "Push failed; note stays pending");
            }
        }
    }
}

async fn run_add(
    ctx: &Context,
    title: Option<&str>,
    theme: Option<&str>,
    pin: bool,
    content_parts: &[String],
) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let mut note = Note::new(
        title.unwrap_or("").trim(),
        RichText::plain(content),
        &ctx.account_id,
    );
    if let Some(theme) = theme {
        note.theme = theme.trim().parse()?;
    }
    note.is_pinned = pin;

    ctx.store.insert_note(&note).await?;
    ctx.try_push(&note).await;

    println!("{}", note.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct NoteListItem {
    id: String,
    title: String,
    preview: String,
    theme: String,
    pinned: bool,
    synced: bool,
    updated_at: i64,
    relative_time: String,
}

async fn run_list(ctx: &Context, limit: usize, as_json: bool) -> Result<(), CliError> {
    let notes = ctx.store.list_notes(&ctx.account_id, limit, 0).await?;

    if as_json {
        let items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_edit(ctx: &Context, id: &str) -> Result<(), CliError> {
    let mut note = resolve_note(ctx, id).await?;

    let Some(edited) = capture_editor_input_with_initial(note.plain_text())? else {
        return Err(CliError::EmptyEditedContent);
    };

    if edited == note.plain_text() {
        println!("{}", note.id);
        return Ok(());
    }

    note.set_content(RichText::plain(edited));
    note.mark_as_modified();
    ctx.store.update_note(&note).await?;
    ctx.try_push(&note).await;

    println!("{}", note.id);
    Ok(())
}

async fn run_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let note = resolve_note(ctx, id).await?;

    if let Some(sync) = &ctx.sync {
        sync.delete(&note).await?;
    } else {
        ctx.store.delete_note(&note.id).await?;
    }

    println!("{}", note.id);
    Ok(())
}

async fn run_pin(ctx: &Context, id: &str, pinned: bool) -> Result<(), CliError> {
    let mut note = resolve_note(ctx, id).await?;

    if note.is_pinned != pinned {
        note.is_pinned = pinned;
        note.mark_as_modified();
        ctx.store.update_note(&note).await?;
        ctx.try_push(&note).await;
    }

    println!("{}", note.id);
    Ok(())
}

async fn run_theme(ctx: &Context, id: &str, theme: &str) -> Result<(), CliError> {
    let theme: NoteTheme = theme.trim().parse()?;
    let mut note = resolve_note(ctx, id).await?;

    if note.theme != theme {
        note.theme = theme;
        note.mark_as_modified();
        ctx.store.update_note(&note).await?;
        ctx.try_push(&note).await;
    }

    println!("{}", note.id);
    Ok(())
}

async fn run_sync(ctx: &Context) -> Result<(), CliError> {
    let sync = ctx.require_sync()?;

    let pushed = sync.sync_pending_notes(&ctx.account_id).await?;
    let stats = sync.refresh(&ctx.account_id).await?;

    println!(
        "Pushed {pushed}, pulled {} new, {} updated, {} deleted",
        stats.inserted, stats.updated, stats.deleted
    );
    if stats.kept_local > 0 {
        println!(
            "Kept {} local edit(s) over remote versions; see `unforgotten conflicts`",
            stats.kept_local
        );
    }
    Ok(())
}

async fn run_status(ctx: &Context) -> Result<(), CliError> {
    let watermark = ctx.store.load_watermark(&ctx.account_id).await?;
    let pending = ctx.store.unsynced_notes(&ctx.account_id).await?;
    let now_ms = Utc::now().timestamp_millis();

    match watermark {
        Some(ts) => println!("Last sync: {}", format_relative_time(ts, now_ms)),
        None => println!("Last sync: never"),
    }
    println!("Pending edits: {}", pending.len());
    for note in &pending {
        println!("  {}  {}", short_id(&note.id), note.preview(40));
    }
    if ctx.sync.is_none() {
        println!("Backend: not configured");
    }
    Ok(())
}

async fn run_conflicts(ctx: &Context, limit: usize) -> Result<(), CliError> {
    let conflicts = ctx.store.list_conflicts(limit).await?;
    if conflicts.is_empty() {
        println!("No recorded conflicts");
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for conflict in &conflicts {
        println!(
            "{}  {}  local kept over remote ({})",
            conflict.note_id.chars().take(13).collect::<String>(),
            format_relative_time(conflict.resolved_at, now_ms),
            conflict.strategy,
        );
    }
    Ok(())
}

/// Resolve a note by exact ID or unique ID prefix.
async fn resolve_note(ctx: &Context, note_query: &str) -> Result<Note, CliError> {
    const SCAN_LIMIT: usize = 500;

    let query = normalize_note_identifier(note_query)?;

    if let Ok(note_id) = query.parse::<NoteId>() {
        if let Some(note) = ctx.store.get_note(&note_id).await? {
            return Ok(note);
        }
    }

    let notes = ctx.store.list_notes(&ctx.account_id, SCAN_LIMIT, 0).await?;
    let mut matches = notes
        .into_iter()
        .filter(|note| note.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NoteNotFound(query)),
        1 => Ok(matches.swap_remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|note| short_id(&note.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn short_id(id: &NoteId) -> String {
    id.as_str().chars().take(13).collect()
}

fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let marker = if note.is_pinned { "*" } else { " " };
            let state = if note.is_synced { " " } else { "~" };
            let label = note_label(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            format!(
                "{}{}{}  {label:<40}  {relative_time}",
                short_id(&note.id),
                marker,
                state
            )
        })
        .collect()
}

fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.as_str(),
        title: note.title.clone(),
        preview: note.preview(80),
        theme: note.theme.to_string(),
        pinned: note.is_pinned,
        synced: note.is_synced,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
    }
}

/// Title when present, otherwise a body preview, truncated to `max_chars`.
fn note_label(note: &Note, max_chars: usize) -> String {
    let source = if note.title.trim().is_empty() {
        note.preview(max_chars + 3)
    } else {
        note.title.trim().to_string()
    };
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

fn capture_editor_input_with_initial(initial_content: &str) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // Fallback for editor commands with args, e.g. "code --wait"
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!(
        "unforgotten-note-{}-{now}.md",
        std::process::id()
    ))
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("UNFORGOTTEN_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("unforgotten")
        .join("unforgotten.db")
}

fn transport_from_env() -> Result<Option<Arc<HttpNoteTransport>>, CliError> {
    let Ok(url) = env::var("UNFORGOTTEN_API_URL") else {
        return Ok(None);
    };
    if url.trim().is_empty() {
        return Ok(None);
    }

    let token = env::var("UNFORGOTTEN_ACCESS_TOKEN").ok();
    let session = Arc::new(StaticSession::new(token));
    let transport = HttpNoteTransport::new(url, session)?;
    Ok(Some(Arc::new(transport)))
}

#[cfg(test)]
mod tests {
    use unforgotten_core::{Note, NoteStoreService, RichText};

    use super::{
        default_editor, format_note_lines, format_relative_time, normalize_content,
        normalize_note_identifier, note_label, resolve_note, short_id, CliError, Context,
    };

    #[test]
    fn normalize_content_trims_and_rejects_empty() {
        assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
        assert_eq!(normalize_content(" \n\t "), None);
    }

    #[test]
    fn normalize_content_keeps_multiline_text() {
        assert_eq!(
            normalize_content("line 1\nline 2\n"),
            Some("line 1\nline 2".to_string())
        );
    }

    #[test]
    fn default_editor_is_defined() {
        assert!(!default_editor().is_empty());
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    }

    #[test]
    fn normalize_note_identifier_rejects_empty() {
        assert!(matches!(
            normalize_note_identifier(" \n "),
            Err(CliError::EmptyNoteId)
        ));
        assert_eq!(
            normalize_note_identifier("  abc123  ").unwrap(),
            "abc123".to_string()
        );
    }

    #[test]
    fn note_label_prefers_title_and_truncates() {
        let mut note = Note::new(
            "",
            RichText::plain("This is a very long sentence that should be shortened"),
            "family-1",
        );
        assert_eq!(note_label(&note, 20), "This is a very lo...");

        note.title = "Groceries".to_string();
        assert_eq!(note_label(&note, 20), "Groceries");
    }

    #[test]
    fn format_note_lines_marks_pinned_and_pending() {
        let mut pinned = Note::new("Pinned", RichText::plain("body"), "family-1");
        pinned.is_pinned = true;
        pinned.is_synced = true;
        let dirty = Note::new("Dirty", RichText::plain("body"), "family-1");

        let lines = format_note_lines(&[pinned.clone(), dirty.clone()]);
        assert!(lines[0].starts_with(&format!("{}* ", short_id(&pinned.id))));
        assert!(lines[1].starts_with(&format!("{} ~", short_id(&dirty.id))));
    }

    fn test_context() -> Context {
        Context {
            store: NoteStoreService::open_in_memory().unwrap(),
            account_id: "family-1".to_string(),
            sync: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_note_supports_exact_and_prefix_id() {
        let ctx = test_context();

        let note_a = Note::new("Note A", RichText::plain("a"), "family-1");
        let note_b = Note::new("Note B", RichText::plain("b"), "family-1");
        ctx.store.insert_note(&note_a).await.unwrap();
        ctx.store.insert_note(&note_b).await.unwrap();

        let by_exact = resolve_note(&ctx, &note_a.id.as_str()).await.unwrap();
        assert_eq!(by_exact.title, "Note A");

        // UUID v7 prefixes share the timestamp; use enough of the id to be
        // unique.
        let prefix: String = note_b.id.as_str().chars().take(30).collect();
        let by_prefix = resolve_note(&ctx, &prefix).await.unwrap();
        assert_eq!(by_prefix.title, "Note B");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_note_rejects_missing_and_ambiguous() {
        let ctx = test_context();

        let note_a = Note::new("Left", RichText::plain("a"), "family-1");
        let note_b = Note::new("Right", RichText::plain("b"), "family-1");
        ctx.store.insert_note(&note_a).await.unwrap();
        ctx.store.insert_note(&note_b).await.unwrap();

        let error = resolve_note(&ctx, "does-not-exist").await.unwrap_err();
        assert!(matches!(error, CliError::NoteNotFound(_)));

        // The shared UUID v7 timestamp prefix matches both notes.
        let shared: String = note_a.id.as_str().chars().take(4).collect();
        let error = resolve_note(&ctx, &shared).await.unwrap_err();
        assert!(matches!(error, CliError::AmbiguousNoteId(_)));
    }

}
