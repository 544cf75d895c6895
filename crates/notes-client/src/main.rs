//! Command-line client for the notes API
//!
//! Signs in with email and password, then lists, adds, edits or removes notes.
//! `watch` keeps a live list on screen until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use notes_client::{ClientNoteStore, FirebaseSession, IdentitySession, NoteApi, NotesSnapshot};
use notes_core::Note;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "notes")]
#[command(about = "Read and write your notes from the terminal")]
struct Cli {
    /// Base URL of the notes API
    #[arg(long, default_value = "http://localhost:3000", env = "NOTES_API_URL")]
    api_url: String,

    /// Firebase Web API key of the project
    #[arg(long, env = "FIREBASE_API_KEY", hide_env_values = true)]
    firebase_api_key: String,

    #[arg(long, env = "NOTES_EMAIL")]
    email: String,

    #[arg(long, env = "NOTES_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Signup {
        /// Display name shown in the greeting
        #[arg(long)]
        name: Option<String>,
    },
    /// List your notes, newest first
    List,
    /// Add a note
    Add { content: String },
    /// Replace a note's content
    Edit { id: String, content: String },
    /// Delete a note
    Rm { id: String },
    /// Print the list every time it changes
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let session = Arc::new(FirebaseSession::new(cli.firebase_api_key.clone()));

    let user = match &cli.command {
        Command::Signup { name } => session
            .sign_up(&cli.email, &cli.password, name.as_deref())
            .await
            .context("Sign-up failed")?,
        _ => session
            .sign_in(&cli.email, &cli.password)
            .await
            .context("Sign-in failed")?,
    };
    println!("Hi, {}", user.greeting_name());

    let api = NoteApi::new(&cli.api_url).context("Invalid --api-url")?;

    match cli.command {
        Command::Signup { .. } => {}
        Command::List => {
            let token = token(&*session).await?;
            print_notes(&api.list(&token).await?);
        }
        Command::Add { content } => {
            let token = token(&*session).await?;
            let note = api.create(&token, &content).await?;
            println!("Added {}", note.id);
        }
        Command::Edit { id, content } => {
            let token = token(&*session).await?;
            let note = api.update(&token, &id, &content).await?;
            println!("Updated {}", note.id);
        }
        Command::Rm { id } => {
            let token = token(&*session).await?;
            api.delete(&token, &id).await?;
            println!("Deleted {}", id);
        }
        Command::Watch => watch(api, session).await?,
    }

    Ok(())
}

async fn token(session: &dyn IdentitySession) -> anyhow::Result<String> {
    session
        .id_token(false)
        .await?
        .context("Not signed in")
}

async fn watch(api: NoteApi, session: Arc<FirebaseSession>) -> anyhow::Result<()> {
    let store = ClientNoteStore::spawn(api, session);
    let mut snapshots = store.subscribe();

    loop {
        render(&snapshots.borrow_and_update());
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Stopped watching");
    Ok(())
}

fn render(snapshot: &NotesSnapshot) {
    if snapshot.loading {
        println!("Loading…");
        return;
    }
    if let Some(error) = &snapshot.error {
        println!("Failed to load notes: {}", error);
    }
    if let Some(notes) = &snapshot.notes {
        print_notes(notes);
    }
}

fn print_notes(notes: &[Note]) {
    if notes.is_empty() {
        println!("No notes yet.");
        return;
    }
    for note in notes {
        let created = note.created_at.with_timezone(&chrono::Local);
        println!("{}  {}", created.format("%Y-%m-%d %H:%M"), note.id);
        for line in note.content.lines() {
            println!("    {}", line);
        }
    }
}
