mod auth;
mod config;
mod deletion;
mod demo;
mod email;
mod error;
mod gmail;
mod index;
mod mailbox;
mod server;

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::{Credential, CredentialStore, OAuthCredentialStore, StaticCredentialStore};
use config::Settings;
use deletion::BulkDeleter;
use demo::DemoMailbox;
use error::PurgeError;
use gmail::GmailMailbox;
use index::{SenderIndex, SenderIndexBuilder};
use mailbox::MailboxProvider;
use server::AppState;

/// Group your mailbox by sender and bulk-delete what you no longer want
#[derive(Debug, Parser)]
#[command(name = "mailpurge", version)]
struct Cli {
    /// Path to settings.toml (defaults to the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory demo mailbox instead of Gmail
    #[arg(long, global = true)]
    demo: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Address to listen on, overrides settings.toml
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print senders ranked by message count
    Senders {
        #[arg(long)]
        max_messages: Option<usize>,
        /// How many senders to show
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Delete every message from the given senders
    Purge {
        /// Sender identity (email address) to purge; repeatable
        #[arg(long = "sender", required = true)]
        senders: Vec<String>,
        #[arg(long)]
        max_messages: Option<usize>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let settings = config::load_settings(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Command::Serve { listen: None });

    if cli.demo {
        info!("using in-memory demo mailbox");
        let mailbox = Arc::new(DemoMailbox::seeded());
        let credentials = StaticCredentialStore::new(Credential::new("demo"));
        run(command, &settings, mailbox, credentials).await
    } else {
        let mailbox = Arc::new(GmailMailbox::new(
            settings.delete_mode,
            settings.query.clone(),
        )?);
        let credentials = OAuthCredentialStore::new(settings.delete_mode).await?;
        run(command, &settings, mailbox, credentials).await
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "mailpurge=debug,tower_http=debug"
    } else {
        "mailpurge=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(io::stderr)
        .init();
}

async fn run<P, C>(
    command: Command,
    settings: &Settings,
    mailbox: Arc<P>,
    credentials: C,
) -> Result<()>
where
    P: MailboxProvider + 'static,
    C: CredentialStore + 'static,
{
    let state = Arc::new(AppState {
        builder: SenderIndexBuilder::new(
            mailbox.clone(),
            settings.metadata_concurrency,
            settings.identity,
        ),
        deleter: BulkDeleter::new(mailbox, settings.delete_concurrency),
        credentials,
        max_messages: settings.max_messages,
    });

    match command {
        Command::Serve { listen } => {
            let addr = listen.unwrap_or_else(|| settings.listen_addr.clone());
            server::run_server(&addr, state).await
        }
        Command::Senders { max_messages, top } => {
            let credential = state.credentials.credential().await.map_err(describe)?;
            let index = state
                .builder
                .build_index(&credential, max_messages.unwrap_or(state.max_messages))
                .await
                .map_err(describe)?;
            print_senders(&index, top);
            Ok(())
        }
        Command::Purge {
            senders,
            max_messages,
            yes,
        } => purge(&state, &senders, max_messages.unwrap_or(state.max_messages), yes).await,
    }
}

/// Builds the index, deletes everything from the chosen senders and shows what is left
async fn purge<P, C>(
    state: &AppState<P, C>,
    senders: &[String],
    max_messages: usize,
    skip_confirm: bool,
) -> Result<()>
where
    P: MailboxProvider,
    C: CredentialStore,
{
    let credential = state.credentials.credential().await.map_err(describe)?;
    let index = state
        .builder
        .build_index(&credential, max_messages)
        .await
        .map_err(describe)?;

    let mut selected = Vec::new();
    for sender in senders {
        match index.get(sender) {
            Some(record) => {
                println!("{:>6}  {}", record.count(), record.display_name());
                selected.push(record.identity().to_string());
            }
            None => println!("No messages from {sender}"),
        }
    }

    let ids = index.message_ids_for(&selected);
    if ids.is_empty() {
        println!("Nothing to delete");
        return Ok(());
    }

    if !skip_confirm && !confirm(&confirm_prompt(ids.len(), &selected))? {
        println!("Cancelled");
        return Ok(());
    }

    let outcome = state
        .deleter
        .delete_messages(&credential, &ids)
        .await
        .map_err(describe)?;

    println!("{}", outcome.summary());
    for id in &outcome.failed {
        println!("  not deleted: {id}");
    }
    if outcome.is_partial() {
        println!("Run the same purge again to retry the remaining messages");
    }
    if outcome.needs_reauthorization {
        anyhow::bail!(PurgeError::Auth(String::new()).user_message());
    }

    let deleted: HashSet<String> = outcome.succeeded.iter().cloned().collect();
    let remaining = index.without_messages(&deleted);
    println!();
    println!("Remaining top senders:");
    print_senders(&remaining, 10);
    Ok(())
}

fn confirm_prompt(count: usize, senders: &[String]) -> String {
    format!("Delete {} email(s) from {}?", count, senders.join(", "))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (y/n) ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_senders(index: &SenderIndex, top: usize) {
    if index.is_empty() {
        println!("No senders found");
        return;
    }

    for sender in index.senders().iter().take(top) {
        println!(
            "{:>6}  {:<40}  {}",
            sender.count(),
            sender.identity(),
            sender.display_name()
        );
    }
    if index.len() > top {
        println!("        ... and {} more senders", index.len() - top);
    }
}

/// Turns an engine error into a message that says what the user should do
fn describe(err: PurgeError) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", err.user_message(), err)
}
