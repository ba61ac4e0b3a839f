//! Command line front-end: compose the query, call the gateway through the
//! dispatcher, persist the outcome, and print the WhatsApp deep link.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use serde_json::json;

use momgen_core::compose::{
    self, default_prompt, MeetingDetails, MessageType,
};
use momgen_core::db::{init_db, DbPool};
use momgen_core::dispatcher::Dispatcher;
use momgen_core::logging::log_event;
use momgen_core::providers::{self, ProviderKind};
use momgen_core::stores::{contacts, history, settings, snippets};
use momgen_core::stores::settings::{GenerationSettings, SqliteSettingsStore};

#[derive(Parser)]
#[command(name = "momgen", about = "Generate WhatsApp meeting follow-ups with AI")]
struct Cli {
    /// Gateway endpoint to post generation requests to.
    #[arg(
        long,
        global = true,
        env = "MOMGEN_GATEWAY_URL",
        default_value = "http://127.0.0.1:8787/api/generate"
    )]
    gateway_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a follow-up message from meeting notes.
    Generate {
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "")]
        company: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        participants: String,
        /// "mom" for minutes of meeting, "sales" for a sales follow-up.
        #[arg(long, default_value = "mom")]
        message_type: String,
        /// File with the raw notes; reads stdin when omitted.
        #[arg(long)]
        notes_file: Option<PathBuf>,
    },
    /// List the models available for a provider.
    Models {
        #[arg(long, default_value = "gemini")]
        provider: String,
    },
    /// Show or change the active provider, model, and API key.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage custom system prompt overrides.
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },
    /// Manage reusable service snippets.
    Snippets {
        #[command(subcommand)]
        action: SnippetsAction,
    },
    /// List or delete remembered contacts.
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },
    /// Browse or prune the generation history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        /// Omit to keep the gateway's server-held key.
        #[arg(long, default_value = "")]
        api_key: String,
    },
}

#[derive(Subcommand)]
enum PromptsAction {
    Show {
        #[arg(long, default_value = "mom")]
        message_type: String,
    },
    Set {
        #[arg(long)]
        message_type: String,
        #[arg(long)]
        file: PathBuf,
    },
    Reset {
        #[arg(long)]
        message_type: String,
    },
}

#[derive(Subcommand)]
enum SnippetsAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        content: String,
    },
    List,
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum ContactsAction {
    List,
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Delete {
        #[arg(long)]
        id: String,
    },
}

fn workspace_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("com", "MomGen", "MomGen") {
        proj.data_dir().to_path_buf()
    } else {
        std::env::temp_dir().join("MomGen")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let pool = init_db(workspace_dir()).context("failed to initialise database")?;

    match cli.command {
        Command::Generate {
            recipient,
            phone,
            company,
            address,
            location,
            participants,
            message_type,
            notes_file,
        } => {
            let details = MeetingDetails {
                recipient_name: recipient,
                recipient_phone: phone,
                company_name: company,
                company_address: address,
                meeting_location: location,
                participants,
                raw_notes: read_notes(notes_file)?,
            };
            let message_type = MessageType::parse(&message_type)?;
            run_generate(&cli.gateway_url, &pool, details, message_type).await
        }
        Command::Models { provider } => run_models(&pool, &provider).await,
        Command::Settings { action } => run_settings(&pool, action),
        Command::Prompts { action } => run_prompts(&pool, action),
        Command::Snippets { action } => run_snippets(&pool, action),
        Command::Contacts { action } => run_contacts(&pool, action),
        Command::History { action } => run_history(&pool, action),
    }
}

fn read_notes(notes_file: Option<PathBuf>) -> Result<String> {
    let notes = match notes_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read notes from {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read notes from stdin")?;
            buf
        }
    };
    Ok(notes)
}

async fn run_generate(
    gateway_url: &str,
    pool: &DbPool,
    details: MeetingDetails,
    message_type: MessageType,
) -> Result<()> {
    let snippet = {
        let conn = pool.get()?;
        match compose::find_snippet_marker(&details.raw_notes) {
            Some(name) => {
                let found = snippets::find_snippet(&conn, name)?;
                if found.is_none() {
                    log::warn!("snippet '{name}' referenced in notes but not found");
                }
                found
            }
            None => None,
        }
    };
    let user_query =
        compose::build_user_query(&details, snippet.as_ref().map(|s| s.content.as_str()));

    let system_prompt = {
        let conn = pool.get()?;
        settings::custom_prompt(&conn, message_type)?
            .unwrap_or_else(|| default_prompt(message_type).to_string())
    };

    let store = Arc::new(SqliteSettingsStore::new(pool.clone()));
    let dispatcher = Dispatcher::new(gateway_url, store)?;
    let result = match dispatcher.generate(&user_query, &system_prompt).await {
        Ok(result) => result,
        Err(err) => {
            let conn = pool.get()?;
            let _ = log_event(
                &conn,
                "error",
                Some(err.code()),
                "app.generate",
                &err.to_string(),
                Some(err.explain()),
                None,
            );
            return Err(err.into());
        }
    };

    {
        let conn = pool.get()?;
        contacts::save_contact(&conn, &details.recipient_name, &details.recipient_phone)?;
        let record = history::add_meeting(&conn, &details, message_type, &result)?;
        let _ = log_event(
            &conn,
            "info",
            None,
            "app.generate",
            "generation succeeded",
            None,
            Some(json!({ "meeting_id": record.id })),
        );
    }

    println!("{}", result.whatsapp_message);
    if !result.action_items.is_empty() {
        println!("\nYour action items:");
        for item in &result.action_items {
            println!("  - {item}");
        }
    }
    let link = compose::whatsapp_link(&details.recipient_phone, &result.whatsapp_message)?;
    println!("\nSend it: {link}");
    Ok(())
}

async fn run_models(pool: &DbPool, provider: &str) -> Result<()> {
    let kind = ProviderKind::parse(provider)
        .with_context(|| format!("unsupported provider '{provider}'"))?;
    let api_key = {
        let conn = pool.get()?;
        settings::load_secret(&conn, kind.as_str())?
    };
    let client = reqwest::Client::new();
    let models =
        providers::list_models(&client, kind, api_key.as_deref(), None).await?;
    for model in models {
        match model.context {
            Some(context) => println!("{}\t{} ({}k context)", model.id, model.name, context / 1000),
            None => println!("{}\t{}", model.id, model.name),
        }
    }
    Ok(())
}

fn run_settings(pool: &DbPool, action: SettingsAction) -> Result<()> {
    let conn = pool.get()?;
    match action {
        SettingsAction::Show => {
            let current = settings::read_settings(&conn)?;
            println!("provider: {}", current.provider);
            println!("model:    {}", current.model);
            println!(
                "api key:  {}",
                if current.api_key.is_empty() {
                    "(gateway default)"
                } else {
                    "(set)"
                }
            );
        }
        SettingsAction::Set {
            provider,
            model,
            api_key,
        } => {
            ProviderKind::parse(&provider)
                .with_context(|| format!("unsupported provider '{provider}'"))?;
            settings::write_settings(
                &conn,
                &GenerationSettings {
                    provider,
                    model,
                    api_key,
                },
            )?;
            println!("settings updated");
        }
    }
    Ok(())
}

fn run_prompts(pool: &DbPool, action: PromptsAction) -> Result<()> {
    let conn = pool.get()?;
    match action {
        PromptsAction::Show { message_type } => {
            let message_type = MessageType::parse(&message_type)?;
            match settings::custom_prompt(&conn, message_type)? {
                Some(prompt) => println!("{prompt}"),
                None => println!("{}", default_prompt(message_type)),
            }
        }
        PromptsAction::Set { message_type, file } => {
            let message_type = MessageType::parse(&message_type)?;
            let prompt = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read prompt from {}", file.display()))?;
            settings::set_custom_prompt(&conn, message_type, &prompt)?;
            println!("custom {message_type} prompt saved");
        }
        PromptsAction::Reset { message_type } => {
            let message_type = MessageType::parse(&message_type)?;
            settings::set_custom_prompt(&conn, message_type, "")?;
            println!("{message_type} prompt reset to the built-in default");
        }
    }
    Ok(())
}

fn run_snippets(pool: &DbPool, action: SnippetsAction) -> Result<()> {
    let conn = pool.get()?;
    match action {
        SnippetsAction::Add { name, content } => {
            let record = snippets::add_snippet(&conn, &name, &content)?;
            println!("saved snippet '{}'", record.name);
        }
        SnippetsAction::List => {
            for snippet in snippets::list_snippets(&conn)? {
                println!("{}\t{}", snippet.name, snippet.content);
            }
        }
        SnippetsAction::Delete { name } => {
            if snippets::delete_snippet(&conn, &name)? {
                println!("deleted snippet '{name}'");
            } else {
                println!("no snippet named '{name}'");
            }
        }
    }
    Ok(())
}

fn run_contacts(pool: &DbPool, action: ContactsAction) -> Result<()> {
    let conn = pool.get()?;
    match action {
        ContactsAction::List => {
            for contact in contacts::list_contacts(&conn)? {
                println!("{}\t{}", contact.name, contact.phone);
            }
        }
        ContactsAction::Delete { name } => {
            if contacts::delete_contact(&conn, &name)? {
                println!("deleted contact '{name}'");
            } else {
                println!("no contact named '{name}'");
            }
        }
    }
    Ok(())
}

fn run_history(pool: &DbPool, action: HistoryAction) -> Result<()> {
    let conn = pool.get()?;
    match action {
        HistoryAction::List => {
            for meeting in history::list_meetings(&conn)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    meeting.id, meeting.created_at, meeting.message_type, meeting.recipient_name
                );
            }
        }
        HistoryAction::Delete { id } => {
            if history::delete_meeting(&conn, &id)? {
                println!("deleted history entry {id}");
            } else {
                println!("no history entry {id}");
            }
        }
    }
    Ok(())
}
