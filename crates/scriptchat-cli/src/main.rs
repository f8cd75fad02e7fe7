//! ScriptChat CLI - command line access to scripts, roles and chat.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use scriptchat_client::config::{default_store_path, DEFAULT_BASE_URL};
use scriptchat_client::{ClientConfig, Conversation, ConversationUpdate, HttpClient};
use scriptchat_core::{CoreError, PersistentStore, Role, RoleId, RolePatch, Script, ScriptId};

type CliResult = Result<(), Box<dyn Error>>;

/// ScriptChat CLI - talk to the characters of a script
#[derive(Parser)]
#[command(name = "scriptchat")]
#[command(about = "CLI for ScriptChat", long_about = None)]
struct Cli {
    /// Backend API base URL
    #[arg(long, env = "SCRIPTCHAT_API", default_value = DEFAULT_BASE_URL)]
    api: String,

    /// Path of the local script store
    #[arg(long, env = "SCRIPTCHAT_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a script file
    Upload {
        /// Script file to upload
        file: PathBuf,

        /// Title (defaults to the file name up to its first '.')
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Extract the roles of a stored script
    Analyze {
        /// Script ID
        script_id: String,
    },

    /// Edit a role's fields
    #[command(name = "update-role")]
    UpdateRole {
        /// Script ID
        script_id: String,

        /// Role ID
        role_id: String,

        /// New character name
        #[arg(long)]
        name: Option<String>,

        /// New personality description
        #[arg(long)]
        character: Option<String>,

        /// New language-habit description
        #[arg(long)]
        language_habit: Option<String>,
    },

    /// List stored scripts
    List,

    /// Select a stored script
    Select {
        /// Script ID
        script_id: String,
    },

    /// Clear the selection
    Deselect,

    /// List the roles of a stored script
    Roles {
        /// Script ID
        script_id: String,
    },

    /// Print the chat history between two roles
    History {
        /// Role the backend plays
        #[arg(short, long)]
        assistant: String,

        /// Role the user plays (guest when omitted)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Send a message and stream the reply
    Chat {
        /// Role the backend plays
        #[arg(short, long)]
        assistant: String,

        /// Role the user plays (guest when omitted)
        #[arg(short, long)]
        user: Option<String>,

        /// Message text
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult {
    let config = ClientConfig::new(
        &cli.api,
        cli.store.unwrap_or_else(default_store_path),
    );
    debug!(base_url = %config.base_url, store = %config.store_path.display(), "Using configuration");

    let client = HttpClient::from_config(&config);
    let mut store = PersistentStore::load(config.store_path.clone())?;

    match cli.command {
        Commands::Upload { file, title } => {
            upload(&client, &mut store, file, title).await?;
        }
        Commands::Analyze { script_id } => {
            analyze(&client, &mut store, ScriptId::from(script_id)).await?;
        }
        Commands::UpdateRole {
            script_id,
            role_id,
            name,
            character,
            language_habit,
        } => {
            let patch = RolePatch {
                name,
                character,
                language_habit,
            };
            update_role(
                &client,
                &mut store,
                ScriptId::from(script_id),
                RoleId::from(role_id),
                patch,
            )
            .await?;
        }
        Commands::List => {
            list_scripts(&store);
        }
        Commands::Select { script_id } => {
            let id = ScriptId::from(script_id);
            store.mutate(|s| s.select_script(Some(&id)))?;
            println!("Selected script {id}");
        }
        Commands::Deselect => {
            store.mutate(|s| s.select_script(None))?;
            println!("Selection cleared");
        }
        Commands::Roles { script_id } => {
            let id = ScriptId::from(script_id);
            let script = store
                .store()
                .script(&id)
                .ok_or_else(|| CoreError::ScriptNotFound(id.to_string()))?;
            print_roles(&script.roles);
        }
        Commands::History { assistant, user } => {
            history(&client, user.map(RoleId::from), RoleId::from(assistant)).await?;
        }
        Commands::Chat {
            assistant,
            user,
            message,
        } => {
            chat(&client, user.map(RoleId::from), RoleId::from(assistant), &message).await?;
        }
    }

    Ok(())
}

async fn upload(
    client: &HttpClient,
    store: &mut PersistentStore,
    file: PathBuf,
    title: Option<String>,
) -> CliResult {
    let data = client
        .upload_script_file(&file, title.as_deref())
        .await
        .into_result()?;
    let script = data.into_script();
    let id = script.id.clone();

    store.mutate(|s| s.add_script(script))?;

    println!("Script uploaded:");
    if let Some(script) = store.store().script(&id) {
        print_script(script);
    }
    Ok(())
}

async fn analyze(client: &HttpClient, store: &mut PersistentStore, id: ScriptId) -> CliResult {
    if store.store().script(&id).is_none() {
        return Err(CoreError::ScriptNotFound(id.to_string()).into());
    }

    let data = client.analyze_script(&id).await.into_result()?;
    let roles: Vec<Role> = data.roles.into_iter().map(Role::from).collect();

    store.mutate(|s| s.set_script_roles(&id, roles))?;

    print_roles(store.store().script_roles(&id));
    Ok(())
}

async fn update_role(
    client: &HttpClient,
    store: &mut PersistentStore,
    script_id: ScriptId,
    role_id: RoleId,
    patch: RolePatch,
) -> CliResult {
    if patch.is_empty() {
        return Err("nothing to update: pass --name, --character or --language-habit".into());
    }

    let current = store
        .store()
        .script(&script_id)
        .ok_or_else(|| CoreError::ScriptNotFound(script_id.to_string()))?
        .role(&role_id)
        .ok_or_else(|| CoreError::RoleNotFound {
            script: script_id.to_string(),
            role: role_id.to_string(),
        })?;
    let updated = current.patched(&patch);

    client.modify_role(&updated).await.check()?;
    store.mutate(|s| s.update_script_role(&script_id, &role_id, &patch))?;

    println!("Role updated:");
    print_role(&updated);
    Ok(())
}

async fn history(client: &HttpClient, user: Option<RoleId>, assistant: RoleId) -> CliResult {
    let data = client
        .fetch_history(user.as_ref(), &assistant)
        .await
        .into_result()?;

    println!("History ({}):", data.history.len());
    for item in &data.history {
        println!("{:<10} {}", format!("{}:", item.role.as_str()), item.content);
    }
    Ok(())
}

async fn chat(
    client: &HttpClient,
    user: Option<RoleId>,
    assistant: RoleId,
    message: &str,
) -> CliResult {
    let mut conversation = Conversation::new(user, assistant);
    conversation.send(message, client)?;

    let mut stdout = std::io::stdout();
    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                conversation.stop();
                println!();
                return Err("chat cancelled".into());
            }
            update = conversation.next_update() => update,
        };

        match update {
            Some(ConversationUpdate::Delta(text)) => {
                print!("{text}");
                stdout.flush()?;
            }
            Some(ConversationUpdate::Finalized(_)) | None => {
                println!();
                return Ok(());
            }
            Some(ConversationUpdate::Failed(message)) => {
                println!();
                return Err(message.into());
            }
        }
    }
}

fn list_scripts(store: &PersistentStore) {
    let scripts = store.store().scripts();
    let selected = store.store().selected_id();

    println!("Scripts ({}):", scripts.len());
    println!("  {:<36}  {:<24}  {:<5}  {}", "ID", "TITLE", "ROLES", "UPDATED");
    println!("{}", "-".repeat(80));

    for script in scripts {
        let marker = if Some(&script.id) == selected { '*' } else { ' ' };
        println!(
            "{} {:<36}  {:<24}  {:<5}  {}",
            marker,
            script.id,
            truncate(&script.title, 24),
            script.roles.len(),
            format_timestamp(script.updated_at)
        );
    }
}

fn print_script(script: &Script) {
    println!("  ID:         {}", script.id);
    println!("  Title:      {}", script.title);
    println!("  Length:     {} chars", script.content.chars().count());
    println!("  Created:    {}", format_timestamp(script.created_at));

    if !script.roles.is_empty() {
        println!("  Roles:");
        for role in &script.roles {
            println!("    - {} ({})", role.name, role.id);
        }
    }
}

fn print_roles(roles: &[Role]) {
    println!("Roles ({}):", roles.len());
    println!("{:<24}  {:<20}  {}", "ID", "NAME", "CHARACTER");
    println!("{}", "-".repeat(80));

    for role in roles {
        println!(
            "{:<24}  {:<20}  {}",
            role.id,
            truncate(&role.name, 20),
            truncate(&role.character, 32)
        );
    }
}

fn print_role(role: &Role) {
    println!("  ID:         {}", role.id);
    println!("  Name:       {}", role.name);
    println!("  Character:  {}", role.character);
    println!("  Habit:      {}", role.language_habit);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
