//! CLI module for the folio-admin command-line interface.
//!
//! Provides subcommands for managing portfolio content:
//! - `login` / `logout` / `whoami` - Session management
//! - `list` / `get` / `create` / `update` / `delete` - Content documents
//! - `upload` / `delete-image` - Image assets
//! - `config check` - Validate configuration file

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::api::{ApiError, Upload};
use crate::config::Config;
use crate::editor::{apply_fields, parse_assignments};
use crate::models::{
    skills_in_bucket, About, Collection, ContentRecord, Document, Experience, Hero, Message,
    Project, Record, Service, Skill, SocialLink,
};
use crate::utils::format_bytes;
use crate::AdminClient;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "folio-admin")]
#[command(author, version, about = "Admin console for portfolio content", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "folio.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Backend endpoint, overriding the configuration file
    #[arg(long, env = "FOLIO_ENDPOINT")]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in as the portfolio admin
    Login {
        #[arg(short, long)]
        email: String,
        /// Password (can also be set via FOLIO_PASSWORD env var)
        #[arg(short, long, env = "FOLIO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in admin
    Whoami,

    /// List the content collections
    Collections,

    /// List the documents of a collection
    List {
        /// Collection name, e.g. projects or social_links
        collection: Collection,
    },

    /// Print one document as JSON
    Get { collection: Collection, id: String },

    /// Create a document; hero and about update their single document instead
    Create {
        collection: Collection,
        /// Field assignments, e.g. title="My project"
        fields: Vec<String>,
        /// Fields as a JSON object; assignments override its keys
        #[arg(long)]
        json: Option<String>,
    },

    /// Change fields of a document
    Update {
        collection: Collection,
        /// Document id (not needed for hero and about)
        #[arg(long)]
        id: Option<String>,
        /// Field assignments, e.g. year=2024
        fields: Vec<String>,
        /// Fields as a JSON object; assignments override its keys
        #[arg(long)]
        json: Option<String>,
    },

    /// Delete one document (project screenshots are deleted with their project)
    Delete { collection: Collection, id: String },

    /// Upload an image and print its public URL
    Upload { path: PathBuf },

    /// Delete a previously uploaded image by its URL
    DeleteImage { url: String },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: Config) -> Result<()> {
    match &cli.command {
        Commands::Collections => {
            cmd_collections();
            Ok(())
        }
        Commands::Config(ConfigCommands::Check) => cmd_config_check(cli, &config),
        command => {
            let client = AdminClient::from_config(config)?;
            match command {
                Commands::Login { email, password } => cmd_login(&client, email, password).await,
                Commands::Logout => cmd_logout(&client).await,
                Commands::Whoami => cmd_whoami(&client).await,
                Commands::List { collection } => cmd_list(&client, *collection).await,
                Commands::Get { collection, id } => cmd_get(&client, *collection, id).await,
                Commands::Create {
                    collection,
                    fields,
                    json,
                } => cmd_create(&client, *collection, fields, json.as_deref()).await,
                Commands::Update {
                    collection,
                    id,
                    fields,
                    json,
                } => {
                    cmd_update(&client, *collection, id.as_deref(), fields, json.as_deref()).await
                }
                Commands::Delete { collection, id } => cmd_delete(&client, *collection, id).await,
                Commands::Upload { path } => cmd_upload(&client, path).await,
                Commands::DeleteImage { url } => cmd_delete_image(&client, url).await,
                Commands::Collections | Commands::Config(_) => Ok(()),
            }
        }
    }
}

async fn cmd_login(client: &AdminClient, email: &str, password: &str) -> Result<()> {
    let user = client.session().login(email, password).await?;
    println!("[OK] Signed in as {} ({})", user.display_name(), user.email);
    Ok(())
}

async fn cmd_logout(client: &AdminClient) -> Result<()> {
    client.session().logout().await;
    println!("[OK] Signed out");
    Ok(())
}

async fn cmd_whoami(client: &AdminClient) -> Result<()> {
    let user = client.session().restore().await?;

    println!();
    println!("Name:       {}", user.display_name());
    println!("Email:      {}", user.email);
    println!("Role:       {}", user.role.as_deref().unwrap_or("-"));
    println!("ID:         {}", user.id);
    println!();
    Ok(())
}

fn cmd_collections() {
    println!();
    println!("{:<4}{:<16}{:<14}{}", "", "NAME", "KIND", "LABEL");
    println!("{}", "-".repeat(50));
    for collection in Collection::ALL {
        let kind = if collection.is_read_only() {
            "read-only"
        } else if collection.is_singleton() {
            "singleton"
        } else {
            "list"
        };
        println!(
            "{:<4}{:<16}{:<14}{}",
            collection.icon(),
            collection.as_str(),
            kind,
            collection.label()
        );
    }
    println!();
}

async fn cmd_list(client: &AdminClient, collection: Collection) -> Result<()> {
    client.session().restore().await?;
    let records = client.content().list_raw(collection).await?;

    if records.is_empty() {
        println!("No {} found.", collection.label().to_lowercase());
        return Ok(());
    }

    println!();
    println!("{:<36}  {}", "ID", "SUMMARY");
    println!("{}", "-".repeat(100));
    for record in &records {
        println!(
            "{:<36}  {}",
            record.id().unwrap_or("-"),
            truncate(&record.summary(), 62)
        );
    }

    if collection == Collection::Skills {
        let skills: Vec<Document<Skill>> = records
            .iter()
            .filter_map(|record| match record {
                ContentRecord::Skill(doc) => Some(doc.clone()),
                _ => None,
            })
            .collect();
        println!();
        println!("Tech: {}", skills_in_bucket(&skills, "tech").join(", "));
        println!("Art:  {}", skills_in_bucket(&skills, "art").join(", "));
    }

    println!();
    Ok(())
}

async fn cmd_get(client: &AdminClient, collection: Collection, id: &str) -> Result<()> {
    client.session().restore().await?;
    let document = client.content().get_raw(collection, id).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn cmd_create(
    client: &AdminClient,
    collection: Collection,
    assignments: &[String],
    json: Option<&str>,
) -> Result<()> {
    let fields = parse_assignments(assignments, json)?;
    client.session().restore().await?;

    let id = match collection {
        Collection::Hero => save_singleton::<Hero>(client, &fields).await?,
        Collection::About => save_singleton::<About>(client, &fields).await?,
        Collection::Skills => create_item::<Skill>(client, &fields).await?,
        Collection::Projects => create_item::<Project>(client, &fields).await?,
        Collection::Experience => create_item::<Experience>(client, &fields).await?,
        Collection::Services => create_item::<Service>(client, &fields).await?,
        Collection::SocialLinks => create_item::<SocialLink>(client, &fields).await?,
        Collection::Messages => create_item::<Message>(client, &fields).await?,
    };

    println!("[OK] Saved {} document {}", collection, id);
    Ok(())
}

async fn cmd_update(
    client: &AdminClient,
    collection: Collection,
    id: Option<&str>,
    assignments: &[String],
    json: Option<&str>,
) -> Result<()> {
    let fields = parse_assignments(assignments, json)?;
    if collection.is_singleton() {
        client.session().restore().await?;
        let id = match collection {
            Collection::Hero => save_singleton::<Hero>(client, &fields).await?,
            _ => save_singleton::<About>(client, &fields).await?,
        };
        println!("[OK] Saved {} document {}", collection, id);
        return Ok(());
    }

    let Some(id) = id else {
        return Err(ApiError::validation_field(
            "id",
            format!("--id is required to update {}", collection),
        )
        .into());
    };
    client.session().restore().await?;

    let saved = match collection {
        Collection::Skills => update_item::<Skill>(client, id, &fields).await?,
        Collection::Projects => update_item::<Project>(client, id, &fields).await?,
        Collection::Experience => update_item::<Experience>(client, id, &fields).await?,
        Collection::Services => update_item::<Service>(client, id, &fields).await?,
        Collection::SocialLinks => update_item::<SocialLink>(client, id, &fields).await?,
        _ => update_item::<Message>(client, id, &fields).await?,
    };

    if saved == 0 {
        println!("No changes to {} document {}", collection, id);
    } else {
        println!("[OK] Updated {} document {}", collection, id);
    }
    Ok(())
}

/// Write `fields` into the single document of `T`, creating it on first save
async fn save_singleton<T: Record>(
    client: &AdminClient,
    fields: &Map<String, Value>,
) -> Result<String, ApiError> {
    let mut editor = client.singleton_editor::<T>();
    editor.load().await?;
    let updated = apply_fields(&editor.draft().record, fields)?;
    editor.edit(|record| *record = updated);
    editor.save().await?;
    Ok(editor.draft().id().unwrap_or("-").to_string())
}

async fn create_item<T: Record>(
    client: &AdminClient,
    fields: &Map<String, Value>,
) -> Result<String, ApiError> {
    let record = apply_fields(&T::default(), fields)?;
    client.collection_editor::<T>().add(record).await
}

/// Apply `fields` to item `id`; returns how many documents were written
async fn update_item<T: Record>(
    client: &AdminClient,
    id: &str,
    fields: &Map<String, Value>,
) -> Result<usize, ApiError> {
    let mut editor = client.collection_editor::<T>();
    editor.load().await?;
    editor.select(id);
    let Some(current) = editor.selected().map(|doc| doc.record.clone()) else {
        return Err(ApiError::not_found(format!("Document {} not found", id)));
    };

    let updated = apply_fields(&current, fields)?;
    editor.edit_selected(|record| *record = updated);
    editor.save().await
}

async fn cmd_delete(client: &AdminClient, collection: Collection, id: &str) -> Result<()> {
    client.session().restore().await?;

    if collection == Collection::Projects {
        let images = client.delete_project(id).await?;
        println!("[OK] Deleted {} document {} ({} images)", collection, id, images);
        return Ok(());
    }

    client.content().delete_raw(collection, id).await?;
    println!("[OK] Deleted {} document {}", collection, id);
    Ok(())
}

async fn cmd_upload(client: &AdminClient, path: &std::path::Path) -> Result<()> {
    let upload = Upload::from_path(path).await?;
    client.assets().validate(&upload.mime_type, upload.size())?;

    client.session().restore().await?;
    let asset = client.assets().upload(&upload).await?;

    println!("[OK] Uploaded {}", upload.file_name);
    println!("File ID:    {}", asset.file_id);
    println!("URL:        {}", asset.url);
    Ok(())
}

async fn cmd_delete_image(client: &AdminClient, url: &str) -> Result<()> {
    client.session().restore().await?;
    client.assets().delete_by_url(url).await?;
    println!("[OK] Deleted image");
    Ok(())
}

fn cmd_config_check(cli: &Cli, config: &Config) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("Defaults will be used.");
    }

    println!("=== Configuration Summary ===");
    println!();
    println!("Backend:");
    println!("  Kind:         {}", config.backend.kind);
    println!("  Endpoint:     {}", config.backend.endpoint);
    println!("  Project:      {}", or_dash(&config.backend.project_id));
    println!("  Database:     {}", config.backend.database_id);
    println!();
    println!("Session:");
    println!("  Data Dir:     {}", config.session.data_dir.display());
    println!("  Refresh Buffer: {}ms", config.session.refresh_buffer_ms);
    println!();
    println!("Storage:");
    println!("  Bucket:       {}", config.storage.bucket_id);
    println!("  Max Upload:   {}", format_bytes(config.storage.max_upload_bytes));
    println!();

    let problems = config.validate();
    if problems.is_empty() {
        println!("[OK] Configuration is valid!");
        return Ok(());
    }

    println!("Problems:");
    for problem in &problems {
        println!("  [!] {}", problem);
    }
    println!();
    anyhow::bail!("Invalid configuration ({} problems)", problems.len())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
