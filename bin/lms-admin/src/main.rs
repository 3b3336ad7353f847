//! LMS Admin CLI
//!
//! Command-line access to the LMS admin settings endpoints:
//! - Feature toggles (list, set)
//! - Audit logs (filtered, single page or the whole feed)
//! - Email templates (list, show, preview, update)
//!
//! Results are printed to stdout as pretty JSON. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use lms_common::init_tracing;
use lms_config::AppConfig;
use lms_settings::{
    AdminSettings, AdminSettingsClient, AuditLogQuery, UpdateEmailTemplateRequest,
};

/// Upper bound on pages loaded by `audit-logs --all`
const MAX_FEED_PAGES: usize = 100;

/// LMS admin settings client
#[derive(Parser, Debug)]
#[command(name = "lms-admin")]
#[command(about = "Manage LMS feature toggles, audit logs and email templates")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, env = "LMS_CONFIG")]
    config: Option<PathBuf>,

    /// Admin API base URL (overrides the config file)
    #[arg(long, env = "LMS_API_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feature toggles
    #[command(subcommand)]
    Toggles(ToggleCommand),

    /// Query the audit log
    AuditLogs(AuditLogArgs),

    /// Email notification templates
    #[command(subcommand)]
    Templates(TemplateCommand),
}

#[derive(Subcommand, Debug)]
enum ToggleCommand {
    /// List all feature toggles
    List,

    /// Enable or disable a feature
    Set {
        name: String,

        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(clap::Args, Debug)]
struct AuditLogArgs {
    #[arg(long)]
    event: Option<String>,

    #[arg(long)]
    actor_id: Option<String>,

    #[arg(long)]
    resource_type: Option<String>,

    #[arg(long)]
    status: Option<String>,

    /// Free-text search
    #[arg(long)]
    search: Option<String>,

    /// Only entries at or after this RFC 3339 timestamp
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Only entries at or before this RFC 3339 timestamp
    #[arg(long)]
    to: Option<DateTime<Utc>>,

    /// Zero-based page number
    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    page_size: Option<u32>,

    /// Follow pagination and print every matching entry
    #[arg(long)]
    all: bool,
}

impl AuditLogArgs {
    fn to_query(&self) -> AuditLogQuery {
        AuditLogQuery {
            page: self.page,
            page_size: self.page_size,
            search: self.search.clone(),
            event: self.event.clone(),
            actor_id: self.actor_id.clone(),
            resource_type: self.resource_type.clone(),
            status: self.status.clone(),
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// List all email templates
    List,

    /// Show one template
    Show { id: String },

    /// Render a template with its sample variable values
    Preview { id: String },

    /// Update a template; omitted fields keep their current values
    Update {
        id: String,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        body: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(base_url) = &args.base_url {
        config.api.base_url = base_url.clone();
        config.validate()?;
    }

    init_tracing(&config.logging.level, config.logging.format)?;
    debug!(base_url = %config.api.base_url, "Configuration loaded");

    let client = AdminSettingsClient::new(&config.api)?;
    let settings = AdminSettings::new(Arc::new(client), config.cache.clone());

    match args.command {
        Command::Toggles(cmd) => run_toggles(&settings, cmd).await,
        Command::AuditLogs(cmd) => run_audit_logs(&settings, cmd).await,
        Command::Templates(cmd) => run_templates(&settings, cmd).await,
    }
}

async fn run_toggles(settings: &AdminSettings, cmd: ToggleCommand) -> Result<()> {
    match cmd {
        ToggleCommand::List => print_json(&settings.feature_toggles().await?),
        ToggleCommand::Set { name, enabled } => {
            let toggle = settings
                .update_feature_toggle(&name, enabled)
                .await
                .with_context(|| format!("Failed to update feature toggle '{}'", name))?;
            print_json(&toggle)
        }
    }
}

async fn run_audit_logs(settings: &AdminSettings, cmd: AuditLogArgs) -> Result<()> {
    let query = cmd.to_query();

    if !cmd.all {
        return print_json(&settings.audit_logs(&query).await?);
    }

    let mut feed = settings.audit_log_feed(query);
    let pages = feed.fetch_all(MAX_FEED_PAGES).await?;
    if feed.has_next_page() {
        info!(pages, "Stopped following audit log pages at the page limit");
    }

    let entries: Vec<_> = feed.entries().collect();
    print_json(&entries)
}

async fn run_templates(settings: &AdminSettings, cmd: TemplateCommand) -> Result<()> {
    match cmd {
        TemplateCommand::List => print_json(&settings.email_templates().await?),
        TemplateCommand::Show { id } => {
            let template = settings
                .email_template(&id)
                .await?
                .with_context(|| format!("Email template '{}' not found", id))?;
            print_json(&template)
        }
        TemplateCommand::Preview { id } => {
            let template = settings
                .email_template(&id)
                .await?
                .with_context(|| format!("Email template '{}' not found", id))?;
            print_json(&template.render_preview())
        }
        TemplateCommand::Update {
            id,
            subject,
            body,
            name,
        } => {
            let current = settings
                .email_template(&id)
                .await?
                .with_context(|| format!("Email template '{}' not found", id))?;

            let mut request = UpdateEmailTemplateRequest::from(&current);
            if let Some(subject) = subject {
                request.subject = subject;
            }
            if let Some(body) = body {
                request.body = body;
            }
            if name.is_some() {
                request.name = name;
            }

            let updated = settings
                .update_email_template(&id, &request)
                .await
                .with_context(|| format!("Failed to update email template '{}'", id))?;
            print_json(&updated)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
