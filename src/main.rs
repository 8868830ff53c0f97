//! jiralink - Jira Cloud sync for the task application
//!
//! Main entry point for the jiralink CLI.

use clap::{Parser, Subcommand};
use jiralink::config::{validate_config_result, JiraLinkConfig};
use jiralink::server::JiraLinkServer;
use jiralink::session::AppContext;
use jiralink::JiraLinkError;
use std::collections::HashMap;
use std::process;

/// jiralink - Link Jira Cloud issues to local tasks
#[derive(Parser, Debug)]
#[command(name = "jiralink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/jiralink/config.yaml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// OAuth client id of the Atlassian app
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Run the HTTP server
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Mint an API bearer token for a user
    Login {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,
    },

    /// Start the OAuth flow for a user
    Connect {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,

        /// Print the URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show a user's connection and tracked projects
    Status {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,
    },

    /// List, add or remove tracked projects
    Projects {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,

        /// Track the project with this key
        #[arg(long)]
        add: Option<String>,

        /// Stop tracking the project with this id
        #[arg(long)]
        remove: Option<String>,
    },

    /// Import open assigned issues of a tracked project
    Import {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,

        /// Project key
        project: String,
    },

    /// Pull remote status changes into local tasks
    Sync {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,
    },

    /// Remove a user's connection, projects and mappings
    Disconnect {
        #[arg(short, long, env = "JIRALINK_USER")]
        user: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let logging = match cli.command {
        Commands::Serve { .. } => jiralink::logging::init_with_default("info"),
        _ => jiralink::logging::init(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        if e.is_auth_failure() {
            eprintln!("The Jira connection is no longer valid. Run 'jiralink connect' again.");
        }
        process::exit(1);
    }
}

fn load_config(path: &Option<String>) -> jiralink::Result<JiraLinkConfig> {
    match path {
        Some(path) => JiraLinkConfig::load(path),
        None => match JiraLinkConfig::load_default() {
            Ok(config) => Ok(config),
            Err(JiraLinkError::Config(msg)) if msg.contains("Config file not found") => {
                Err(JiraLinkError::Config(
                    "No configuration found. Run 'jiralink init --client-id <id>' first."
                        .to_string(),
                ))
            }
            Err(e) => Err(e),
        },
    }
}

fn run(cli: Cli) -> jiralink::Result<()> {
    if let Commands::Init { client_id } = &cli.command {
        return handle_init(&cli.config, client_id.clone());
    }

    let config = load_config(&cli.config)?;
    validate_config_result(&config)?;
    let ctx = AppContext::open(config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| ctx.config().server.bind.clone());
            println!("jiralink listening on http://{}", addr);
            let server = JiraLinkServer::new(ctx);
            runtime.block_on(server.run(&addr))
        }

        Commands::Login { user } => {
            let token = ctx.sessions().issue(&user)?;
            println!("{}", token);
            Ok(())
        }

        Commands::Connect { user, no_browser } => {
            let url = ctx.begin_authorization(&user)?;
            println!("Authorize jiralink in your browser:\n\n  {}\n", url);
            println!(
                "The callback must reach {} (run 'jiralink serve').",
                ctx.config().oauth.redirect_uri
            );
            if !no_browser {
                if let Err(e) = open::that(&url) {
                    tracing::warn!(error = %e, "Could not open a browser");
                }
            }
            Ok(())
        }

        Commands::Status { user } => {
            let session = ctx.session(&user);
            match session.connection()? {
                Some(conn) => {
                    println!("Connected to {} ({})", conn.site_name, conn.site_url);
                    if let Some(email) = &conn.account_email {
                        println!("  Account:       {}", email);
                    }
                    println!("  Token expires: {}", conn.expires_at.to_rfc3339());
                }
                None => {
                    println!("Not connected. Run 'jiralink connect --user {}'.", user);
                    return Ok(());
                }
            }

            let projects = session.projects().list()?;
            let ledger = session.ledger();
            println!("\nTracked projects: {}", projects.len());
            for project in projects {
                let linked = ledger.list_by_project(&project.id)?.len();
                println!(
                    "  {:<10} {:<30} {} linked tasks",
                    project.project_key, project.project_name, linked
                );
            }
            Ok(())
        }

        Commands::Projects { user, add, remove } => {
            let session = ctx.session(&user);
            if let Some(key) = add {
                let project = runtime.block_on(session.track_project_by_key(&key))?;
                println!("Tracking {} ({})", project.project_key, project.id);
            }
            if let Some(id) = remove {
                if session.projects().remove(&id)? {
                    println!("Stopped tracking {}", id);
                } else {
                    return Err(JiraLinkError::NotFound(format!("project {}", id)));
                }
            }
            for project in session.projects().list()? {
                println!(
                    "{:<38} {:<10} {}",
                    project.id, project.project_key, project.project_name
                );
            }
            Ok(())
        }

        Commands::Import { user, project } => {
            let session = ctx.session(&user);
            let tasks = ctx.task_store()?;
            let tracked = session
                .projects()
                .list()?
                .into_iter()
                .find(|p| p.project_key.eq_ignore_ascii_case(&project))
                .ok_or_else(|| {
                    JiraLinkError::NotFound(format!(
                        "project {} is not tracked (jiralink projects --add {})",
                        project, project
                    ))
                })?;

            let result = runtime.block_on(async {
                let issues = session.remote_issues(&tracked.project_key).await?;
                session
                    .importer(tasks)
                    .import_issues(&issues, &HashMap::new(), &tracked.id)
                    .await
            })?;

            println!(
                "Imported {} issues ({} already linked, {} failed)",
                result.imported,
                result.skipped.len(),
                result.failures.len()
            );
            for failure in &result.failures {
                println!("  {}: {}", failure.remote_issue_key, failure.error);
            }
            Ok(())
        }

        Commands::Sync { user } => {
            let session = ctx.session(&user);
            let tasks = ctx.task_store()?;
            let report = runtime.block_on(session.status_sync(tasks).pull_all())?;

            println!(
                "Checked {} linked tasks: {} updated, {} unchanged, {} failed",
                report.checked,
                report.updates.len(),
                report.unchanged,
                report.failures.len()
            );
            for update in &report.updates {
                println!(
                    "  {} -> {} ({}%)",
                    update.remote_issue_key, update.status, update.completion
                );
            }
            for failure in &report.failures {
                println!("  {}: {}", failure.remote_issue_key, failure.error);
            }
            Ok(())
        }

        Commands::Disconnect { user } => {
            if ctx.session(&user).disconnect()? {
                println!("Disconnected {}", user);
            } else {
                println!("{} had no Jira connection", user);
            }
            Ok(())
        }
    }
}

fn handle_init(path: &Option<String>, client_id: Option<String>) -> jiralink::Result<()> {
    let path = path
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(JiraLinkConfig::default_path);

    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }

    let mut config = JiraLinkConfig::new();
    if let Some(client_id) = client_id {
        config.oauth.client_id = client_id;
    }
    config.save(&path)?;

    println!("Wrote {}", path.display());
    println!(
        "Set {} to the app's client secret before running 'jiralink serve'.",
        config.oauth.client_secret_env
    );
    Ok(())
}
