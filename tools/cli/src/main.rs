//! fsgate CLI - Command line interface for file operations.
//!
//! This tool signs in against the netdisk identity service and runs file
//! operations through the dispatcher, against the netdisk provider or the
//! in-memory one.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use fsgate_common::{Access, Content, DataType, Error, File};
use fsgate_dispatch::{Dispatcher, FileOptions};
use fsgate_session::{
    AnonymousSession, FileCookieStore, LoginOptions, Navigation, NavigationKind, Navigator,
    OAuthConfig, OAuthSession, SessionManager,
};
use fsgate_storage::{
    DuplicatePolicy, MemoryProvider, NetdiskConfig, NetdiskProvider, ProviderRegistry,
};

/// Where the identity service sends desktop users after authorizing.
const DEFAULT_REDIRECT: &str = "https://openapi.baidu.com/oauth/2.0/login_success";

#[derive(Parser)]
#[command(name = "fsgate")]
#[command(about = "fsgate - Pluggable cloud file access")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Provider to use (default: netdisk).
    #[arg(short, long)]
    provider: Option<String>,

    /// Application key registered with the identity service.
    #[arg(long)]
    api_key: Option<String>,

    /// Cookie jar holding the session token.
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// JSON file with session and provider settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Retries for remote requests.
    #[arg(long)]
    retry: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser.
    Login {
        /// Always show the login form.
        #[arg(short, long)]
        force: bool,

        /// Seconds to keep the session token.
        #[arg(short, long)]
        remember: Option<u64>,

        /// Redirect URL registered for the application.
        #[arg(long)]
        redirect: Option<String>,
    },

    /// Finish a login with the URL the browser landed on.
    Callback {
        /// Full URL including the `#access_token=...` fragment.
        url: String,
    },

    /// Show the signed-in user.
    Whoami,

    /// Sign out and forget the session token.
    Logout,

    /// List a directory.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file.
    Cat {
        path: String,

        /// How to decode the content.
        #[arg(short = 't', long = "type", value_enum, default_value = "text")]
        data_type: ReadType,

        /// Write the content to a local file instead.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Upload a local file.
    Put {
        /// Local file to upload.
        source: PathBuf,

        /// Destination path.
        dest: String,

        /// What to do when the destination exists.
        #[arg(long, value_enum, default_value = "fail")]
        on_conflict: Conflict,
    },

    /// Move or rename a file.
    Mv {
        from: String,
        to: String,

        /// Keep both files when the destination exists.
        #[arg(long)]
        rename: bool,
    },

    /// Delete a file or directory.
    Rm { path: String },

    /// Create a directory.
    Mkdir { path: String },

    /// Show or change access rights.
    Acl {
        path: String,

        /// Grant rights, e.g. `bob=read,write`; `bob=none` revokes.
        #[arg(short, long, value_parser = parse_grant)]
        grant: Vec<(String, Access)>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReadType {
    Text,
    Json,
    Blob,
}

impl From<ReadType> for DataType {
    fn from(value: ReadType) -> Self {
        match value {
            ReadType::Text => DataType::Text,
            ReadType::Json => DataType::Json,
            ReadType::Blob => DataType::Blob,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Conflict {
    Fail,
    Overwrite,
    Rename,
}

impl From<Conflict> for DuplicatePolicy {
    fn from(value: Conflict) -> Self {
        match value {
            Conflict::Fail => DuplicatePolicy::Fail,
            Conflict::Overwrite => DuplicatePolicy::Overwrite,
            Conflict::Rename => DuplicatePolicy::Rename,
        }
    }
}

/// Settings file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    /// Passed to the session manager's init.
    session: Value,
    /// Passed to each named provider's init.
    providers: HashMap<String, Value>,
}

/// Parse `user=right,right`.
fn parse_grant(value: &str) -> std::result::Result<(String, Access), String> {
    let (user, rights) = value
        .split_once('=')
        .ok_or_else(|| format!("expected user=rights, got '{}'", value))?;
    if user.is_empty() {
        return Err("user name cannot be empty".to_string());
    }

    let mut access = Access::NONE;
    for right in rights.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        access |= match right {
            "none" => Access::NONE,
            "public" => Access::PUBLIC,
            "read" => Access::READ,
            "write" => Access::WRITE,
            "create" => Access::CREATE,
            "delete" => Access::DELETE,
            "acl-read" => Access::ACL_READ,
            "acl-write" => Access::ACL_WRITE,
            "all" => Access::ALL,
            other => return Err(format!("unknown right '{}'", other)),
        };
    }
    Ok((user.to_string(), access))
}

/// Navigator for a terminal: authorize pages open in the browser.
struct BrowserNavigator {
    location: Option<String>,
}

impl Navigator for BrowserNavigator {
    fn current_location(&self) -> Option<String> {
        self.location.clone()
    }

    fn navigate(&self, navigation: &Navigation) -> fsgate_common::Result<()> {
        match navigation.kind {
            NavigationKind::Authorize => {
                println!("Open this URL to sign in:\n  {}", navigation.url);
                if let Err(e) = open::that(&navigation.url) {
                    debug!("Could not open a browser: {}", e);
                }
            }
            NavigationKind::StripCallback => {
                debug!("Callback handled, would reload {}", navigation.url);
            }
        }
        Ok(())
    }
}

fn cookie_jar(path: Option<PathBuf>) -> Result<FileCookieStore> {
    let path = match path {
        Some(path) => path,
        None => dirs::config_dir()
            .context("Could not determine the config directory")?
            .join("fsgate")
            .join("cookies.json"),
    };
    debug!("Using cookie jar {}", path.display());
    Ok(FileCookieStore::new(path))
}

async fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    serde_json::from_str(&content).context("Invalid settings file")
}

/// Build the session manager; anonymous unless an api key is configured.
fn build_session(
    cli: &Cli,
    settings: &Settings,
    location: Option<String>,
) -> Result<Arc<dyn SessionManager>> {
    let configured_key = settings
        .session
        .get("apiKey")
        .and_then(Value::as_str)
        .map(str::to_string);
    let Some(api_key) = cli.api_key.clone().or(configured_key) else {
        return Ok(Arc::new(AnonymousSession));
    };

    let config = OAuthConfig {
        redirect_url: Some(DEFAULT_REDIRECT.to_string()),
        ..OAuthConfig::with_api_key(api_key)
    };
    let session = OAuthSession::new(
        config,
        Arc::new(cookie_jar(cli.cookies.clone())?),
        Arc::new(BrowserNavigator { location }),
    )
    .context("Failed to create session")?;
    Ok(Arc::new(session))
}

async fn build_dispatcher(cli: &Cli, location: Option<String>) -> Result<Dispatcher> {
    let settings = load_settings(cli.config.as_deref()).await?;

    let registry = Arc::new(ProviderRegistry::new());
    registry.register(
        NetdiskProvider::NAME,
        Arc::new(NetdiskProvider::new(NetdiskConfig::default())?),
    )?;
    registry.register("memory", Arc::new(MemoryProvider::new()))?;

    for (name, config) in &settings.providers {
        registry
            .init(name, config.clone())
            .await
            .with_context(|| format!("Failed to initialize provider '{}'", name))?;
    }
    if let Some(provider) = &cli.provider {
        registry.use_provider(provider)?;
    }

    let session = build_session(cli, &settings, location)?;
    session
        .init(settings.session.clone())
        .await
        .context("Failed to configure session")?;

    Ok(Dispatcher::new(registry, session))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let location = match &cli.command {
        Commands::Callback { url } => Some(url.clone()),
        _ => None,
    };
    let dispatcher = build_dispatcher(&cli, location).await?;
    let options = |path: &str| {
        let options = FileOptions::new(path);
        match cli.retry {
            Some(retry) => options.extra("retry", retry),
            None => options,
        }
    };

    match &cli.command {
        Commands::Login {
            force,
            remember,
            redirect,
        } => cmd_login(&dispatcher, *force, *remember, redirect.clone()).await,

        Commands::Callback { .. } => cmd_callback(&dispatcher).await,

        Commands::Whoami => cmd_whoami(&dispatcher).await,

        Commands::Logout => cmd_logout(&dispatcher).await,

        Commands::Ls { path } => cmd_ls(&dispatcher, options(path)).await,

        Commands::Cat {
            path,
            data_type,
            out,
        } => {
            let options = options(path).data_type((*data_type).into());
            cmd_cat(&dispatcher, options, out.as_deref()).await
        }

        Commands::Put {
            source,
            dest,
            on_conflict,
        } => {
            let options = options(dest).duplicate_policy((*on_conflict).into());
            cmd_put(&dispatcher, source, options).await
        }

        Commands::Mv { from, to, rename } => {
            let mut options = options(from).new_path(to.as_str());
            if *rename {
                options = options.duplicate_policy(DuplicatePolicy::Rename);
            }
            let file = dispatcher
                .move_file(options)
                .await
                .context("Failed to move file")?;
            println!("Moved {} -> {}", from, file.path);
            Ok(())
        }

        Commands::Rm { path } => {
            let file = dispatcher
                .delete(options(path))
                .await
                .context("Failed to delete")?;
            println!("Deleted: {}", file.path);
            Ok(())
        }

        Commands::Mkdir { path } => {
            let file = dispatcher
                .mkdir(options(path))
                .await
                .context("Failed to create directory")?;
            println!("Directory created: {}", file.path);
            Ok(())
        }

        Commands::Acl { path, grant } => {
            let options = grant
                .iter()
                .fold(options(path), |options, (user, access)| {
                    options.grant(user.as_str(), *access)
                });
            cmd_acl(&dispatcher, options, !grant.is_empty()).await
        }
    }
}

/// Start a browser login.
async fn cmd_login(
    dispatcher: &Dispatcher,
    force: bool,
    remember: Option<u64>,
    redirect_url: Option<String>,
) -> Result<()> {
    let navigation = dispatcher
        .session()
        .login(LoginOptions {
            force,
            remember,
            redirect_url,
        })
        .await
        .context("Failed to start login")?;

    info!("Waiting for the browser to finish at the redirect URL");
    debug!("Authorize URL: {}", navigation.url);
    println!("Then run: fsgate callback '<url the browser landed on>'");
    Ok(())
}

/// Store the token from a login callback URL.
async fn cmd_callback(dispatcher: &Dispatcher) -> Result<()> {
    match dispatcher.session().check().await {
        Err(Error::Redirecting(_)) => {
            println!("Session token saved.");
            Ok(())
        }
        Ok(_) => anyhow::bail!("The URL carries no access token"),
        Err(e) => Err(e).context("Failed to handle callback"),
    }
}

/// Show the signed-in user.
async fn cmd_whoami(dispatcher: &Dispatcher) -> Result<()> {
    match dispatcher
        .session()
        .check()
        .await
        .context("Failed to check session")?
    {
        Some(user) => {
            println!("Signed in as {} (id {})", user.username, user.id);
            if let Some(avatar) = &user.small_image {
                println!("  Avatar: {}", avatar);
            }
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

/// Sign out.
async fn cmd_logout(dispatcher: &Dispatcher) -> Result<()> {
    match dispatcher
        .session()
        .logout()
        .await
        .context("Failed to sign out")?
    {
        Some(user) => println!("Signed out {}.", user.username),
        None => println!("Not signed in."),
    }
    Ok(())
}

fn print_entry(file: &File) {
    let name = file.filename.as_deref().unwrap_or("/");
    if file.is_dir {
        println!("  [DIR]  {}/", name);
    } else {
        println!(
            "  [FILE] {} ({} bytes, {})",
            name,
            file.size,
            file.modify_time.format("%Y-%m-%d %H:%M")
        );
    }
}

/// List a directory.
async fn cmd_ls(dispatcher: &Dispatcher, options: FileOptions) -> Result<()> {
    let path = options.path.clone();
    let files = dispatcher
        .list(options)
        .await
        .context("Failed to list directory")?;

    if files.is_empty() {
        println!("Directory is empty.");
    } else {
        println!("Contents of {}:", path);
        files.iter().for_each(print_entry);
    }
    Ok(())
}

/// Print or save a file.
async fn cmd_cat(dispatcher: &Dispatcher, options: FileOptions, out: Option<&Path>) -> Result<()> {
    let file = dispatcher
        .read(options)
        .await
        .context("Failed to read file")?;
    let data = file.data.context("Provider returned no content")?;

    if let Some(out) = out {
        let bytes = data.content.to_bytes();
        tokio::fs::write(out, &bytes)
            .await
            .context("Failed to write output file")?;
        println!("Saved {} ({} bytes)", out.display(), bytes.len());
        return Ok(());
    }

    match data.content {
        Content::Text(text) => println!("{}", text),
        Content::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Content::Binary(bytes) => {
            anyhow::bail!("{} bytes of binary content, use --out", bytes.len())
        }
    }
    Ok(())
}

/// Upload a local file.
async fn cmd_put(dispatcher: &Dispatcher, source: &Path, options: FileOptions) -> Result<()> {
    info!("Uploading {} to {}", source.display(), options.path);

    let bytes = tokio::fs::read(source)
        .await
        .context("Failed to read source file")?;
    let content = match String::from_utf8(bytes) {
        Ok(text) => Content::Text(text),
        Err(e) => Content::Binary(e.into_bytes()),
    };

    let file = dispatcher
        .write(options.content(content))
        .await
        .context("Failed to upload file")?;
    println!("Uploaded: {} ({} bytes)", file.path, file.size);
    Ok(())
}

/// Show or change access rights.
async fn cmd_acl(dispatcher: &Dispatcher, options: FileOptions, change: bool) -> Result<()> {
    let entries = if change {
        dispatcher.write_acl(options).await
    } else {
        dispatcher.read_acl(options).await
    }
    .context("Failed to access ACL")?;

    if entries.is_empty() {
        println!("No access rules.");
    }
    for entry in entries {
        println!("  {}: {:#06x}", entry.user, entry.access.bits());
    }
    Ok(())
}
