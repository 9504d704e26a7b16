//! CLI entry point for `sophos`, a Sophos Central API client.
//!
//! Resolves credentials (flags, then config file, then environment),
//! authenticates via OAuth2 client credentials, and dispatches to the
//! endpoint, alert, tenant, admin, and role APIs. Listings render as a table, JSON, or
//! CSV and can be written to a file with `--export`.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (bad config, auth failure, API error, etc.)
//! - 2: argument validation error (clap handles this automatically)

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sophos_central::admins;
use sophos_central::alerts::{self, AlertAction};
use sophos_central::auth::TokenProvider;
use sophos_central::client::SophosClient;
use sophos_central::config::{self, Config, CredentialSource, Credentials, OutputFormat};
use sophos_central::endpoints;
use sophos_central::error::{Result, SophosError};
use sophos_central::export;
use sophos_central::lifecycle::scoped;
use sophos_central::pagination::Paginator;
use sophos_central::query::{Query, SortDirection};
use sophos_central::roles;
use sophos_central::tenants;

const ENDPOINT_COLUMNS: &[&str] = &["id", "hostname", "type", "health.overall", "os.name", "lastSeenAt"];
const ALERT_COLUMNS: &[&str] = &["id", "severity", "category", "product", "raisedAt", "description"];
const TENANT_COLUMNS: &[&str] = &["id", "name", "dataRegion", "billingType", "status"];
const ADMIN_COLUMNS: &[&str] = &["id", "firstName", "lastName", "email", "role.name"];
const ROLE_COLUMNS: &[&str] = &["id", "name", "builtin", "description"];

#[derive(Parser)]
#[command(name = "sophos", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the discovered one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sophos Central API client id. Takes precedence over the config file
    /// and environment.
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Sophos Central API client secret. Prefer setting via the
    /// SOPHOS_CLIENT_SECRET environment variable to keep it out of process
    /// listings and shell history.
    #[arg(long, global = true, env = "SOPHOS_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Tenant id sent as X-Tenant-ID (partner and organization callers).
    #[arg(long, global = true)]
    tenant_id: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show who the credentials belong to and which API host serves them.
    Whoami,
    /// Manage endpoints.
    #[command(subcommand)]
    Endpoints(EndpointsCommand),
    /// Inspect and act on alerts.
    #[command(subcommand)]
    Alerts(AlertsCommand),
    /// List tenants (partner credentials only).
    #[command(subcommand)]
    Tenants(TenantsCommand),
    /// List administrators.
    #[command(subcommand)]
    Admins(AdminsCommand),
    /// List roles.
    #[command(subcommand)]
    Roles(RolesCommand),
    /// Create or inspect the config file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Options shared by every `list` subcommand.
#[derive(clap::Args, Debug)]
struct ListArgs {
    /// Items per request (1-1000). Defaults to output.page_size.
    #[arg(long)]
    page_size: Option<u32>,

    /// Stop after this many items, fetching as many pages as needed.
    #[arg(long)]
    limit: Option<usize>,

    /// Fetch every page instead of only the first.
    #[arg(long)]
    all: bool,

    /// Output format. Defaults to output.format.
    #[arg(long, short, value_enum)]
    output: Option<OutputFormat>,

    /// Write the rendered output to a file instead of stdout.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Keep only these top-level fields in JSON and CSV output.
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Drop these top-level fields from JSON and CSV output.
    #[arg(long, value_delimiter = ',')]
    exclude_fields: Vec<String>,
}

#[derive(Subcommand)]
enum EndpointsCommand {
    /// List endpoints.
    List {
        /// Only endpoints with this overall health (good, suspicious, bad, unknown).
        #[arg(long)]
        health_status: Option<String>,

        /// Only endpoints of this type (computer, server, securityVm).
        #[arg(long = "type")]
        endpoint_type: Option<String>,

        /// Only endpoints whose hostname contains this text.
        #[arg(long)]
        hostname_contains: Option<String>,

        /// Sort key as FIELD or FIELD:asc / FIELD:desc. Repeatable.
        #[arg(long)]
        sort: Vec<String>,

        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one endpoint.
    Get { id: String },
    /// Start a scan on an endpoint.
    Scan { id: String },
    /// Isolate an endpoint from the network.
    Isolate {
        id: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Release an endpoint from isolation.
    Unisolate {
        id: String,
        #[arg(long)]
        comment: Option<String>,
    },
}

#[derive(Subcommand)]
enum AlertsCommand {
    /// List alerts.
    List {
        /// Only alerts of this severity (low, medium, high). Repeatable.
        #[arg(long)]
        severity: Vec<String>,

        /// Only alerts in this category. Repeatable.
        #[arg(long)]
        category: Vec<String>,

        /// Only alerts raised by this product. Repeatable.
        #[arg(long)]
        product: Vec<String>,

        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one alert.
    Get { id: String },
    /// Perform an action (acknowledge, clearThreat, ...) on an alert.
    Action {
        id: String,
        action: String,
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum TenantsCommand {
    /// List tenants managed by the calling partner.
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one tenant.
    Get { id: String },
}

#[derive(Subcommand)]
enum AdminsCommand {
    /// List administrators.
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one administrator.
    Get { id: String },
}

#[derive(Subcommand)]
enum RolesCommand {
    /// List roles.
    List {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one role with its permissions.
    Get { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a starter config file. Uses the global --client-id and
    /// --client-secret.
    Init {
        /// Data region (us, eu, ap, de, ie).
        #[arg(long, default_value = "us")]
        region: String,

        /// Where to write the file. Defaults to the per-user config directory.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration with the secret redacted.
    Show,
}

fn init_logging(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries command output, so logs go to stderr.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(hint) = e.downcast_ref::<SophosError>().and_then(hint) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Config(ConfigCommand::Init { region, path, force }) = &cli.command {
        return init_config(&cli, region, path.as_deref(), *force);
    }

    let config = load_config(&cli)?;
    info!(source = %config.auth.source(), "Loaded credentials");

    if let Command::Config(ConfigCommand::Show) = &cli.command {
        return show_config(&config);
    }

    let provider = TokenProvider::new(config.auth.clone());
    let client = SophosClient::builder(provider).api_config(&config.api).build()?;

    scoped(&client, |c| dispatch(c, &cli.command, &config)).await?;
    Ok(())
}

/// Credentials come from `--client-id`/`--client-secret` first, then the
/// config file, then `SOPHOS_*` variables. Non-credential settings come
/// from the config file when one exists.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let file = cli.config.clone().or_else(Config::discover);

    let mut config = match (&cli.client_id, &file) {
        (Some(id), _) => {
            let secret = cli
                .client_secret
                .as_deref()
                .context("--client-id requires --client-secret (or SOPHOS_CLIENT_SECRET)")?;
            let mut config = match &file {
                Some(path) => Config::from_file(path)?,
                None => Config::new(Credentials::new(id.as_str(), secret)),
            };
            config.auth = Credentials::new(id.as_str(), secret).with_source(CredentialSource::Explicit);
            config
        }
        (None, Some(path)) => {
            debug!(path = %path.display(), "Using config file");
            Config::from_file(path)?
        }
        (None, None) => Config::from_env().context(
            "no credentials found: pass --client-id/--client-secret, set SOPHOS_CLIENT_ID/SOPHOS_CLIENT_SECRET, or run `sophos config init`",
        )?,
    };

    if let Some(tenant) = &cli.tenant_id {
        config.api.tenant_id = Some(tenant.clone());
    }
    config.validate()?;
    Ok(config)
}

fn init_config(cli: &Cli, region: &str, path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let (Some(id), Some(secret)) = (&cli.client_id, &cli.client_secret) else {
        bail!("config init requires --client-id and --client-secret");
    };
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::default_path().context("cannot determine a config directory; pass --path")?,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }

    let contents = Config::render_template(id, secret, region)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(&path, contents).with_context(|| format!("cannot write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("Wrote {}", path.display());
    println!("Region: {region}");
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    shown.auth.client_secret = "********".to_string();
    let text = toml::to_string_pretty(&shown).context("cannot render config")?;
    println!("# credentials from {}", config.auth.source());
    print!("{text}");
    Ok(())
}

// ── Command dispatch ───────────────────────────────────────────────────

async fn dispatch(client: &SophosClient, command: &Command, config: &Config) -> Result<()> {
    match command {
        Command::Whoami => {
            let me = client.whoami().await?;
            print_record(&me, config)?;
        }
        Command::Endpoints(cmd) => run_endpoints(client, cmd, config).await?,
        Command::Alerts(cmd) => run_alerts(client, cmd, config).await?,
        Command::Tenants(TenantsCommand::List { list }) => {
            let query = base_query(list, config);
            let records = fetch(tenants::paginate_tenants(client, &query, None)?, list).await?;
            emit(&records, list, config, TENANT_COLUMNS)?;
        }
        Command::Tenants(TenantsCommand::Get { id }) => {
            let tenant = tenants::get_tenant(client, id).await?;
            print_record(&tenant, config)?;
        }
        Command::Admins(AdminsCommand::List { list }) => {
            let query = base_query(list, config);
            let records = fetch(admins::paginate_admins(client, &query, None)?, list).await?;
            emit(&records, list, config, ADMIN_COLUMNS)?;
        }
        Command::Admins(AdminsCommand::Get { id }) => {
            let admin = admins::get_admin(client, id).await?;
            print_record(&admin, config)?;
        }
        Command::Roles(RolesCommand::List { list }) => {
            let query = base_query(list, config);
            let records = fetch(roles::paginate_roles(client, &query, None)?, list).await?;
            emit(&records, list, config, ROLE_COLUMNS)?;
        }
        Command::Roles(RolesCommand::Get { id }) => {
            let role = roles::get_role(client, id).await?;
            print_record(&role, config)?;
        }
        // Handled before a client is built.
        Command::Config(_) => {}
    }
    Ok(())
}

async fn run_endpoints(client: &SophosClient, cmd: &EndpointsCommand, config: &Config) -> Result<()> {
    match cmd {
        EndpointsCommand::List {
            health_status,
            endpoint_type,
            hostname_contains,
            sort,
            list,
        } => {
            let mut query = base_query(list, config).filter(|f| {
                let mut f = f;
                if let Some(s) = health_status {
                    f = f.equals("healthStatus", s);
                }
                if let Some(t) = endpoint_type {
                    f = f.equals("type", t);
                }
                if let Some(h) = hostname_contains {
                    f = f.equals("hostnameContains", h);
                }
                f
            });
            for key in sort {
                let (field, direction) = parse_sort(key)?;
                query = query.sort_by(field, direction);
            }
            let records = fetch(endpoints::paginate_endpoints(client, &query, None)?, list).await?;
            emit(&records, list, config, ENDPOINT_COLUMNS)?;
        }
        EndpointsCommand::Get { id } => {
            let endpoint = endpoints::get_endpoint(client, id).await?;
            print_record(&endpoint, config)?;
        }
        EndpointsCommand::Scan { id } => {
            let action = endpoints::scan_endpoint(client, id).await?;
            println!("Scan {} requested ({})", action.id, action.status);
        }
        EndpointsCommand::Isolate { id, comment } => {
            let action = endpoints::isolate_endpoint(client, id, comment.as_deref()).await?;
            println!("Isolation {} requested ({})", action.id, action.status);
        }
        EndpointsCommand::Unisolate { id, comment } => {
            endpoints::unisolate_endpoint(client, id, comment.as_deref()).await?;
            println!("Isolation removed for {id}");
        }
    }
    Ok(())
}

async fn run_alerts(client: &SophosClient, cmd: &AlertsCommand, config: &Config) -> Result<()> {
    match cmd {
        AlertsCommand::List {
            severity,
            category,
            product,
            list,
        } => {
            let query = base_query(list, config).filter(|f| {
                let mut f = f;
                if !severity.is_empty() {
                    f = f.in_list("severity", severity);
                }
                if !category.is_empty() {
                    f = f.in_list("category", category);
                }
                if !product.is_empty() {
                    f = f.in_list("product", product);
                }
                f
            });
            let records = fetch(alerts::paginate_alerts(client, &query, None)?, list).await?;
            emit(&records, list, config, ALERT_COLUMNS)?;
        }
        AlertsCommand::Get { id } => {
            let alert = alerts::get_alert(client, id).await?;
            print_record(&alert, config)?;
        }
        AlertsCommand::Action { id, action, message } => {
            let action: AlertAction = action.parse()?;
            let result = alerts::perform_alert_action(client, id, action, message.as_deref()).await?;
            print_record(&result, config)?;
        }
    }
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────

fn base_query(list: &ListArgs, config: &Config) -> Query {
    let query = Query::new().page_size(list.page_size.unwrap_or(config.output.page_size));
    match list.limit {
        Some(n) => query.limit(n),
        None => query,
    }
}

/// Splits `FIELD[:asc|desc]`. A bare field sorts ascending.
fn parse_sort(arg: &str) -> Result<(&str, SortDirection)> {
    let (field, direction) = match arg.split_once(':') {
        Some((field, dir)) => (field, dir.parse()?),
        None => (arg, SortDirection::Asc),
    };
    if field.trim().is_empty() {
        return Err(SophosError::validation(format!("invalid sort '{arg}': missing field")));
    }
    Ok((field.trim(), direction))
}

/// First page only unless `--all` or `--limit` asks for more. `--limit`
/// already sits on the query, so the paginator enforces it.
async fn fetch<T>(mut pages: Paginator<'_, T>, list: &ListArgs) -> Result<Vec<T>> {
    if list.all || list.limit.is_some() {
        let records = pages.collect_all(None).await?;
        debug!(pages = pages.pages_fetched(), items = records.len(), "Fetched listing");
        Ok(records)
    } else {
        Ok(pages.fetch_first_page().await?.items)
    }
}

fn emit<T: Serialize>(records: &[T], list: &ListArgs, config: &Config, columns: &[&str]) -> Result<()> {
    let format = list.output.unwrap_or(config.output.format);
    let mut settings = config.export.clone();
    if !list.fields.is_empty() {
        settings.include_fields = list.fields.clone();
    }
    if !list.exclude_fields.is_empty() {
        settings.exclude_fields = list.exclude_fields.clone();
    }
    let rendered = export::render(records, format, &settings, columns)?;
    match &list.export {
        Some(path) => {
            export::write_to(path, &rendered)?;
            eprintln!("Exported {} records to {}", records.len(), path.display());
        }
        None if records.is_empty() => eprintln!("No results."),
        None => println!("{}", rendered.trim_end()),
    }
    Ok(())
}

fn print_record<T: Serialize>(record: &T, config: &Config) -> Result<()> {
    let text = if config.export.json_indent == 0 {
        serde_json::to_string(record)?
    } else {
        serde_json::to_string_pretty(record)?
    };
    println!("{text}");
    Ok(())
}

fn hint(err: &SophosError) -> Option<&'static str> {
    match err {
        SophosError::Authentication { .. } => {
            Some("check the client id and secret, or run `sophos config init`")
        }
        SophosError::Permission(_) => Some("the API credential lacks the role this call needs"),
        SophosError::RateLimited { .. } => Some("wait a moment, or lower --page-size"),
        SophosError::Connectivity { .. } => Some("check network access to *.central.sophos.com"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Global options ──────────────────────────────────────────────────

    #[test]
    fn missing_subcommand_is_rejected() {
        // Every invocation needs a command; clap reports this as a usage
        // error (exit code 2).
        let result = Cli::try_parse_from(["sophos"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        // `global = true` lets credentials follow the subcommand, which is
        // how most users type them.
        let cli = Cli::try_parse_from([
            "sophos",
            "whoami",
            "--client-id",
            "cid",
            "--client-secret",
            "secret",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Whoami));
        assert_eq!(cli.client_id.as_deref(), Some("cid"));
        assert_eq!(cli.client_secret.as_deref(), Some("secret"));
        assert_eq!(cli.verbose, 2);
    }

    // ── endpoints ───────────────────────────────────────────────────────

    #[test]
    fn endpoints_list_parses_filters_and_repeated_sorts() {
        let cli = Cli::try_parse_from([
            "sophos",
            "endpoints",
            "list",
            "--health-status",
            "bad",
            "--type",
            "server",
            "--sort",
            "hostname",
            "--sort",
            "lastSeenAt:desc",
            "--page-size",
            "200",
            "--output",
            "csv",
        ])
        .unwrap();
        let Command::Endpoints(EndpointsCommand::List {
            health_status,
            endpoint_type,
            sort,
            list,
            ..
        }) = cli.command
        else {
            panic!("expected endpoints list");
        };
        assert_eq!(health_status.as_deref(), Some("bad"));
        assert_eq!(endpoint_type.as_deref(), Some("server"));
        assert_eq!(sort, vec!["hostname", "lastSeenAt:desc"]);
        assert_eq!(list.page_size, Some(200));
        assert_eq!(list.output, Some(OutputFormat::Csv));
        assert!(!list.all);
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let result = Cli::try_parse_from(["sophos", "endpoints", "list", "--output", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn endpoints_get_requires_an_id() {
        assert!(Cli::try_parse_from(["sophos", "endpoints", "get"]).is_err());
        assert!(Cli::try_parse_from(["sophos", "endpoints", "get", "ep-1"]).is_ok());
    }

    #[test]
    fn isolate_accepts_a_comment() {
        let cli = Cli::try_parse_from(["sophos", "endpoints", "isolate", "ep-1", "--comment", "IR-42"]).unwrap();
        let Command::Endpoints(EndpointsCommand::Isolate { id, comment }) = cli.command else {
            panic!("expected endpoints isolate");
        };
        assert_eq!(id, "ep-1");
        assert_eq!(comment.as_deref(), Some("IR-42"));
    }

    // ── alerts ──────────────────────────────────────────────────────────

    #[test]
    fn alerts_list_collects_repeated_filters() {
        let cli = Cli::try_parse_from([
            "sophos", "alerts", "list", "--severity", "high", "--severity", "medium", "--all",
        ])
        .unwrap();
        let Command::Alerts(AlertsCommand::List { severity, list, .. }) = cli.command else {
            panic!("expected alerts list");
        };
        assert_eq!(severity, vec!["high", "medium"]);
        assert!(list.all);
    }

    #[test]
    fn alerts_action_takes_id_action_and_message() {
        let cli = Cli::try_parse_from([
            "sophos",
            "alerts",
            "action",
            "al-1",
            "acknowledge",
            "--message",
            "seen",
        ])
        .unwrap();
        let Command::Alerts(AlertsCommand::Action { id, action, message }) = cli.command else {
            panic!("expected alerts action");
        };
        assert_eq!(id, "al-1");
        assert_eq!(action, "acknowledge");
        assert_eq!(message.as_deref(), Some("seen"));
    }

    // ── tenants, admins, roles ──────────────────────────────────────────

    #[test]
    fn tenants_get_takes_an_id() {
        let cli = Cli::try_parse_from(["sophos", "tenants", "get", "t-1"]).unwrap();
        let Command::Tenants(TenantsCommand::Get { id }) = cli.command else {
            panic!("expected tenants get");
        };
        assert_eq!(id, "t-1");
    }

    #[test]
    fn admins_and_roles_list_share_list_options() {
        let cli = Cli::try_parse_from([
            "sophos", "admins", "list", "--all", "--output", "json", "--fields", "id,email",
        ])
        .unwrap();
        let Command::Admins(AdminsCommand::List { list }) = cli.command else {
            panic!("expected admins list");
        };
        assert!(list.all);
        assert_eq!(list.output, Some(OutputFormat::Json));
        assert_eq!(list.fields, vec!["id", "email"]);

        let cli = Cli::try_parse_from(["sophos", "roles", "list", "--exclude-fields", "permissions"]).unwrap();
        let Command::Roles(RolesCommand::List { list }) = cli.command else {
            panic!("expected roles list");
        };
        assert_eq!(list.exclude_fields, vec!["permissions"]);
        assert!(Cli::try_parse_from(["sophos", "roles", "get", "r-1"]).is_ok());
    }

    // ── config ──────────────────────────────────────────────────────────

    #[test]
    fn config_init_defaults_region_to_us() {
        let cli = Cli::try_parse_from(["sophos", "config", "init"]).unwrap();
        let Command::Config(ConfigCommand::Init { region, path, force }) = cli.command else {
            panic!("expected config init");
        };
        assert_eq!(region, "us");
        assert!(path.is_none());
        assert!(!force);
    }

    #[test]
    fn config_init_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cli = Cli::try_parse_from([
            "sophos",
            "config",
            "init",
            "--client-id",
            "cid",
            "--client-secret",
            "secret",
        ])
        .unwrap();

        init_config(&cli, "eu", Some(&path), false).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.auth.client_id, "cid");
        assert_eq!(loaded.api.region, "eu");

        // A second run without --force must not clobber the file.
        assert!(init_config(&cli, "eu", Some(&path), false).is_err());
        init_config(&cli, "us", Some(&path), true).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().api.region, "us");
    }

    #[test]
    fn explicit_flags_win_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[auth]\nclient_id = \"file-id\"\nclient_secret = \"file-secret\"\n\n[output]\npage_size = 75\n",
        )
        .unwrap();
        let path_str = path.to_str().unwrap();

        let cli = Cli::try_parse_from([
            "sophos",
            "--config",
            path_str,
            "--client-id",
            "flag-id",
            "--client-secret",
            "flag-secret",
            "--tenant-id",
            "t-1",
            "whoami",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.auth.client_id, "flag-id");
        assert_eq!(config.auth.source(), &CredentialSource::Explicit);
        assert_eq!(config.api.tenant_id.as_deref(), Some("t-1"));
        // Non-credential settings still come from the file.
        assert_eq!(config.output.page_size, 75);

        let cli = Cli::try_parse_from(["sophos", "--config", path_str, "whoami"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.auth.client_id, "file-id");
        assert!(matches!(config.auth.source(), CredentialSource::ConfigFile(_)));
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    #[test]
    fn parse_sort_defaults_to_ascending() {
        assert_eq!(parse_sort("hostname").unwrap(), ("hostname", SortDirection::Asc));
        assert_eq!(parse_sort("lastSeenAt:desc").unwrap(), ("lastSeenAt", SortDirection::Desc));
        assert!(parse_sort("hostname:sideways").is_err());
        assert!(parse_sort(":asc").is_err());
    }

    #[test]
    fn base_query_falls_back_to_config_page_size() {
        let config = Config::new(Credentials::new("id", "secret"));
        let list = ListArgs {
            page_size: None,
            limit: Some(10),
            all: false,
            output: None,
            export: None,
            fields: Vec::new(),
            exclude_fields: Vec::new(),
        };
        let query = base_query(&list, &config);
        assert_eq!(query.requested_page_size(), config.output.page_size);
        assert_eq!(query.result_limit(), Some(10));
    }
}
