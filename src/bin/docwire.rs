use std::path::PathBuf;
use std::sync::Arc;

use bson::Document;
use clap::{Parser, Subcommand};
use docwire::config::{ClientConfig, ConnectionString};
use docwire::database::{Database, FindOptions};
use docwire::{Connection, DbError, logger};
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "docwire", version, about = "Document database wire client", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Defaults to DOCWIRE_CONFIG or docwire.toml.")]
    config: Option<PathBuf>,
    #[arg(long, help = "Connection string; takes precedence over config and DOCWIRE_URI.")]
    uri: Option<String>,
    #[arg(long, help = "Authenticate with the connection string's credentials before running the command")]
    auth: bool,
    #[arg(long, help = "Log level for console output (error, warn, info, debug, trace)")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Query a collection and print matching documents as JSON lines")]
    Find {
        #[arg(help = "Collection name within the connection's database")]
        collection: String,
        #[arg(long, default_value = "{}", help = "Filter as a JSON object")]
        filter: String,
        #[arg(long, help = "Maximum number of documents to return")]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0, help = "Number of documents to skip")]
        skip: u32,
        #[arg(long, help = "Sort specification as a JSON object, e.g. {\"age\":-1}")]
        sort: Option<String>,
        #[arg(long, value_delimiter = ',', help = "Comma-separated fields to return")]
        fields: Option<Vec<String>>,
    },
    #[command(about = "Print the authentication digest for a nonce using the URI's credentials")]
    Digest {
        #[arg(long)]
        nonce: String,
        #[arg(long, help = "User name; defaults to the one in the connection string")]
        user: Option<String>,
    },
    #[command(name = "last-error", about = "Run getlasterror and print the response")]
    LastError,
    #[command(about = "Print records from the database's system.profile collection")]
    Profile {
        #[arg(long, default_value = "{}", help = "Filter as a JSON object")]
        filter: String,
    },
}

fn parse_document(json: &str) -> Result<Document, Box<dyn std::error::Error>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, got: {json}").into());
    }
    Ok(bson::serialize_to_document(&value)?)
}

fn init_logging(cfg: &ClientConfig, level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let level = level.or(cfg.logging.level.as_deref());
    match &cfg.logging.dir {
        Some(dir) => logger::configure_logging(Some(dir), level, cfg.logging.retention),
        None => logger::configure_console(level),
    }
}

fn connection_string(cli: &Cli, cfg: &ClientConfig) -> Result<ConnectionString, DbError> {
    match &cli.uri {
        Some(uri) => ConnectionString::parse(uri),
        None => cfg.connection_string(),
    }
}

fn open(cli: &Cli, cfg: &ClientConfig) -> Result<(Connection, Database), Box<dyn std::error::Error>> {
    let mut conn = Connection::open(Arc::new(connection_string(cli, cfg)?))?;
    let db = Database::for_connection(&conn);
    if cli.auth {
        db.authenticate(&mut conn)?;
    }
    Ok((conn, db))
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = ClientConfig::load(cli.config.as_deref())?;
    init_logging(&cfg, cli.log_level.as_deref())?;

    match &cli.command {
        Commands::Digest { nonce, user } => {
            let cs = connection_string(cli, &cfg).ok();
            let user = user
                .as_deref()
                .or_else(|| cs.as_ref().and_then(ConnectionString::user_name))
                .ok_or("no user name: pass --user or put one in the connection string")?;
            let password = match cs.as_ref().and_then(ConnectionString::password) {
                Some(p) if !p.is_empty() => Zeroizing::new(p.to_string()),
                _ => Zeroizing::new(rpassword::prompt_password("Password: ")?),
            };
            println!("{}", docwire::connection::digest(nonce, user, &password));
        }
        Commands::Find { collection, filter, limit, skip, sort, fields } => {
            let filter = parse_document(filter)?;
            let sort = sort.as_deref().map(parse_document).transpose()?;
            let opts = FindOptions { fields: fields.clone(), sort, limit: *limit, skip: *skip, ..FindOptions::default() };
            let (mut conn, db) = open(cli, &cfg)?;
            let reply = db.collection(collection).find(&mut conn, filter, &opts)?;
            for doc in reply.results() {
                println!("{}", serde_json::to_string(&doc?)?);
            }
            eprintln!("returned: {} (starting from {})", reply.len(), reply.starting_from());
        }
        Commands::LastError => {
            let (mut conn, db) = open(cli, &cfg)?;
            let last = db.last_error(&mut conn)?;
            println!("{}", serde_json::to_string_pretty(&last)?);
        }
        Commands::Profile { filter } => {
            let filter = parse_document(filter)?;
            let (mut conn, db) = open(cli, &cfg)?;
            for record in db.profiling_information(&mut conn, filter)? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        let code = match e.downcast_ref::<DbError>() {
            Some(DbError::Timeout { .. }) => 3,
            Some(DbError::Connection(_) | DbError::Io(_)) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
