//! Maegashira command-line entry point.
//!
//! `start` boots the proxy with settings merged from defaults, the
//! `MAEGASHIRA_*` environment and command-line flags; `check` validates a
//! routing-table file and reports the structured error list.

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::error;
use maegashira::config::settings::{load_table_file, Settings, TableFileError};
use maegashira::logs::logger;
use maegashira::middleware::pipeline::MiddlewareRegistry;
use maegashira::models::route::RoutingTable;
use std::process;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let matches = Command::new("maegashira")
        .version(maegashira::VERSION)
        .about("Dynamic HTTP reverse proxy with a hot-reloadable routing table")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("start")
                .about("Start the proxy")
                .arg(flag("hostname", "Public listener bind address"))
                .arg(flag("port", "Public listener port"))
                .arg(flag("file", "Routing-table file to load at startup"))
                .arg(
                    Arg::new("clustering")
                        .long("clustering")
                        .help("Enable the Redis-backed transaction queue")
                        .action(ArgAction::SetTrue),
                )
                .arg(flag("redis-host", "Redis host for the transaction queue"))
                .arg(flag("redis-port", "Redis port for the transaction queue"))
                .arg(flag("redis-password", "Redis password for the transaction queue"))
                .arg(
                    Arg::new("api-enabled")
                        .long("api-enabled")
                        .help("Enable the management API listener")
                        .action(ArgAction::SetTrue),
                )
                .arg(flag("api-hostname", "Management API bind address"))
                .arg(flag("api-port", "Management API port"))
                .arg(flag("api-key", "Bearer key protecting the management API")),
        )
        .subcommand(
            Command::new("check")
                .about("Validate a routing-table file")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("PATH")
                        .help("Routing-table file to validate")
                        .required(true),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("start", sub)) => start(sub).await,
        Some(("check", sub)) => check(sub),
        _ => unreachable!(),
    }
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).value_name("VALUE").help(help)
}

fn parsed_flag<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Option<T> {
    matches.get_one::<String>(name).map(|value| match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            eprintln!("invalid value for --{name}: {value}");
            process::exit(2);
        }
    })
}

async fn start(matches: &ArgMatches) -> std::io::Result<()> {
    let mut settings = Settings::from_env();

    if let Some(hostname) = matches.get_one::<String>("hostname") {
        settings.hostname = hostname.clone();
    }
    if let Some(port) = parsed_flag(matches, "port") {
        settings.port = port;
    }
    if matches.get_flag("clustering") {
        settings.clustering = true;
    }
    if let Some(host) = matches.get_one::<String>("redis-host") {
        settings.redis.host = host.clone();
    }
    if let Some(port) = parsed_flag(matches, "redis-port") {
        settings.redis.port = port;
    }
    if let Some(password) = matches.get_one::<String>("redis-password") {
        settings.redis.password = Some(password.clone());
    }
    if matches.get_flag("api-enabled") {
        settings.api.enabled = true;
    }
    if let Some(hostname) = matches.get_one::<String>("api-hostname") {
        settings.api.hostname = hostname.clone();
    }
    if let Some(port) = parsed_flag(matches, "api-port") {
        settings.api.port = port;
    }
    if let Some(key) = matches.get_one::<String>("api-key") {
        settings.api.key = key.clone();
    }

    logger::init(&settings.log_level);

    let initial_table: Option<RoutingTable> = match matches.get_one::<String>("file") {
        Some(path) => match load_table_file(path) {
            Ok(table) => Some(table),
            Err(TableFileError::Invalid { path, issues }) => {
                error!("routing table {path} is invalid:");
                for issue in issues {
                    error!("  - {}", describe(&issue));
                }
                process::exit(1);
            }
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        },
        None => None,
    };

    if let Err(e) = maegashira::server::run(settings, initial_table, MiddlewareRegistry::new()).await
    {
        error!("failed to start: {e}");
        process::exit(1);
    }
    Ok(())
}

fn check(matches: &ArgMatches) -> std::io::Result<()> {
    let path = matches
        .get_one::<String>("file")
        .expect("--file is required");

    match load_table_file(path) {
        Ok(table) => {
            println!("OK: {} route(s) valid", table.len());
            Ok(())
        }
        Err(TableFileError::Unreadable { path, source }) => {
            eprintln!("cannot read {path}: {source}");
            process::exit(2);
        }
        Err(TableFileError::Malformed { path, source }) => {
            eprintln!("{path} is not valid JSON: {source}");
            process::exit(1);
        }
        Err(TableFileError::Invalid { path, issues }) => {
            eprintln!("{path} failed validation:");
            for issue in issues {
                eprintln!("  - {}", describe(&issue));
            }
            process::exit(1);
        }
    }
}

fn describe(issue: &maegashira::config::validation::TableIssue) -> String {
    match (issue.entry, issue.field.is_empty()) {
        (Some(entry), false) => format!("route {}: {}: {}", entry, issue.field, issue.message),
        (Some(entry), true) => format!("route {}: {}", entry, issue.message),
        (None, false) => format!("{}: {}", issue.field, issue.message),
        (None, true) => issue.message.clone(),
    }
}
