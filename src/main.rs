//! carbn -- command-line driver for the CarBN client data layer.
//!
//! Wires configuration, logging and the shared services, restores any stored
//! session, then runs one subcommand.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use carbn_client::AppServices;
use carbn_client::auth::SignInProvider;
use carbn_client::config::Config;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Status,
    Config,
    SignIn {
        provider: SignInProvider,
        id_token: String,
        display_name: String,
    },
    Logout,
    Get { endpoint: String },
    User { id: i64 },
    Image { path: String },
    CacheClear,
}

#[derive(Debug)]
struct CliArgs {
    config_path: PathBuf,
    command: Command,
}

fn parse_args() -> CliArgs {
    match parse_from(std::env::args().skip(1)) {
        Ok(Some(cli)) => cli,
        Ok(None) => std::process::exit(0),
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Run with --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// `Ok(None)` means help or version was printed.
fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Option<CliArgs>, String> {
    let mut args = args.into_iter();
    let mut config_path = PathBuf::from("carbn.toml");
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config requires a path argument".to_string())?;
                config_path = PathBuf::from(path);
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("carbn {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            flag if flag.starts_with('-') && positional.is_empty() => {
                return Err(format!("Unknown argument: {flag}"));
            }
            _ => positional.push(arg),
        }
    }

    let command = parse_command(&positional)?;
    Ok(Some(CliArgs {
        config_path,
        command,
    }))
}

fn parse_command(words: &[String]) -> Result<Command, String> {
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        [] | ["status"] => Ok(Command::Status),
        ["config"] => Ok(Command::Config),
        ["sign-in", provider, id_token, display_name @ ..] if !display_name.is_empty() => {
            Ok(Command::SignIn {
                provider: provider.parse()?,
                id_token: id_token.to_string(),
                display_name: display_name.join(" "),
            })
        }
        ["logout"] => Ok(Command::Logout),
        ["get", endpoint] => Ok(Command::Get {
            endpoint: endpoint.to_string(),
        }),
        ["user", id] => Ok(Command::User {
            id: id.parse().map_err(|_| format!("invalid user id '{id}'"))?,
        }),
        ["user"] => Ok(Command::User { id: -1 }),
        ["image", path] => Ok(Command::Image {
            path: path.to_string(),
        }),
        ["cache-clear"] => Ok(Command::CacheClear),
        [name, ..] => Err(format!("Unknown or incomplete command: {name}")),
    }
}

fn print_usage() {
    println!(
        "\
carbn {version} -- CarBN client data layer

USAGE:
    carbn [OPTIONS] [COMMAND]

COMMANDS:
    status                                   Show session and cache state [default]
    config                                   Print effective settings
    sign-in <google|apple> <ID_TOKEN> <NAME>  Exchange a provider ID token for a session
    logout                                   End the session and clear caches
    get <ENDPOINT>                           GET an endpoint and print the JSON
    user [ID]                                Show a user's details (default: you)
    image <PATH>                             Fetch an image through the cache
    cache-clear                              Empty the image cache

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: carbn.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    CARBN_CONFIG           Alternative to --config flag
    CARBN_*                Override individual settings (see `carbn config`)
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = parse_args();

    let config_path = std::env::var("CARBN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);
    let config = Config::load(&config_path)?;

    init_tracing(&config);
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting carbn"
    );

    if cli.command == Command::Config {
        print_settings(&config);
        return Ok(());
    }

    let services = AppServices::from_config(&config)?;
    let restored = services.auth.restore_session().await;
    tracing::debug!(restored, "Session restore finished");

    run(&services, cli.command).await
}

async fn run(services: &AppServices, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status => {
            let stats = services.images.stats();
            println!("base_url:       {}", services.config.api.base_url);
            println!("session:        {:?}", services.session.state());
            println!("authenticated:  {}", services.session.is_authenticated());
            println!("image cache:    {}", services.config.cache.dir.display());
            println!(
                "cache stats:    {} memory hits, {} disk hits, {} misses",
                stats.hits_memory, stats.hits_disk, stats.misses
            );
        }
        Command::Config => print_settings(&services.config),
        Command::SignIn {
            provider,
            id_token,
            display_name,
        } => {
            services
                .auth
                .sign_in(provider, &id_token, &display_name)
                .await?;
            println!("Signed in with {provider}");
        }
        Command::Logout => {
            services.auth.logout().await;
            println!("Logged out");
        }
        Command::Get { endpoint } => {
            let value: serde_json::Value = services.api.get(&endpoint).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::User { id } => {
            let profile = if id == -1 {
                services.directory.current_user().await?
            } else {
                services.directory.user(id).await?
            };
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Image { path } => {
            let bytes = services.image_loader.load(&path).await?;
            println!("{} bytes", bytes.len());
        }
        Command::CacheClear => {
            services.images.clear().await;
            println!("Image cache cleared");
        }
    }
    Ok(())
}

fn print_settings(config: &Config) {
    for (key, value, env_var) in config.settings_report() {
        match env_var {
            Some(var) => println!("{key} = {value}    (from {var})"),
            None => println!("{key} = {value}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("carbn_client={level},carbn={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
