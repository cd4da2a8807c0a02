//! `chaind` entry point: CLI parsing, config loading, and the top-level
//! `start`/`install` subcommands. Grounded on `cmd/chaind/cmd/{root,start,
//! install}.go`; the `argh` subcommand shape mirrors `web3_proxy`'s own CLI
//! (`argh::FromArgs` derive, no clap).

mod app;
mod audit;
mod cache;
mod config;
mod errors;
mod eth_store;
mod jsonrpc;
mod logging;
mod metrics;
mod router;
mod selector;
mod warmer;
mod watcher;

use std::io::Write;
use std::path::{Path, PathBuf};

use argh::FromArgs;

use crate::config::{Config, DEFAULT_CONFIG_FILE, DEFAULT_HOME};

#[derive(FromArgs)]
/// a daemon that proxies and logs requests to blockchain nodes
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Start(StartArgs),
    Install(InstallArgs),
}

#[derive(FromArgs)]
/// starts chaind
#[argh(subcommand, name = "start")]
struct StartArgs {
    /// chaind home directory
    #[argh(option)]
    home: Option<String>,
}

#[derive(FromArgs)]
/// installs chaind
#[argh(subcommand, name = "install")]
struct InstallArgs {
    /// chaind home directory
    #[argh(option)]
    home: Option<String>,
}

fn resolve_home(raw: Option<String>) -> anyhow::Result<PathBuf> {
    let raw = raw.unwrap_or_else(|| DEFAULT_HOME.to_string());
    Ok(config::expand_home(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli: Cli = argh::from_env();

    let exit_code = match cli.command {
        Command::Start(args) => run_start(args).await,
        Command::Install(args) => run_install(args),
    };

    match exit_code {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

async fn run_start(args: StartArgs) -> anyhow::Result<()> {
    let home = resolve_home(args.home)?;
    let config = Config::read(&home)?;
    config.validate()?;

    logging::init(&config.log_level);

    let (app, http_watch) = app::App::spawn(config).await?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
        result = http_watch => {
            if let Ok(Err(err)) = result {
                tracing::error!(%err, "http server exited unexpectedly");
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

/// Interactive wizard, grounded on `cmd/chaind/cmd/install.go`'s `install`
/// function: prompts for home dir, TLS, cert path, and ETH path, then
/// writes a fresh `chaind.toml`.
fn run_install(args: InstallArgs) -> anyhow::Result<()> {
    println!("Welcome to the chaind interactive installer.");

    let default_home = args.home.unwrap_or_else(|| DEFAULT_HOME.to_string());
    let home = prompt(
        "Where do you want to store your chaind configuration files and database?",
        &default_home,
        &[],
    )?;
    let use_tls_str = prompt(
        "Do you want to encrypt RPC calls using TLS?",
        "no",
        &["yes", "no"],
    )?;
    let use_tls = use_tls_str == "yes";
    let cert_path = if use_tls {
        prompt("Where can chaind find your certificate file?", "", &[])?
    } else {
        String::new()
    };
    let eth_path = prompt(
        "At what path should chaind serve Ethereum JSON-RPC requests?",
        "eth",
        &[],
    )?;

    let home_dir = config::expand_home(&home)?;

    print!("Creating home directory...");
    std::io::stdout().flush().ok();
    std::fs::create_dir_all(&home_dir)?;
    println!(" Done.");

    print!("Writing config file...");
    std::io::stdout().flush().ok();
    write_fresh_config(&home_dir, &home, use_tls, &cert_path, &eth_path)?;
    println!(" Done.");

    println!("You're all set! To start your node run chaind start --home {home}.");
    Ok(())
}

fn write_fresh_config(
    home_dir: &Path,
    home: &str,
    use_tls: bool,
    cert_path: &str,
    eth_path: &str,
) -> anyhow::Result<()> {
    let toml = format!(
        "home = \"{home}\"\n\
         use_tls = {use_tls}\n\
         cert_path = \"{cert_path}\"\n\
         enable_prometheus = false\n\
         rpc_port = 8080\n\
         log_level = \"info\"\n\n\
         [eth]\n\
         apis = [\"eth\", \"net\", \"web3\"]\n\
         path = \"{eth_path}\"\n\n\
         [redis]\n\
         url = \"127.0.0.1:6379\"\n\
         password = \"\"\n\
         db = 0\n"
    );
    std::fs::write(home_dir.join(DEFAULT_CONFIG_FILE), toml)?;
    Ok(())
}

/// Reads a line from stdin, falling back to `default` on empty input and
/// re-prompting until the answer is one of `choices` (an empty slice means
/// any non-empty answer is accepted). Mirrors `install.go`'s recursive
/// `prompt` helper.
fn prompt(text: &str, default: &str, choices: &[&str]) -> anyhow::Result<String> {
    loop {
        if default.is_empty() {
            print!("{text}");
        } else if choices.is_empty() {
            print!("{text} [{default}]: ");
        } else {
            print!("{text} [{}] (default {default}): ", choices.join("/"));
        }
        std::io::stdout().flush().ok();

        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        let answer = line.trim();
        let answer = if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        };

        if choices.is_empty() || choices.contains(&answer.as_str()) {
            return Ok(answer);
        }
        println!("Invalid choice, please try again");
    }
}
