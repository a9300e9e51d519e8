use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use meshinvite_core::config::Config;
use meshinvite_core::core_invite::{InvitationIssuer, InvitationResponder, InvitationUrl, NoDaemon};
use meshinvite_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use meshinvite_core::prompt::{NonInteractive, Prompter, StdinPrompter};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "meshinvite")]
#[command(author, version, about = "Invite nodes into a mesh network and join one", long_about = None)]
struct Args {
    /// TOML configuration file (defaults to MESHINVITE_* environment variables)
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Use this configuration root directly
    #[arg(short = 'c', long)]
    confbase: Option<PathBuf>,

    /// Network namespace below the configuration directory
    #[arg(short = 'n', long)]
    netname: Option<String>,

    /// Never prompt; fail where a question would be asked
    #[arg(long)]
    batch: bool,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an invitation for a new node and print its URL
    Invite {
        /// Name of the node to invite
        name: String,
    },
    /// Redeem an invitation URL
    Join {
        /// Invitation URL; asked for when omitted
        url: Option<String>,
    },
    /// Answer joiners redeeming our invitations
    Serve {
        /// Address to listen on
        #[arg(long)]
        listen: Option<String>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config_file {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::from_env()?,
    };

    if let Some(confbase) = &args.confbase {
        config.paths.confbase = Some(confbase.clone());
    }
    if let Some(netname) = &args.netname {
        config.paths.netname = Some(netname.clone());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    // A configured `interactive = true` allows answers piped on stdin.
    config.interactive = !args.batch && (config.interactive || std::io::stdin().is_terminal());

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_level: LogLevel = config.logging.level.parse()?;
    init_logging_with_config(LogConfig::new(log_level).json_format(config.logging.json_format))?;

    let mut prompter: Box<dyn Prompter> = if config.interactive {
        Box::new(StdinPrompter::new())
    } else {
        Box::new(NonInteractive)
    };

    match args.command {
        Command::Invite { name } => {
            let invitation = InvitationIssuer::new(&config, &NoDaemon, prompter.as_mut()).invite(&name).await?;
            println!("{}", invitation.url);
        }
        Command::Join { url } => {
            let text = match url {
                Some(text) => text,
                None => match prompter.prompt("Enter invitation URL: ").await? {
                    Some(text) if !text.trim().is_empty() => text,
                    _ => bail!("no invitation URL given"),
                },
            };

            let url = InvitationUrl::parse(&text)?;
            let provisioned = meshinvite_core::join(&url, &config, prompter.as_mut()).await?;
            info!(
                name = %provisioned.name,
                confbase = %provisioned.paths.confbase().display(),
                "Configuration written"
            );
        }
        Command::Serve { listen } => {
            let responder = Arc::new(InvitationResponder::new(&config)?);
            let addr = listen.unwrap_or_else(|| config.network.listen_address.clone());
            let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {}", addr))?;

            tokio::select! {
                result = responder.run(listener) => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }
        }
    }

    Ok(())
}
