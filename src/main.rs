//! Parlo relay
//!
//! Usage:
//!   parlo server                                  # both rooms on 8080 / 6969
//!   parlo server --config parlo.toml --delivery peers
//!   parlo client --username alice --password pw   # joins 127.0.0.1:8080
//!   RUST_LOG=debug parlo server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use parlo::auth::{Authenticator, FileUserStore};
use parlo::client::{run_line_mode, ChatClientConfig};
use parlo::{Delivery, Direction, RelayServer, ServerConfig, Vocab};

#[derive(Debug, Parser)]
#[command(name = "parlo", version, about = "Translating multi-room TCP chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay server
    Server(ServerArgs),
    /// Join a room in line mode
    Client(ClientArgs),
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Vocabulary file of `english,italian` lines
    #[arg(long)]
    vocab: Option<PathBuf>,
    #[arg(long)]
    en_it_addr: Option<SocketAddr>,
    #[arg(long)]
    it_en_addr: Option<SocketAddr>,
    #[arg(long)]
    en_it_capacity: Option<usize>,
    #[arg(long)]
    it_en_capacity: Option<usize>,
    /// `echo` back to the sender or relay to `peers`
    #[arg(long)]
    delivery: Option<Delivery>,
    /// Waiting clients per room
    #[arg(long)]
    queue_capacity: Option<usize>,
}

impl ServerArgs {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::load(self.config.as_deref())
            .context("failed to load server configuration")?;

        if let Some(vocab) = self.vocab {
            config.vocab_path = vocab;
        }
        if let Some(delivery) = self.delivery {
            config.delivery = delivery;
        }
        if let Some(capacity) = self.queue_capacity {
            config.waiting_queue_capacity = capacity;
        }

        let overrides = [
            (Direction::EnglishToItalian, self.en_it_addr, self.en_it_capacity),
            (Direction::ItalianToEnglish, self.it_en_addr, self.it_en_capacity),
        ];
        for (direction, addr, capacity) in overrides {
            if addr.is_none() && capacity.is_none() {
                continue;
            }
            let Some(room) = config.room_mut(direction) else {
                bail!("no {} room is configured", direction);
            };
            if let Some(addr) = addr {
                room.bind_addr = addr;
            }
            if let Some(capacity) = capacity {
                room.capacity = capacity;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Room address; 8080 is English to Italian, 6969 Italian to English
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
    /// Users file of `username,password,language` lines
    #[arg(long, default_value = "users.txt")]
    users: PathBuf,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Create the account first
    #[arg(long)]
    register: bool,
    /// Language recorded for a new account
    #[arg(long, default_value = "english")]
    language: String,
    /// Seconds of silence before leaving the room
    #[arg(long, default_value_t = 10)]
    inactivity_secs: u64,
    /// The server does not send a `PORT:<n>` line
    #[arg(long)]
    no_port_token: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;
    let vocab = Vocab::load(&config.vocab_path)
        .with_context(|| format!("failed to load vocabulary {}", config.vocab_path.display()))?;

    let server = RelayServer::bind(config, Arc::new(vocab))
        .await
        .context("failed to start relay server")?;
    info!("Press Ctrl+C to stop");

    server.run(tokio::signal::ctrl_c()).await?;
    Ok(())
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let store = FileUserStore::new(&args.users);
    let profile = if args.register {
        store.register(&args.username, &args.password, &args.language)?
    } else {
        match store.authenticate(&args.username, &args.password)? {
            Some(profile) => profile,
            None => bail!(
                "unknown user or wrong password in {} (use --register to create an account)",
                args.users.display()
            ),
        }
    };

    let mut config = ChatClientConfig::new(args.addr);
    config.expect_port_token = !args.no_port_token;
    config.inactivity_timeout = Duration::from_secs(args.inactivity_secs);

    run_line_mode(config, profile)
        .await
        .with_context(|| format!("chat session with {} failed", args.addr))?;
    Ok(())
}
