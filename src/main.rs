//! groupmebot CLI
//!
//! Command-line interface for running the bot:
//! - Run the bot and log what it sees
//! - Create a bot in a group
//! - Post through an existing bot
//! - Generate a config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use groupmebot::config::generate_default_config;
use groupmebot::{Actuator, Bot, BotEvent, Config, GroupMeClient, GroupMeConfig, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "groupmebot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GroupMe bot over the Faye push service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect and follow the configured streams
    Run {
        /// Post every received message back into its group
        #[arg(long)]
        echo: bool,
    },

    /// Create a bot in a group and print its id
    CreateBot {
        /// Group id
        #[arg(short, long)]
        group: String,
        /// Bot name (default: bot.bot_name from the config)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Post a message through a bot
    Post {
        /// Bot id
        #[arg(short, long)]
        bot_id: String,
        /// Message text
        text: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Run { echo } => run(&config, echo).await?,
        Commands::CreateBot { group, name } => {
            let client = client(&config)?;
            let name = name.unwrap_or_else(|| config.bot.bot_name.clone());
            let bot_id = client.create_bot(&name, &group).await?;
            println!("{}", bot_id);
        }
        Commands::Post { bot_id, text } => {
            client(&config)?.post_message(&bot_id, &text).await?;
            tracing::info!(bot_id = %bot_id, "Message posted");
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run(config: &Config, echo: bool) -> anyhow::Result<()> {
    config.validate()?;
    tracing::info!("groupmebot v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        user_id = %config.bot.user_id,
        groups = ?config.bot.groups,
        "Starting bot"
    );

    let bot = Bot::from_config(config)?;
    let mut events = bot.subscribe();
    bot.connect().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event receiver lagged");
                        continue;
                    }
                    Err(_) => break,
                };

                match event {
                    BotEvent::Connected => tracing::info!("Streams live"),
                    BotEvent::BotCreated(created) => tracing::info!(
                        group_id = %created.group_id,
                        bot_id = %created.bot_id,
                        "Bot ready"
                    ),
                    BotEvent::Message(subject) => {
                        tracing::info!(
                            group_id = ?subject.group_id(),
                            from = ?subject.name(),
                            text = %subject.text(),
                            "Message"
                        );
                        if echo && !subject.is_from_bot() {
                            if let Some(group_id) = subject.group_id() {
                                bot.post_message(subject.text(), Some(group_id)).await;
                            }
                        }
                    }
                    BotEvent::Disconnected { reason } => {
                        tracing::warn!(reason = ?reason, "Disconnected");
                        break;
                    }
                    BotEvent::ConnectFailed { error } => {
                        anyhow::bail!("connection failed: {}", error);
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                bot.disconnect().await;
                break;
            }
        }
    }

    Ok(())
}

fn client(config: &Config) -> anyhow::Result<GroupMeClient> {
    config.validate_token()?;
    Ok(GroupMeClient::new(GroupMeConfig::from_config(config))?)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("groupmebot={}", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
