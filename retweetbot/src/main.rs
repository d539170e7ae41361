use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use retweetbot::config::{BotConfig, DEFAULT_REDIS_URL, StoreKind, cooldown_from_minutes};
use retweetbot::keys::DEFAULT_NAMESPACE;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "retweetbot",
    version,
    about = "Retweet a hashtag and answer mention commands",
    long_about = "A Twitter bot that retweets every tweet carrying a hashtag, answers \
                  `register` and `search` mentions, and backs off when rate limited"
)]
struct Cli {
    /// Hashtag to track (with or without #)
    #[arg(long, env = "RETWEETBOT_HASHTAG", global = true)]
    hashtag: Option<String>,

    /// Screen name of the bot account (with or without @)
    #[arg(long, env = "RETWEETBOT_BOT_NAME", global = true)]
    bot_name: Option<String>,

    /// Key-value store backend
    #[arg(long, value_enum, env = "RETWEETBOT_STORE", default_value = "redis", global = true)]
    store: StoreKind,

    /// Redis connection URL
    #[arg(long, env = "RETWEETBOT_REDIS_URL", default_value = DEFAULT_REDIS_URL, global = true)]
    redis_url: String,

    /// Directory holding registration records
    #[arg(
        short,
        long = "data-dir",
        env = "RETWEETBOT_DATA_DIR",
        default_value = "./registrations",
        global = true
    )]
    data_dir: PathBuf,

    /// Prefix of every key the bot writes
    #[arg(long, env = "RETWEETBOT_KEY_NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    key_namespace: String,

    /// Minutes write calls stay suspended after a rate limit
    #[arg(long, env = "RETWEETBOT_COOLDOWN_MINUTES", default_value = "15", global = true)]
    cooldown_minutes: u64,

    /// Seconds between retry sweeps
    #[arg(long, env = "RETWEETBOT_SWEEP_INTERVAL", default_value = "30", global = true)]
    sweep_interval: u64,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream the hashtag, retweet matches and answer mentions until Ctrl+C
    Run,

    /// Retry rate-limited retweets once and exit
    Sweep,

    /// Show the cooldown state and queued retries
    Status,

    /// List stored registrations
    Registrations {
        /// Only show records waiting for review
        #[arg(long)]
        pending: bool,
    },

    /// Approve or reject a registration
    Review {
        /// Twitter user id of the registration
        #[arg(required = true)]
        user_id: String,

        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,

        #[arg(long)]
        reject: bool,
    },
}

impl Cli {
    fn bot_config(&self) -> BotConfig {
        BotConfig {
            hashtag: self.hashtag.clone().unwrap_or_default(),
            bot_name: self.bot_name.clone().unwrap_or_default(),
            store: self.store,
            redis_url: self.redis_url.clone(),
            data_dir: self.data_dir.clone(),
            key_namespace: self.key_namespace.clone(),
            cooldown: cooldown_from_minutes(self.cooldown_minutes),
            sweep_interval: Duration::from_secs(self.sweep_interval.max(1)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args = Cli::parse();

    if args.verbose {
        debug!("Verbose mode enabled");
    }

    let config = args.bot_config();

    match args.command {
        Commands::Run => {
            args.hashtag.as_deref().filter(|h| !h.is_empty()).context(
                "Hashtag not specified. Please set --hashtag or RETWEETBOT_HASHTAG environment variable",
            )?;
            args.bot_name.as_deref().filter(|b| !b.is_empty()).context(
                "Bot name not specified. Please set --bot-name or RETWEETBOT_BOT_NAME environment variable",
            )?;
            commands::run::execute(config).await?
        }
        Commands::Sweep => commands::sweep::execute(config).await?,
        Commands::Status => commands::status::execute(config).await?,
        Commands::Registrations { pending } => {
            commands::registrations::execute(&config, pending).await?
        }
        Commands::Review {
            user_id,
            approve,
            reject: _,
        } => commands::review::execute(&config, &user_id, approve).await?,
    }

    Ok(())
}
