use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::prelude::*;

use directline::{Activity, ChannelObserver, Session, SessionEvent};

mod config;

use config::{ChatConfig, DEFAULT_CONFIG_FILE, Overrides, load_config};

#[derive(Parser)]
#[command(name = "directline-chat")]
#[command(about = "Chat with a Bot Framework bot over Direct Line")]
struct Args {
    /// Direct Line secret (overrides config file and environment)
    #[arg(short, long)]
    secret: Option<String>,

    /// Name your messages are sent under
    #[arg(short, long)]
    name: Option<String>,

    /// Direct Line endpoint base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Message sent as soon as the conversation is open
    #[arg(short, long)]
    greeting: Option<String>,

    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Show every activity of a frame, not only the first
    #[arg(long)]
    all_activities: bool,

    /// Enable verbose protocol logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "directline=debug,directline_chat=debug"
    } else {
        "directline=info,directline_chat=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let mut config: ChatConfig = load_config(&args.config)
        .extract()
        .context("Failed to load configuration")?;
    config.apply_overrides(Overrides {
        secret: args.secret,
        name: args.name,
        endpoint: args.endpoint,
        greeting: args.greeting,
        debug: args.debug,
        all_activities: args.all_activities,
    });
    if config.session.secret.is_empty() {
        anyhow::bail!(
            "No Direct Line secret configured. Pass --secret, set DIRECTLINE_SESSION__SECRET, or add it to {}.",
            args.config.display()
        );
    }
    debug!(session = ?config.session, "configuration loaded");

    let session =
        Session::with_config(config.session).context("Failed to create Direct Line session")?;
    chat(&session, config.greeting).await
}

/// Run the conversation until the stream closes or the user quits.
async fn chat(session: &Session, greeting: Option<String>) -> Result<()> {
    let (observer, mut events) = ChannelObserver::new();
    session.start(Arc::new(observer))?;
    info!("connecting to bot");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut started = false;
    let mut stopping = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Started) => {
                    started = true;
                    eprintln!("[chat: connected -- type a message, /quit to leave]");
                    if let Some(text) = greeting.as_deref() {
                        session.send(text)?;
                        print_own(&session.display_name(), text);
                    }
                }
                Some(SessionEvent::Message(activity)) => print_activity(session, &activity),
                Some(SessionEvent::Error(err)) => {
                    error!("{err}");
                    if !started {
                        anyhow::bail!("could not start the conversation: {err}");
                    }
                }
                Some(SessionEvent::Closed) | None => break,
            },

            line = stdin.next_line(), if stdin_open && !stopping => match line? {
                Some(line) if line.trim() == "/quit" => {
                    stopping = true;
                    session.stop();
                }
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(err) = session.send(line.as_str()) {
                        eprintln!("[chat: {err}]");
                    }
                }
                None => {
                    stdin_open = false;
                    stopping = true;
                    session.stop();
                }
            },

            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                session.stop();
            }
        }

        // stop() before the stream opened produces no close notification
        if stopping && !started {
            break;
        }
    }

    eprintln!("[chat: closed]");
    Ok(())
}

fn print_activity(session: &Session, activity: &Activity) {
    // the bot echoes our own messages back on the stream
    if activity.from.label() == session.display_name() {
        return;
    }
    if !activity.is_message() || activity.text.is_empty() {
        debug!(kind = %activity.kind, "skipping non-text activity");
        return;
    }
    println!("{}: {}", activity.from.label(), activity.text);
}

fn print_own(name: &str, text: &str) {
    println!("{name}: {text}");
}
