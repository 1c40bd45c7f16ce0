use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use yourapp_client::api::SessionSummary;
use yourapp_client::auth::KeyringTokenStore;
use yourapp_client::chat::{ChannelHandlers, ChannelState, Payload, PayloadChannel, SessionRef};
use yourapp_client::navigation::LogNavigator;
use yourapp_client::settings;
use yourapp_client::time::format_local;
use yourapp_client::ClientContext;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "yourapp-chat")]
#[command(about = "Terminal client for YourApp chat sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an access token in the OS keychain
    Login {
        #[arg(long)]
        token: String,
    },

    /// Remove the stored access token
    Logout,

    /// List sessions, most recently active first
    Sessions,

    /// Chat in a session; use "new" to start one
    Chat {
        #[arg(long, default_value = "new")]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    yourapp_client::init_logging();

    let cli = Cli::parse();
    let settings = settings::resolve_settings()?;
    let ctx = ClientContext::new(
        settings,
        Arc::new(KeyringTokenStore::default()),
        Arc::new(LogNavigator),
        None,
    );

    match cli.command {
        Command::Login { token } => {
            ctx.login(&token)?;
            println!("Token stored");
            Ok(())
        }
        Command::Logout => {
            ctx.logout();
            println!("Token removed");
            Ok(())
        }
        Command::Sessions => list_sessions(&ctx).await,
        Command::Chat { session } => {
            let session = SessionRef::parse(&session)
                .ok_or_else(|| anyhow!("Invalid session id: {}", session))?;
            chat(&ctx, session).await
        }
    }
}

async fn list_sessions(ctx: &ClientContext) -> Result<()> {
    for session in fetch_sessions(ctx).await? {
        println!(
            "{:>6}  {:<32}  {}",
            session.id,
            session.title.as_deref().unwrap_or("(untitled)"),
            format_local(session.last_activity_at)
        );
    }
    Ok(())
}

/// One sorted listing request with the stored token.
async fn fetch_sessions(ctx: &ClientContext) -> Result<Vec<SessionSummary>> {
    ctx.mount();

    let Some(token) = ctx.access_token().get() else {
        return Err(anyhow!("Not logged in, run `yourapp-chat login --token <token>`"));
    };

    Ok(ctx.api().list_sessions(&token).await?)
}

async fn chat(ctx: &ClientContext, session: SessionRef) -> Result<()> {
    let handlers = ChannelHandlers::new()
        .on_session_created(|id| println!("[session {} created]", id))
        .on_payload(|payload| match Payload::from_json(payload) {
            Some(Payload::Message { message }) => println!("{}", message),
            Some(Payload::Dict { data }) => println!("{}", data),
            Some(Payload::TextFile { file }) => println!("[file {} ({})]", file.name, file.mime_type),
            Some(Payload::State { state: ChannelState::Opened }) => println!("> "),
            _ => {}
        });

    let channel = ctx.payloads(session, handlers);
    ctx.mount();

    if ctx.access_token().get().is_none() {
        return Err(anyhow!("Not logged in, run `yourapp-chat login --token <token>`"));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let done = wait_until_done(&channel);
    tokio::pin!(done);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !channel.send(&Payload::message(line))? {
                    println!("[waiting for the assistant]");
                }
            }
            _ = &mut done => {
                break;
            }
        }
    }

    channel.disconnect();
    Ok(())
}

/// Resolves once the exchange ended or the server dropped the socket.
async fn wait_until_done(channel: &PayloadChannel) {
    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while channel.connected_url().is_none() && !channel.is_finished() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await;
    if connected.is_err() {
        eprintln!("[could not connect]");
        return;
    }

    while !channel.is_finished() && channel.connected_url().is_some() {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    if !channel.is_finished() {
        eprintln!("[connection closed by the server]");
    }
}
