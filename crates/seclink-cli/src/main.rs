//! seclink CLI: serve, send to, and provision TLS channel endpoints.

mod config;
mod setup;

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use seclink_protocol::{
    BincodeWireProtocol, ChannelEvent, ConnectionListener, SecureChannel,
};
use seclink_types::{Endpoint, Message, MessageBody};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;

type Protocol = BincodeWireProtocol<Message>;

#[derive(Parser)]
#[command(
    name = "seclink",
    about = "Secure TLS channels over TCP",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept connections and echo every message back until Ctrl-C.
    Serve,

    /// Send a text message and print the reply.
    Send {
        text: String,

        /// Server endpoint (address:port). Defaults to the configured one.
        #[arg(short, long)]
        address: Option<Endpoint>,
    },

    /// Generate a self-signed TLS certificate for this machine.
    GenerateCert {
        /// Output directory for certificate files.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Host name to issue the certificate for.
        #[arg(long)]
        hostname: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, loaded_from) = setup::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();
    match &loaded_from {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("no config file found, using defaults"),
    }

    match cli.command {
        Commands::Serve => serve(&config).await,
        Commands::Send { text, address } => {
            let endpoint = address.unwrap_or(config.client.address);
            send(&config, endpoint, text).await
        }
        Commands::GenerateCert { output, hostname } => {
            let hostname = hostname.unwrap_or_else(setup::local_hostname);
            info!(hostname = %hostname, output = %output.display(), "generating TLS certificate");

            let cert = seclink_certgen::generate_certificate(&hostname)?;
            let (cert_path, key_path) = cert.write_to(&output, "seclink")?;

            println!("Certificate: {}", cert_path.display());
            println!("Private key: {}", key_path.display());
            println!("Fingerprint: {}", cert.fingerprint);
            Ok(())
        }
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let identity = setup::load_or_generate_identity(&config.server, &setup::config_dir())?;
    let (tx, mut channels) = mpsc::unbounded_channel();
    let listener = ConnectionListener::new(config.server.endpoint(), identity, Protocol::new(), tx)?
        .with_options(config.server.listener_options());
    listener.start().await?;
    info!(addr = ?listener.local_addr(), "serving, press Ctrl-C to stop");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            Some(channel) = channels.recv() => echo(channel),
        }
    }

    info!("shutting down");
    listener.stop().await;
    Ok(())
}

/// Answer every message on `channel` until it disconnects.
fn echo(channel: SecureChannel<Protocol>) {
    let remote = channel.remote_endpoint();
    let (tx, mut events) = mpsc::unbounded_channel();
    if let Err(e) = channel.start(tx) {
        warn!(remote = %remote, error = %e, "failed to start channel");
        return;
    }
    info!(remote = %remote, "client connected");

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::MessageReceived(message) => {
                    info!(remote = %remote, body = %message.body, "received");
                    if let Err(e) = channel.send(&reply_for(&message)).await {
                        warn!(remote = %remote, error = %e, "reply failed");
                    }
                }
                ChannelEvent::MessageSent(_) => {}
                ChannelEvent::Disconnected => {
                    info!(remote = %remote, "client disconnected");
                    break;
                }
            }
        }
    });
}

fn reply_for(message: &Message) -> Message {
    let body = match &message.body {
        MessageBody::Ping => MessageBody::Ping,
        MessageBody::Text(text) => MessageBody::Text(text.clone()),
        MessageBody::RawData(data) => MessageBody::RawData(data.clone()),
    };
    Message::reply_to(message, body)
}

async fn send(config: &Config, endpoint: Endpoint, text: String) -> anyhow::Result<()> {
    let connector = setup::connector(&config.client, endpoint)?;
    let channel = connector.connect(Protocol::new()).await?;
    let (tx, mut events) = mpsc::unbounded_channel();
    channel.start(tx)?;

    let request = Message::text(text);
    channel.send(&request).await?;

    let timeout = config.client.reply_timeout();
    let reply = tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::MessageReceived(message)
                    if message.replied_id == Some(request.id) =>
                {
                    return Some(message);
                }
                ChannelEvent::Disconnected => return None,
                _ => {}
            }
        }
        None
    })
    .await;
    channel.disconnect().await;

    match reply {
        Ok(Some(message)) => {
            match message.body {
                MessageBody::Text(text) => println!("{text}"),
                other => println!("{other}"),
            }
            Ok(())
        }
        Ok(None) => bail!("server closed the connection before replying"),
        Err(_) => bail!("no reply within {timeout:?}"),
    }
}
