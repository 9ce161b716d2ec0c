//! Async IRC client.
//!
//! Manages the TCP (optionally TLS) connection, registration and CAP
//! negotiation, and emits [`Event`]s. Outbound lines go through a
//! [`ClientHandle`] and are queued, never written inline by callers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

use crate::event::Event;
use crate::irc::Message;

/// Capabilities requested when the server offers them.
const WANTED_CAPS: &[&str] = &["message-tags", "account-tag"];

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    pub nick: String,
    /// Username (ident).
    pub user: String,
    pub realname: String,
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "challengebot".to_string(),
            user: "challengebot".to_string(),
            realname: "CHALLENGE oper bot".to_string(),
            tls: false,
            tls_insecure: false,
        }
    }
}

/// Commands the consumer can send to the client.
#[derive(Debug)]
pub enum Command {
    Join(String),
    Privmsg { target: String, text: String },
    Raw(String),
    Quit(Option<String>),
}

/// A handle to a running IRC client connection.
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// A handle wired to an arbitrary command channel.
    pub fn from_sender(cmd_tx: mpsc::Sender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub async fn join(&self, channel: &str) -> Result<()> {
        self.cmd_tx.send(Command::Join(channel.to_string())).await?;
        Ok(())
    }

    pub async fn privmsg(&self, target: &str, text: &str) -> Result<()> {
        self.cmd_tx
            .send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn quit(&self, message: Option<&str>) -> Result<()> {
        self.cmd_tx
            .send(Command::Quit(message.map(|s| s.to_string())))
            .await?;
        Ok(())
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.cmd_tx.send(Command::Raw(line.to_string())).await?;
        Ok(())
    }
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Establish TCP (and optionally TLS) connection to the server.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    // Auto-detect TLS from port if not explicitly set
    let use_tls = config.tls || config.server_addr.ends_with(":6697");

    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .with_context(|| format!("TCP connect to {} failed", config.server_addr))?;
    tracing::info!(server = %config.server_addr, tls = use_tls, "TCP connected");

    if !use_tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let tls_config = if config.tls_insecure {
        tracing::warn!("TLS certificate verification disabled");
        rustls_insecure_config()
    } else {
        rustls_default_config()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = config
        .server_addr
        .rsplit_once(':')
        .map_or(config.server_addr.as_str(), |(host, _)| host);
    let dns_name = rustls::pki_types::ServerName::try_from(server_name.to_string())?;
    let tls_stream = connector
        .connect(dns_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", config.server_addr))?;
    tracing::info!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(Box::new(tls_stream)))
}

/// Connect using an already-established connection.
///
/// Returns a handle for sending commands and a receiver for events.
/// The IRC protocol runs in a spawned task.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    config: ConnectConfig,
) -> (ClientHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let _ = event_tx.send(Event::Connected).await;
        let result = match conn {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tokio::io::split(tcp);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(*tls);
                run_irc(BufReader::new(reader), writer, &config, event_tx.clone(), cmd_rx).await
            }
        };
        if let Err(e) = result {
            let _ = event_tx
                .send(Event::Disconnected {
                    reason: e.to_string(),
                })
                .await;
        }
    });

    (ClientHandle { cmd_tx }, event_rx)
}

/// Connect to an IRC server and run the client.
pub async fn connect(config: ConnectConfig) -> Result<(ClientHandle, mpsc::Receiver<Event>)> {
    let conn = establish_connection(&config).await?;
    Ok(connect_with_stream(conn, config))
}

fn rustls_default_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Run registration and the read/command loop until the connection ends.
pub async fn run_irc<R, W>(
    mut reader: R,
    mut writer: W,
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_message(&mut writer, &Message::new("CAP", vec!["LS", "302"])).await?;
    send_message(&mut writer, &Message::new("NICK", vec![config.nick.as_str()])).await?;
    let user = Message::new("USER", vec![config.user.as_str(), "0", "*", config.realname.as_str()]);
    send_message(&mut writer, &user).await?;

    let mut registered = false;
    let mut pending_commands: Vec<Command> = Vec::new();
    let mut line_buf: Vec<u8> = Vec::new();
    let mut last_activity = tokio::time::Instant::now();
    let ping_interval = tokio::time::Duration::from_secs(60);
    let ping_timeout = tokio::time::Duration::from_secs(120);

    loop {
        tokio::select! {
            result = reader.read_until(b'\n', &mut line_buf) => {
                let n = result?;
                if n == 0 {
                    let _ = event_tx.send(Event::Disconnected { reason: "EOF".to_string() }).await;
                    break;
                }

                last_activity = tokio::time::Instant::now();
                // Channel text may be in any encoding.
                let line = String::from_utf8_lossy(&line_buf).into_owned();
                line_buf.clear();
                let _ = event_tx.send(Event::RawLine(line.trim_end().to_string())).await;

                if let Some(msg) = Message::parse(&line) {
                    match msg.command.as_str() {
                        "CAP" => handle_cap_response(&msg, &mut writer).await?,
                        "PING" => {
                            let token = msg.param(0).unwrap_or("");
                            send_message(&mut writer, &Message::new("PONG", vec![token])).await?;
                        }
                        "PRIVMSG" => {
                            let from = msg.source_nick().unwrap_or("").to_string();
                            let target = msg.param(0).unwrap_or("").to_string();
                            let text = msg.param(1).unwrap_or("").to_string();
                            let _ = event_tx.send(Event::Message { from, target, text, tags: msg.tags.clone() }).await;
                        }
                        "NOTICE" => {
                            let text = msg.params.last().cloned().unwrap_or_default();
                            let _ = event_tx.send(Event::ServerNotice { text }).await;
                        }
                        "ERROR" => {
                            let reason = msg.params.last().cloned().unwrap_or_default();
                            let _ = event_tx.send(Event::Disconnected { reason }).await;
                            break;
                        }
                        "001" => {
                            let nick = msg.param(0).unwrap_or_default().to_string();
                            registered = true;
                            let _ = event_tx.send(Event::Registered { nick }).await;
                            // Flush any commands that were queued before registration
                            for cmd in pending_commands.drain(..) {
                                execute_command(&mut writer, cmd).await?;
                            }
                            let _ = event_tx.send(Event::Numeric(msg)).await;
                        }
                        _ if msg.is_numeric() => {
                            let _ = event_tx.send(Event::Numeric(msg)).await;
                        }
                        _ => {}
                    }
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                if registered || matches!(cmd, Command::Quit(_)) {
                    let quitting = matches!(cmd, Command::Quit(_));
                    execute_command(&mut writer, cmd).await?;
                    if quitting && !registered {
                        break;
                    }
                } else {
                    pending_commands.push(cmd);
                }
            }
            _ = tokio::time::sleep_until(last_activity + ping_interval) => {
                if last_activity.elapsed() > ping_timeout {
                    let _ = event_tx.send(Event::Disconnected { reason: "Ping timeout".to_string() }).await;
                    break;
                }
                writer.write_all(b"PING :keepalive\r\n").await?;
            }
        }
    }

    Ok(())
}

/// Execute a single IRC command on the wire.
async fn execute_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> Result<()> {
    let msg = match cmd {
        Command::Join(channel) => Message::new("JOIN", vec![channel.as_str()]),
        Command::Privmsg { target, text } => Message::new("PRIVMSG", vec![target.as_str(), text.as_str()]),
        Command::Raw(line) => return write_line(writer, &line).await,
        Command::Quit(Some(m)) => Message::new("QUIT", vec![m.as_str()]),
        Command::Quit(None) => Message::new("QUIT", vec![]),
    };
    send_message(writer, &msg).await
}

async fn send_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    write_line(writer, &msg.to_string()).await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    Ok(())
}

async fn handle_cap_response<W: AsyncWrite + Unpin>(msg: &Message, writer: &mut W) -> Result<()> {
    let subcmd = msg.param(1).map(|s| s.to_ascii_uppercase());
    match subcmd.as_deref() {
        Some("LS") => {
            // Multi-line LS: "CAP * LS * :caps" — wait for the final line.
            if msg.param(2) == Some("*") {
                return Ok(());
            }
            let offered: Vec<&str> = msg
                .params
                .last()
                .map(|s| s.split_whitespace().map(|c| c.split('=').next().unwrap_or(c)).collect())
                .unwrap_or_default();
            let wanted: Vec<&str> = WANTED_CAPS
                .iter()
                .copied()
                .filter(|cap| offered.contains(cap))
                .collect();
            if wanted.is_empty() {
                writer.write_all(b"CAP END\r\n").await?;
            } else {
                writer
                    .write_all(format!("CAP REQ :{}\r\n", wanted.join(" ")).as_bytes())
                    .await?;
            }
        }
        Some("ACK") | Some("NAK") => {
            writer.write_all(b"CAP END\r\n").await?;
        }
        _ => {}
    }
    Ok(())
}
