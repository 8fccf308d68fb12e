//! Inbound SMTP listener.
//!
//! Plaintext only, no AUTH. Supports HELO/EHLO, MAIL FROM, RCPT TO, DATA,
//! RSET, NOOP, VRFY, QUIT. Recipients are checked against the domain
//! allow-list at `RCPT TO`; accepted messages are parsed once and stored once
//! per recipient.

pub mod data;
pub mod delivery;

use crate::{
    app::AppState,
    recipient::normalize_address,
    smtp::{
        data::{DataBuffer, DataEvent},
        delivery::{DeliveryOutcome, deliver},
    },
};
use std::time::Duration;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::watch,
    time::timeout,
};
use tracing::{debug, info, warn};

/// RFC 5321 command line limit, CRLF included.
const MAX_COMMAND_LINE: usize = 1000;
/// Largest piece of a DATA line read in one go.
const MAX_DATA_CHUNK: usize = 64 * 1024;
const MAX_RECIPIENTS: usize = 100;
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const TOO_BIG: &str = "552 5.3.4 Message size exceeds fixed maximum message size";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Accept connections on `listener` until `shutdown` flips, one task per session.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    info!("smtp listener: {}", listener.local_addr()?);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("smtp accept error: {e}");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    debug!("smtp connection from {peer}");
                    if let Err(e) = handle_client(state, stream).await {
                        warn!("smtp connection error from {}: {}", peer, e);
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("smtp listener shutting down");
                return Ok(());
            }
        }
    }
}

/// Per-connection transaction state.
#[derive(Debug, Default)]
struct Envelope {
    mail_from: Option<String>,
    recipients: Vec<String>,
}

impl Envelope {
    fn reset(&mut self) {
        self.mail_from = None;
        self.recipients.clear();
    }
}

enum Line {
    Read,
    TooLong,
    Eof,
}

async fn handle_client(state: AppState, stream: TcpStream) -> Result<(), BoxError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let hostname = state.config.hostname.clone();
    let max_size = state.config.max_email_size;

    reply(&mut writer, &format!("220 {hostname} ESMTP tempinbox ready")).await?;

    let mut envelope = Envelope::default();
    let mut buf = Vec::with_capacity(256);

    loop {
        let read = read_limited(&mut reader, &mut buf, MAX_COMMAND_LINE);
        let line = match timeout(IDLE_TIMEOUT, read).await {
            Ok(line) => line?,
            Err(_) => {
                reply(&mut writer, "421 4.4.2 Idle timeout, closing connection").await?;
                break;
            }
        };
        match line {
            Line::Eof => break,
            Line::TooLong => {
                skip_rest_of_line(&mut reader, &mut buf).await?;
                reply(&mut writer, "500 5.5.2 Line too long").await?;
                continue;
            }
            Line::Read => {}
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        let line = text.trim_end_matches(['\r', '\n']);
        debug!("smtp <= {}", line);
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.trim()),
            None => (line.to_ascii_uppercase(), ""),
        };

        match verb.as_str() {
            "EHLO" => {
                reply(&mut writer, &format!("250-{hostname}")).await?;
                reply(&mut writer, &format!("250-SIZE {max_size}")).await?;
                reply(&mut writer, "250-8BITMIME").await?;
                reply(&mut writer, "250 PIPELINING").await?;
                envelope.reset();
            }
            "HELO" => {
                reply(&mut writer, &format!("250 {hostname}")).await?;
                envelope.reset();
            }
            "MAIL" => {
                let Some(rest) = strip_keyword(arg, "FROM:") else {
                    reply(&mut writer, "501 5.5.4 Syntax: MAIL FROM:<address>").await?;
                    continue;
                };
                if envelope.mail_from.is_some() {
                    reply(&mut writer, "503 5.5.1 Sender already specified").await?;
                    continue;
                }
                let Some((from, params)) = parse_path(rest) else {
                    reply(&mut writer, "501 5.1.7 Bad sender address syntax").await?;
                    continue;
                };
                if declared_size(params).is_some_and(|size| size > max_size) {
                    reply(&mut writer, TOO_BIG).await?;
                    continue;
                }
                envelope.mail_from = Some(from);
                reply(&mut writer, "250 2.1.0 OK").await?;
            }
            "RCPT" => {
                let Some(rest) = strip_keyword(arg, "TO:") else {
                    reply(&mut writer, "501 5.5.4 Syntax: RCPT TO:<address>").await?;
                    continue;
                };
                if envelope.mail_from.is_none() {
                    reply(&mut writer, "503 5.5.1 Need MAIL command first").await?;
                    continue;
                }
                let Some((rcpt, _)) = parse_path(rest) else {
                    reply(&mut writer, "501 5.1.3 Bad recipient address syntax").await?;
                    continue;
                };
                if !state.validator.accept(&rcpt) {
                    info!(to = %rcpt, "recipient rejected");
                    reply(
                        &mut writer,
                        &format!("550 5.1.1 <{rcpt}>: Recipient domain not accepted here"),
                    )
                    .await?;
                    continue;
                }
                let rcpt = normalize_address(&rcpt);
                if !envelope.recipients.contains(&rcpt) {
                    if envelope.recipients.len() >= MAX_RECIPIENTS {
                        reply(&mut writer, "452 4.5.3 Too many recipients").await?;
                        continue;
                    }
                    envelope.recipients.push(rcpt);
                }
                reply(&mut writer, "250 2.1.5 OK").await?;
            }
            "DATA" => {
                let Some(mail_from) = envelope.mail_from.clone() else {
                    reply(&mut writer, "503 5.5.1 Need MAIL command first").await?;
                    continue;
                };
                if envelope.recipients.is_empty() {
                    reply(&mut writer, "554 5.5.1 No valid recipients").await?;
                    continue;
                }
                reply(&mut writer, "354 End data with <CR><LF>.<CR><LF>").await?;

                let Some(data) = read_data(&mut reader, &mut buf, max_size).await? else {
                    // Peer went away mid-DATA: nothing is stored.
                    warn!(from = %mail_from, "connection closed during DATA, message discarded");
                    return Ok(());
                };
                let raw = match data.finish() {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(from = %mail_from, to = %envelope.recipients.join(", "), "{e}");
                        envelope.reset();
                        reply(&mut writer, TOO_BIG).await?;
                        continue;
                    }
                };

                let outcome = deliver(&state.store, &raw, &mail_from, &envelope.recipients).await;
                envelope.reset();
                let response = match outcome {
                    DeliveryOutcome::Accepted { message_id, .. } => {
                        format!("250 2.0.0 OK queued as {message_id}")
                    }
                    DeliveryOutcome::Rejected(_) => {
                        "554 5.6.0 Message could not be parsed".to_string()
                    }
                    DeliveryOutcome::StorageFailed { .. } => {
                        "451 4.3.0 Requested action aborted: local error in processing".to_string()
                    }
                };
                reply(&mut writer, &response).await?;
            }
            "RSET" => {
                envelope.reset();
                reply(&mut writer, "250 2.0.0 OK").await?;
            }
            "NOOP" => {
                reply(&mut writer, "250 2.0.0 OK").await?;
            }
            "VRFY" => {
                reply(&mut writer, "252 2.5.2 Cannot VRFY user, but will accept message").await?;
            }
            "QUIT" => {
                reply(&mut writer, "221 2.0.0 Bye").await?;
                break;
            }
            _ => {
                reply(&mut writer, "502 5.5.1 Command not implemented").await?;
            }
        }
    }
    Ok(())
}

async fn reply<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    debug!("smtp => {}", text);
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Read up to and including `\n`, but never more than `limit` bytes.
async fn read_limited<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<Line> {
    buf.clear();
    let n = (&mut *reader).take(limit as u64).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if !buf.ends_with(b"\n") && n >= limit {
        return Ok(Line::TooLong);
    }
    Ok(Line::Read)
}

async fn skip_rest_of_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        match read_limited(reader, buf, MAX_COMMAND_LINE).await? {
            Line::TooLong => continue,
            Line::Read | Line::Eof => return Ok(()),
        }
    }
}

/// Collect the DATA payload. `None` means the connection closed first.
async fn read_data<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> std::io::Result<Option<DataBuffer>> {
    let mut data = DataBuffer::new(max_size);
    loop {
        let chunk_limit = data.remaining().clamp(MAX_COMMAND_LINE, MAX_DATA_CHUNK);
        let read = timeout(IDLE_TIMEOUT, read_limited(reader, buf, chunk_limit))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "idle during DATA"))??;
        if let Line::Eof = read {
            return Ok(None);
        }
        if data.push(buf.as_slice()) == DataEvent::Done {
            return Ok(Some(data));
        }
    }
}

/// Case-insensitive `FROM:` / `TO:` prefix removal.
fn strip_keyword<'a>(arg: &'a str, keyword: &str) -> Option<&'a str> {
    let head = arg.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(arg[keyword.len()..].trim_start())
    } else {
        None
    }
}

/// Split `<address> PARAMS` into the bare address and the parameter tail.
fn parse_path(rest: &str) -> Option<(String, &str)> {
    let rest = rest.trim();
    if let Some(inner) = rest.strip_prefix('<') {
        let end = inner.find('>')?;
        let addr = inner[..end].trim();
        // Drop source routes such as <@relay:user@host>.
        let addr = if addr.starts_with('@') {
            addr.split_once(':').map(|(_, a)| a).unwrap_or("")
        } else {
            addr
        };
        return Some((addr.to_string(), inner[end + 1..].trim()));
    }
    let (addr, params) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if addr.is_empty() {
        return None;
    }
    Some((addr.to_string(), params.trim()))
}

/// The `SIZE=` value announced on `MAIL FROM`, if any.
fn declared_size(params: &str) -> Option<usize> {
    params.split_whitespace().find_map(|p| {
        let (k, v) = p.split_once('=')?;
        if k.eq_ignore_ascii_case("SIZE") { v.parse().ok() } else { None }
    })
}
