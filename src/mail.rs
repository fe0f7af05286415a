//! Minimal mail-protocol clients (SMTP, IMAP, POP3) over tokio sockets.
//!
//! These exist for probing and delivery, not for full mailbox management:
//! connect, optionally upgrade to TLS, authenticate, and exercise a small
//! protocol surface while keeping every read and write bounded by a timeout.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::net::{server_name, verifying_tls_connector};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out")]
    Timeout,
    #[error("tls error: {0}")]
    Tls(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected server response: {0}")]
    Protocol(String),
}

impl MailError {
    /// Short category label used in check diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            MailError::Io(_) => "io",
            MailError::Timeout => "timeout",
            MailError::Tls(_) => "tls",
            MailError::Auth(_) => "auth",
            MailError::Protocol(_) => "protocol",
        }
    }
}

enum MailStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MailStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MailStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MailStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Line-oriented transport with a per-operation timeout.
struct Wire {
    inner: Option<BufReader<MailStream>>,
    timeout: Duration,
}

impl Wire {
    async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| MailError::Timeout)??;
        let stream = if implicit_tls {
            let name = server_name(host).map_err(MailError::Tls)?;
            let tls = tokio::time::timeout(timeout, verifying_tls_connector().connect(name, tcp))
                .await
                .map_err(|_| MailError::Timeout)?
                .map_err(|e| MailError::Tls(e.to_string()))?;
            MailStream::Tls(Box::new(tls))
        } else {
            MailStream::Plain(tcp)
        };
        Ok(Self {
            inner: Some(BufReader::new(stream)),
            timeout,
        })
    }

    fn stream(&mut self) -> Result<&mut BufReader<MailStream>, MailError> {
        self.inner
            .as_mut()
            .ok_or_else(|| MailError::Protocol("stream no longer available".to_string()))
    }

    async fn read_line(&mut self) -> Result<String, MailError> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        let mut line = String::new();
        let read = tokio::time::timeout(timeout, stream.read_line(&mut line))
            .await
            .map_err(|_| MailError::Timeout)??;
        if read == 0 {
            return Err(MailError::Protocol("connection closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), MailError> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        let payload = format!("{line}\r\n");
        tokio::time::timeout(timeout, async {
            stream.write_all(payload.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| MailError::Timeout)??;
        Ok(())
    }

    /// Replaces the plaintext transport with a TLS one (STARTTLS).
    async fn upgrade_tls(&mut self, host: &str) -> Result<(), MailError> {
        let reader = self
            .inner
            .take()
            .ok_or_else(|| MailError::Protocol("stream no longer available".to_string()))?;
        let tcp = match reader.into_inner() {
            MailStream::Plain(tcp) => tcp,
            MailStream::Tls(_) => {
                return Err(MailError::Protocol("connection is already TLS".to_string()))
            }
        };
        let name = server_name(host).map_err(MailError::Tls)?;
        let tls = tokio::time::timeout(
            self.timeout,
            verifying_tls_connector().connect(name, tcp),
        )
        .await
        .map_err(|_| MailError::Timeout)?
        .map_err(|e| MailError::Tls(e.to_string()))?;
        self.inner = Some(BufReader::new(MailStream::Tls(Box::new(tls))));
        Ok(())
    }
}

/// Splits an SMTP reply line into its code and whether more lines follow.
fn parse_smtp_reply_line(line: &str) -> Result<(u16, bool, &str), MailError> {
    let code: u16 = line
        .get(..3)
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| MailError::Protocol(format!("malformed reply line: '{line}'")))?;
    let more = line.as_bytes().get(3) == Some(&b'-');
    let text = line.get(4..).unwrap_or("").trim();
    Ok((code, more, text))
}

pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

pub struct SmtpSession {
    wire: Wire,
    host: String,
    extensions: Vec<String>,
}

impl SmtpSession {
    /// Connects and consumes the server greeting, returning it alongside the
    /// session.
    pub async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        timeout: Duration,
    ) -> Result<(Self, String), MailError> {
        let wire = Wire::connect(host, port, implicit_tls, timeout).await?;
        let mut session = Self {
            wire,
            host: host.to_string(),
            extensions: Vec::new(),
        };
        let greeting = session.read_reply().await?;
        if greeting.code != 220 {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {} {}",
                greeting.code,
                greeting.lines.join(" ")
            )));
        }
        Ok((session, greeting.lines.join(" ")))
    }

    async fn read_reply(&mut self) -> Result<SmtpReply, MailError> {
        let mut lines = Vec::new();
        loop {
            let line = self.wire.read_line().await?;
            let (code, more, text) = parse_smtp_reply_line(&line)?;
            lines.push(text.to_string());
            if !more {
                return Ok(SmtpReply { code, lines });
            }
        }
    }

    async fn command(&mut self, command: &str, expected: u16) -> Result<SmtpReply, MailError> {
        self.wire.write_line(command).await?;
        let reply = self.read_reply().await?;
        if reply.code != expected {
            return Err(MailError::Protocol(format!(
                "'{command}' answered {} {}",
                reply.code,
                reply.lines.join(" ")
            )));
        }
        Ok(reply)
    }

    pub async fn ehlo(&mut self, client_name: &str) -> Result<Vec<String>, MailError> {
        let reply = self.command(&format!("EHLO {client_name}"), 250).await?;
        // First line is the server name; the rest are extension keywords.
        self.extensions = reply
            .lines
            .iter()
            .skip(1)
            .map(|l| {
                l.split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_uppercase()
            })
            .collect();
        Ok(self.extensions.clone())
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == &extension.to_uppercase())
    }

    pub async fn starttls(&mut self) -> Result<(), MailError> {
        self.command("STARTTLS", 220).await?;
        let host = self.host.clone();
        self.wire.upgrade_tls(&host).await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        self.wire.write_line("AUTH LOGIN").await?;
        let reply = self.read_reply().await?;
        if reply.code != 334 {
            return Err(MailError::Auth(format!(
                "AUTH LOGIN rejected: {} {}",
                reply.code,
                reply.lines.join(" ")
            )));
        }
        self.wire.write_line(&BASE64.encode(username)).await?;
        let reply = self.read_reply().await?;
        if reply.code != 334 {
            return Err(MailError::Auth(format!(
                "username rejected: {} {}",
                reply.code,
                reply.lines.join(" ")
            )));
        }
        self.wire.write_line(&BASE64.encode(password)).await?;
        let reply = self.read_reply().await?;
        if reply.code != 235 {
            return Err(MailError::Auth(format!(
                "{} {}",
                reply.code,
                reply.lines.join(" ")
            )));
        }
        Ok(())
    }

    /// Sends a fully formatted RFC 5322 message.
    pub async fn send_message(
        &mut self,
        from: &str,
        recipients: &[String],
        message: &str,
    ) -> Result<(), MailError> {
        self.command(&format!("MAIL FROM:<{from}>"), 250).await?;
        for recipient in recipients {
            self.command(&format!("RCPT TO:<{recipient}>"), 250).await?;
        }
        self.command("DATA", 354).await?;
        for line in message.lines() {
            // Dot-stuffing per RFC 5321 §4.5.2.
            if let Some(rest) = line.strip_prefix('.') {
                self.wire.write_line(&format!("..{rest}")).await?;
            } else {
                self.wire.write_line(line).await?;
            }
        }
        self.command(".", 250).await?;
        Ok(())
    }

    pub async fn quit(&mut self) -> Result<(), MailError> {
        self.command("QUIT", 221).await.map(|_| ())
    }
}

pub struct ImapSession {
    wire: Wire,
    tag: u32,
}

impl ImapSession {
    pub async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        timeout: Duration,
    ) -> Result<(Self, String), MailError> {
        let mut wire = Wire::connect(host, port, implicit_tls, timeout).await?;
        let greeting = wire.read_line().await?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        Ok((Self { wire, tag: 0 }, greeting))
    }

    /// Sends a tagged command and collects untagged lines until the tagged
    /// completion arrives. Returns `(untagged, completion_text)`.
    async fn command(&mut self, command: &str) -> Result<(Vec<String>, String), MailError> {
        self.tag += 1;
        let tag = format!("a{}", self.tag);
        self.wire.write_line(&format!("{tag} {command}")).await?;

        let mut untagged = Vec::new();
        loop {
            let line = self.wire.read_line().await?;
            if let Some(rest) = line.strip_prefix(&format!("{tag} ")) {
                let verb = command.split_whitespace().next().unwrap_or("");
                if rest.starts_with("OK") {
                    return Ok((untagged, rest.to_string()));
                }
                if verb.eq_ignore_ascii_case("LOGIN") {
                    return Err(MailError::Auth(rest.to_string()));
                }
                return Err(MailError::Protocol(format!("'{verb}' answered {rest}")));
            }
            untagged.push(line);
        }
    }

    pub async fn capability(&mut self) -> Result<Vec<String>, MailError> {
        let (untagged, _) = self.command("CAPABILITY").await?;
        Ok(untagged
            .iter()
            .filter_map(|l| l.strip_prefix("* CAPABILITY "))
            .flat_map(|l| l.split_whitespace().map(|c| c.to_string()))
            .collect())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let user = quote_imap(username);
        let pass = quote_imap(password);
        self.command(&format!("LOGIN {user} {pass}")).await?;
        Ok(())
    }

    /// Opens a mailbox read-only and returns its message count.
    pub async fn examine(&mut self, mailbox: &str) -> Result<u32, MailError> {
        let (untagged, _) = self.command(&format!("EXAMINE {}", quote_imap(mailbox))).await?;
        Ok(untagged
            .iter()
            .find_map(|l| parse_exists(l))
            .unwrap_or(0))
    }

    pub async fn status(&mut self, mailbox: &str) -> Result<String, MailError> {
        let (untagged, _) = self
            .command(&format!(
                "STATUS {} (MESSAGES RECENT UNSEEN)",
                quote_imap(mailbox)
            ))
            .await?;
        Ok(untagged
            .iter()
            .find(|l| l.starts_with("* STATUS"))
            .cloned()
            .unwrap_or_default())
    }

    /// Message ids received since the given IMAP date (`dd-Mon-yyyy`).
    pub async fn search_since(&mut self, date: &str) -> Result<usize, MailError> {
        let (untagged, _) = self.command(&format!("SEARCH SINCE {date}")).await?;
        Ok(untagged
            .iter()
            .find_map(|l| l.strip_prefix("* SEARCH"))
            .map(|ids| ids.split_whitespace().count())
            .unwrap_or(0))
    }

    pub async fn logout(&mut self) -> Result<(), MailError> {
        self.command("LOGOUT").await.map(|_| ())
    }
}

fn quote_imap(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parses an untagged `* N EXISTS` line.
fn parse_exists(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("*") {
        return None;
    }
    let count: u32 = parts.next()?.parse().ok()?;
    if parts.next()? .eq_ignore_ascii_case("EXISTS") {
        Some(count)
    } else {
        None
    }
}

/// Pulls MESSAGES/RECENT/UNSEEN counts out of a STATUS response line.
pub fn parse_status_counts(status_line: &str) -> (Option<u32>, Option<u32>, Option<u32>) {
    let grab = |key: &str| -> Option<u32> {
        let upper = status_line.to_uppercase();
        let idx = upper.find(key)?;
        status_line[idx + key.len()..]
            .split_whitespace()
            .next()
            .map(|v| v.trim_end_matches(')'))
            .and_then(|v| v.parse().ok())
    };
    (grab("MESSAGES "), grab("RECENT "), grab("UNSEEN "))
}

pub struct Pop3Session {
    wire: Wire,
}

impl Pop3Session {
    pub async fn connect(
        host: &str,
        port: u16,
        implicit_tls: bool,
        timeout: Duration,
    ) -> Result<(Self, String), MailError> {
        let mut wire = Wire::connect(host, port, implicit_tls, timeout).await?;
        let greeting = wire.read_line().await?;
        if !greeting.starts_with("+OK") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        Ok((Self { wire }, greeting))
    }

    async fn command(&mut self, command: &str) -> Result<String, MailError> {
        self.wire.write_line(command).await?;
        let line = self.wire.read_line().await?;
        if line.starts_with("+OK") {
            Ok(line)
        } else {
            Err(MailError::Protocol(format!(
                "'{}' answered {line}",
                command.split_whitespace().next().unwrap_or(command)
            )))
        }
    }

    /// Server capabilities, or None when CAPA is unsupported.
    pub async fn capabilities(&mut self) -> Result<Option<Vec<String>>, MailError> {
        self.wire.write_line("CAPA").await?;
        let first = self.wire.read_line().await?;
        if !first.starts_with("+OK") {
            return Ok(None);
        }
        let mut caps = Vec::new();
        loop {
            let line = self.wire.read_line().await?;
            if line == "." {
                return Ok(Some(caps));
            }
            caps.push(line);
        }
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        self.command(&format!("USER {username}")).await?;
        self.wire.write_line(&format!("PASS {password}")).await?;
        let line = self.wire.read_line().await?;
        if line.starts_with("+OK") {
            Ok(())
        } else {
            Err(MailError::Auth(line))
        }
    }

    /// Mailbox statistics: `(message_count, mailbox_size_bytes)`.
    pub async fn stat(&mut self) -> Result<(u64, u64), MailError> {
        let line = self.command("STAT").await?;
        parse_stat(&line).ok_or_else(|| MailError::Protocol(format!("malformed STAT reply: {line}")))
    }

    pub async fn uidl_supported(&mut self) -> Result<bool, MailError> {
        self.wire.write_line("UIDL").await?;
        let first = self.wire.read_line().await?;
        if !first.starts_with("+OK") {
            return Ok(false);
        }
        loop {
            let line = self.wire.read_line().await?;
            if line == "." {
                return Ok(true);
            }
        }
    }

    pub async fn quit(&mut self) -> Result<(), MailError> {
        self.command("QUIT").await.map(|_| ())
    }
}

/// Parses a `+OK count size` STAT reply.
fn parse_stat(line: &str) -> Option<(u64, u64)> {
    let mut parts = line.split_whitespace().skip(1);
    let count = parts.next()?.parse().ok()?;
    let size = parts.next()?.parse().ok()?;
    Some((count, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_reply_lines_parse_codes_and_continuations() {
        assert_eq!(
            parse_smtp_reply_line("250-STARTTLS").unwrap(),
            (250, true, "STARTTLS")
        );
        assert_eq!(
            parse_smtp_reply_line("250 mail.example.com").unwrap(),
            (250, false, "mail.example.com")
        );
        assert_eq!(parse_smtp_reply_line("220").unwrap(), (220, false, ""));
        assert!(parse_smtp_reply_line("xx").is_err());
        assert!(parse_smtp_reply_line("abc text").is_err());
    }

    #[test]
    fn imap_exists_lines_parse() {
        assert_eq!(parse_exists("* 17 EXISTS"), Some(17));
        assert_eq!(parse_exists("* 0 exists"), Some(0));
        assert_eq!(parse_exists("* 17 RECENT"), None);
        assert_eq!(parse_exists("a1 OK done"), None);
    }

    #[test]
    fn imap_status_counts_parse() {
        let line = "* STATUS \"INBOX\" (MESSAGES 231 RECENT 1 UNSEEN 5)";
        assert_eq!(parse_status_counts(line), (Some(231), Some(1), Some(5)));
        assert_eq!(parse_status_counts("* STATUS INBOX ()"), (None, None, None));
    }

    #[test]
    fn pop3_stat_parses() {
        assert_eq!(parse_stat("+OK 3 12040"), Some((3, 12040)));
        assert_eq!(parse_stat("+OK"), None);
    }

    #[test]
    fn imap_quoting_escapes_specials() {
        assert_eq!(quote_imap("plain"), "\"plain\"");
        assert_eq!(quote_imap("a\"b"), "\"a\\\"b\"");
    }
}
