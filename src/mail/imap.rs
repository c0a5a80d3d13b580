//! Blocking IMAP session over implicit TLS.
//!
//! Speaks the handful of commands the poller needs (LOGIN, SELECT,
//! UID SEARCH / FETCH BODY.PEEK[] / STORE, LOGOUT) directly over a
//! rustls stream.
//! The session is generic over the byte stream so the protocol handling
//! can be exercised against scripted server output.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::EmailConfig;
use crate::error::MailError;
use crate::mail::{MailStore, MessageId, RawMessage, SearchQuery};

/// TLS stream used for real connections.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Tagged completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    No,
    Bad,
}

/// One untagged server line with any literals it carried.
#[derive(Debug, Default)]
struct Untagged {
    text: String,
    literals: Vec<Vec<u8>>,
}

/// Everything the server sent for one command.
#[derive(Debug)]
struct Response {
    untagged: Vec<Untagged>,
    status: Status,
    /// Human-readable text after the status word.
    detail: String,
}

/// An authenticated session with a mailbox selected.
pub struct ImapSession<S: Read + Write> {
    reader: BufReader<S>,
    server: String,
    next_tag: u32,
}

impl ImapSession<TlsStream> {
    /// Open a TLS connection, log in, and select the configured mailbox.
    pub fn connect(config: &EmailConfig) -> Result<Self, MailError> {
        let host = config.imap_server.as_str();
        let tcp = TcpStream::connect((host, config.imap_port))
            .map_err(|e| MailError::Transport(format!("connect {host}:{}: {e}", config.imap_port)))?;
        tcp.set_read_timeout(Some(config.timeout()))?;
        tcp.set_write_timeout(Some(config.timeout()))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| MailError::Transport(format!("invalid server name {host}: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailError::Transport(format!("TLS setup failed: {e}")))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = ImapSession::new(tls, host)?;
        session.login(&config.username, config.password.expose_secret())?;
        session.select(&config.mailbox)?;
        info!(server = %host, user = %config.username, mailbox = %config.mailbox, "IMAP session opened");
        Ok(session)
    }
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap a connected stream and consume the server greeting.
    pub fn new(stream: S, server: &str) -> Result<Self, MailError> {
        let mut session = Self {
            reader: BufReader::new(stream),
            server: server.to_string(),
            next_tag: 1,
        };
        let greeting = session.read_line()?;
        if greeting.starts_with("* BYE") {
            return Err(MailError::Transport(format!(
                "server refused connection: {greeting}"
            )));
        }
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(MailError::Protocol(format!("unexpected greeting: {greeting}")));
        }
        Ok(session)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let command = format!("LOGIN {} {}", quote(username), quote(password));
        let resp = self.command_redacted(&command, "LOGIN <redacted>")?;
        if resp.status != Status::Ok {
            return Err(MailError::Authentication {
                server: self.server.clone(),
                reason: resp.detail,
            });
        }
        Ok(())
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), MailError> {
        let resp = self.command(&format!("SELECT {}", quote(mailbox)))?;
        if resp.status != Status::Ok {
            return Err(MailError::Protocol(format!(
                "SELECT {mailbox} failed: {}",
                resp.detail
            )));
        }
        Ok(())
    }

    fn tag(&mut self) -> String {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;
        tag
    }

    fn command(&mut self, command: &str) -> Result<Response, MailError> {
        self.command_redacted(command, command)
    }

    /// Send `command`, logging `shown` in its place.
    fn command_redacted(&mut self, command: &str, shown: &str) -> Result<Response, MailError> {
        let tag = self.tag();
        debug!(tag = %tag, command = %shown, "IMAP >");
        let stream = self.reader.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;
        self.read_response(&tag)
    }

    /// Read one CRLF-terminated line, without the terminator.
    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Closed);
        }
        while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_response(&mut self, tag: &str) -> Result<Response, MailError> {
        let prefix = format!("{tag} ");
        let mut untagged = Vec::new();

        loop {
            let mut line = Untagged {
                text: self.read_line()?,
                literals: Vec::new(),
            };

            // A line ending in {n} is followed by n raw bytes, then the rest
            // of the logical line.
            while let Some(len) = literal_len(&line.text) {
                let mut literal = vec![0u8; len];
                self.reader.read_exact(&mut literal)?;
                line.literals.push(literal);
                let rest = self.read_line()?;
                line.text.push_str(&rest);
            }

            if let Some(rest) = line.text.strip_prefix(&prefix) {
                let (word, detail) = rest.split_once(' ').unwrap_or((rest, ""));
                let status = match word.to_ascii_uppercase().as_str() {
                    "OK" => Status::Ok,
                    "NO" => Status::No,
                    "BAD" => Status::Bad,
                    other => {
                        return Err(MailError::Protocol(format!(
                            "unknown completion status {other}"
                        )));
                    }
                };
                return Ok(Response {
                    untagged,
                    status,
                    detail: detail.to_string(),
                });
            }

            if !line.text.starts_with('+') {
                untagged.push(line);
            }
        }
    }
}

impl<S: Read + Write> MailStore for ImapSession<S> {
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, MailError> {
        let criteria = query.to_imap();
        let resp = self.command(&format!("UID SEARCH {criteria}"))?;
        if resp.status != Status::Ok {
            return Err(MailError::Search(format!("{criteria}: {}", resp.detail)));
        }

        let ids: Vec<MessageId> = resp
            .untagged
            .iter()
            .filter_map(|line| line.text.strip_prefix("* SEARCH"))
            .flat_map(|rest| rest.split_whitespace())
            .filter(|tok| tok.bytes().all(|b| b.is_ascii_digit()))
            .map(MessageId::from)
            .collect();

        debug!(criteria = %criteria, count = ids.len(), "IMAP search complete");
        Ok(ids)
    }

    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, MailError> {
        // PEEK so reading a message never sets \Seen on its own.
        let resp = self.command(&format!("UID FETCH {id} BODY.PEEK[]"))?;
        if resp.status != Status::Ok {
            return Err(MailError::Fetch {
                id: id.to_string(),
                reason: resp.detail,
            });
        }

        let raw = resp
            .untagged
            .into_iter()
            .filter(|line| line.text.contains("FETCH"))
            .find_map(|line| line.literals.into_iter().next())
            .ok_or_else(|| MailError::Fetch {
                id: id.to_string(),
                reason: "server returned no message body".into(),
            })?;

        RawMessage::parse(id.clone(), raw)
    }

    fn mark_seen(&mut self, id: &MessageId) -> Result<(), MailError> {
        let resp = self.command(&format!("UID STORE {id} +FLAGS (\\Seen)"))?;
        if resp.status != Status::Ok {
            return Err(MailError::Store {
                id: id.to_string(),
                reason: resp.detail,
            });
        }
        Ok(())
    }

    fn logout(mut self) -> Result<(), MailError> {
        let resp = self.command("LOGOUT")?;
        if resp.status != Status::Ok {
            warn!(detail = %resp.detail, "LOGOUT not acknowledged");
        }
        info!(server = %self.server, "IMAP session closed");
        Ok(())
    }
}

/// Close a session if one was opened. `None` is a no-op.
pub fn disconnect<S: MailStore>(session: Option<S>) {
    if let Some(session) = session
        && let Err(e) = session.logout()
    {
        warn!("IMAP logout failed: {e}");
    }
}

/// Parse a trailing `{n}` (or `{n+}`) literal marker.
fn literal_len(line: &str) -> Option<usize> {
    let body = line.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].trim_end_matches('+').parse().ok()
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
