//! Shared fixtures: an in-memory IMAP mailbox, recording sinks, and builders
//! for receipt emails with PDF attachments.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use payment_watch::error::{DeliveryError, MailError};
use payment_watch::mail::{ImapSession, MailStore, MessageId, RawMessage, SearchQuery};
use payment_watch::pipeline::rules::BankProfile;
use payment_watch::pipeline::{BankRules, FieldExtractor, FilterPolicy, PaymentDetails};
use payment_watch::sinks::Sink;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Mailbox ─────────────────────────────────────────────────────────────

struct StoredMessage {
    id: MessageId,
    raw: Vec<u8>,
    seen: bool,
}

/// Server-side mailbox state, shared between the test and the fake server.
#[derive(Default)]
struct ServerState {
    messages: Vec<StoredMessage>,
    /// UIDs whose fetch is answered with `NO`.
    broken: Vec<MessageId>,
    /// UIDs whose `\Seen` store is answered with `NO`.
    unflaggable: Vec<MessageId>,
    /// UID whose fetch drops the connection.
    fatal_on: Option<MessageId>,
    /// When set, every search is answered with `NO` and this text.
    search_error: Option<String>,
    searches: Vec<String>,
    closed: bool,
}

impl ServerState {
    fn message_mut(&mut self, uid: &str) -> Option<&mut StoredMessage> {
        self.messages.iter_mut().find(|m| m.id.as_str() == uid)
    }

    /// Answer one tagged command line. Follows RFC 3501: a non-PEEK body
    /// fetch sets `\Seen` as a side effect.
    fn handle(&mut self, line: &str) -> Vec<u8> {
        let (tag, command) = line.split_once(' ').unwrap_or((line, ""));
        let words: Vec<&str> = command.split_whitespace().collect();
        let verb = words.first().map(|w| w.to_ascii_uppercase()).unwrap_or_default();
        let sub = words.get(1).map(|w| w.to_ascii_uppercase()).unwrap_or_default();

        match (verb.as_str(), sub.as_str()) {
            ("LOGIN", _) => format!("{tag} OK LOGIN completed\r\n").into_bytes(),
            ("SELECT", _) => format!(
                "* {} EXISTS\r\n{tag} OK [READ-WRITE] SELECT completed\r\n",
                self.messages.len()
            )
            .into_bytes(),
            ("UID", "SEARCH") => {
                let criteria = words[2..].join(" ");
                self.searches.push(criteria.clone());
                if let Some(reason) = &self.search_error {
                    return format!("{tag} NO {reason}\r\n").into_bytes();
                }
                let unseen = criteria.contains("UNSEEN");
                let uids: Vec<&str> = self
                    .messages
                    .iter()
                    .filter(|m| !unseen || !m.seen)
                    .map(|m| m.id.as_str())
                    .collect();
                format!("* SEARCH {}\r\n{tag} OK SEARCH completed\r\n", uids.join(" "))
                    .into_bytes()
            }
            ("UID", "FETCH") => {
                let uid = words[2];
                let item = words[3..].join(" ");
                if self.fatal_on.as_ref().is_some_and(|id| id.as_str() == uid) {
                    self.closed = true;
                    return Vec::new();
                }
                if self.broken.iter().any(|id| id.as_str() == uid) {
                    return format!("{tag} NO message expunged\r\n").into_bytes();
                }
                let Some(message) = self.message_mut(uid) else {
                    return format!("{tag} OK FETCH completed\r\n").into_bytes();
                };
                if !item.to_ascii_uppercase().contains(".PEEK") {
                    message.seen = true;
                }
                let mut out =
                    format!("* 1 FETCH (UID {uid} BODY[] {{{}}}\r\n", message.raw.len()).into_bytes();
                out.extend_from_slice(&message.raw);
                out.extend_from_slice(format!(")\r\n{tag} OK FETCH completed\r\n").as_bytes());
                out
            }
            ("UID", "STORE") => {
                let uid = words[2];
                if self.unflaggable.iter().any(|id| id.as_str() == uid) {
                    return format!("{tag} NO read-only mailbox\r\n").into_bytes();
                }
                if let Some(message) = self.message_mut(uid) {
                    message.seen = true;
                }
                format!("{tag} OK STORE completed\r\n").into_bytes()
            }
            ("LOGOUT", _) => format!("* BYE\r\n{tag} OK LOGOUT completed\r\n").into_bytes(),
            _ => format!("{tag} BAD unknown command\r\n").into_bytes(),
        }
    }
}

/// Byte stream that plays an IMAP server against [`ServerState`].
struct FakeServer {
    state: Arc<Mutex<ServerState>>,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
}

impl Read for FakeServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeServer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        self.inbound.extend_from_slice(buf);
        while let Some(pos) = self.inbound.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.inbound.drain(..pos + 2).collect();
            let line = String::from_utf8_lossy(&line[..pos]).into_owned();
            let reply = state.handle(&line);
            self.outbound.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A real [`ImapSession`] logged in to an in-memory server.
pub struct MockStore {
    session: ImapSession<FakeServer>,
    state: Arc<Mutex<ServerState>>,
}

impl MockStore {
    pub fn with_messages(messages: Vec<(&str, Vec<u8>)>) -> Self {
        let state = Arc::new(Mutex::new(ServerState {
            messages: messages
                .into_iter()
                .map(|(id, raw)| StoredMessage {
                    id: MessageId::from(id),
                    raw,
                    seen: false,
                })
                .collect(),
            ..ServerState::default()
        }));
        let server = FakeServer {
            state: Arc::clone(&state),
            inbound: Vec::new(),
            outbound: VecDeque::from(b"* OK fake IMAP ready\r\n".to_vec()),
        };
        let mut session = ImapSession::new(server, "imap.fake").unwrap();
        session.login("payments@example.cv", "secret").unwrap();
        session.select("INBOX").unwrap();
        Self { session, state }
    }

    pub fn empty() -> Self {
        Self::with_messages(Vec::new())
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .any(|m| m.id.as_str() == id && m.seen)
    }

    /// Search criteria the server received, in order.
    pub fn searches(&self) -> Vec<String> {
        self.state.lock().unwrap().searches.clone()
    }

    /// Answer fetches of `id` with `NO`.
    pub fn break_fetch(&self, id: &str) {
        self.state.lock().unwrap().broken.push(MessageId::from(id));
    }

    /// Answer `\Seen` stores for `id` with `NO`.
    pub fn refuse_flag(&self, id: &str) {
        self.state.lock().unwrap().unflaggable.push(MessageId::from(id));
    }

    /// Drop the connection when `id` is fetched.
    pub fn drop_connection_on(&self, id: &str) {
        self.state.lock().unwrap().fatal_on = Some(MessageId::from(id));
    }

    /// Reject every search with `reason`.
    pub fn fail_search(&self, reason: &str) {
        self.state.lock().unwrap().search_error = Some(reason.to_string());
    }
}

impl MailStore for MockStore {
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, MailError> {
        self.session.search(query)
    }

    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, MailError> {
        self.session.fetch(id)
    }

    fn mark_seen(&mut self, id: &MessageId) -> Result<(), MailError> {
        self.session.mark_seen(id)
    }

    fn logout(self) -> Result<(), MailError> {
        self.session.logout()
    }
}

// ── Sinks ───────────────────────────────────────────────────────────────

/// Keeps every record it is handed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub delivered: Arc<Mutex<Vec<PaymentDetails>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<PaymentDetails> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, details: &PaymentDetails) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(details.clone());
        Ok(())
    }
}

/// Times out on every call.
#[derive(Clone, Default)]
pub struct TimeoutSink {
    pub calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl Sink for TimeoutSink {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn deliver(&self, _details: &PaymentDetails) -> Result<(), DeliveryError> {
        *self.calls.lock().unwrap() += 1;
        Err(DeliveryError::Timeout {
            sink: "timeout".into(),
            timeout: Duration::from_millis(1),
        })
    }
}

// ── Config fixtures ─────────────────────────────────────────────────────

pub const BCA_SENDER: &str = "notification@bca.cv";

/// Rules for the BCA receipt layout.
pub fn bca_rules() -> BankRules {
    let mut fields = BTreeMap::new();
    fields.insert("transaction_id".to_string(), "Transaction ID".to_string());
    fields.insert("client_name".to_string(), "Client".to_string());
    BankRules::new(vec![BankProfile {
        id: "bca".into(),
        sender_domains: vec!["bca.cv".into()],
        fields,
    }])
}

pub fn bca_extractor() -> FieldExtractor {
    FieldExtractor::new(&bca_rules()).unwrap()
}

/// Unread-only, "Extrato" subjects from bca.cv.
pub fn bca_policy() -> FilterPolicy {
    FilterPolicy {
        fetch_unread_only: true,
        time_window_minutes: None,
        subject_keywords: vec!["Extrato".into()],
        sender_domains: vec!["bca.cv".into()],
    }
}

// ── Message builders ────────────────────────────────────────────────────

/// Single-page PDF, one text line per element.
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
        operations.push(Operation::new(
            "Td",
            vec![72.into(), (720 - 20 * i as i64).into()],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("ET", vec![]));
    }
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    });

    let kids: Vec<Object> = vec![page_id.into()];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Multipart message with a text body and one base64 PDF attachment.
pub fn receipt_email(from: &str, subject: &str, attachment: &[u8]) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
To: payments@example.com\r\n\
Subject: {subject}\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"RCPT\"\r\n\
\r\n\
--RCPT\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Segue em anexo o comprovativo.\r\n\
--RCPT\r\n\
Content-Type: application/pdf; name=\"extrato.pdf\"\r\n\
Content-Disposition: attachment; filename=\"extrato.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
{}\r\n\
--RCPT--\r\n",
        STANDARD.encode(attachment)
    )
    .into_bytes()
}

/// The canonical BCA receipt: transaction 566950604 for JOHN DOE.
pub fn bca_receipt() -> Vec<u8> {
    let pdf = pdf_with_lines(&["Transaction ID: 566950604", "Client: JOHN DOE"]);
    receipt_email(BCA_SENDER, "Extrato de pagamento", &pdf)
}

/// A fully populated record for sink tests.
pub fn sample_details() -> PaymentDetails {
    let mut fields = BTreeMap::new();
    fields.insert("transaction_id".to_string(), "566950604".to_string());
    fields.insert("client_name".to_string(), "JOHN DOE".to_string());
    fields.insert("amount_paid".to_string(), "1.500,00".to_string());
    PaymentDetails {
        fields,
        email_id: "17429".into(),
        sender: BCA_SENDER.into(),
        subject: "Extrato de pagamento".into(),
    }
}
