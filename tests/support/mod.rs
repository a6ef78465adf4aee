#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bson::Document;
use docwire::Connection;
use docwire::config::ConnectionString;

/// One OP_QUERY as the mock server saw it.
#[derive(Debug, Clone)]
pub struct Request {
    pub length: i32,
    pub request_id: i32,
    pub op_code: i32,
    pub flags: i32,
    pub collection: String,
    pub skip: i32,
    pub take: i32,
    pub query: Document,
    pub fields: Option<Document>,
}

/// What the mock does with a request.
pub enum Answer {
    Reply { flags: i32, starting_from: i32, docs: Vec<Document> },
    /// Reply with a different `responseTo`.
    WrongResponseTo(Vec<Document>),
    /// Raw bytes, written as-is.
    Raw(Vec<u8>),
    /// Write these bytes, then close the socket.
    Hangup(Vec<u8>),
    /// Keep the socket open without replying.
    Silent,
}

impl Answer {
    pub fn docs(docs: Vec<Document>) -> Self {
        Self::Reply { flags: 0, starting_from: 0, docs }
    }
}

pub struct MockServer {
    pub port: u16,
    pub requests: Arc<Mutex<Vec<Request>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Accept one client and answer each request with `handler`.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Answer + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let handle = std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            while let Some(req) = read_request(&mut stream) {
                seen.lock().unwrap().push(req.clone());
                let bytes = match handler(&req) {
                    Answer::Reply { flags, starting_from, docs } => {
                        reply_bytes(req.request_id, flags, starting_from, &docs)
                    }
                    Answer::WrongResponseTo(docs) => reply_bytes(req.request_id.wrapping_add(1000), 0, 0, &docs),
                    Answer::Raw(bytes) => bytes,
                    Answer::Hangup(bytes) => {
                        let _ = stream.write_all(&bytes);
                        return;
                    }
                    Answer::Silent => {
                        // Hold the socket until the client gives up.
                        let mut sink = [0u8; 1];
                        let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
                        let _ = stream.read(&mut sink);
                        return;
                    }
                };
                if stream.write_all(&bytes).is_err() {
                    return;
                }
            }
        });
        Self { port, requests, handle: Some(handle) }
    }

    pub fn uri(&self, options: &str) -> String {
        if options.is_empty() {
            format!("mongodb://127.0.0.1:{}/test", self.port)
        } else {
            format!("mongodb://127.0.0.1:{}/test?{options}", self.port)
        }
    }

    pub fn connect(&self, options: &str) -> Connection {
        let cs = ConnectionString::parse(&self.uri(options)).unwrap();
        Connection::open(Arc::new(cs)).unwrap()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait for the server thread after the client has hung up.
    pub fn join(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn le(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).ok()?;
    let length = i32::from_le_bytes(len);
    let mut rest = vec![0u8; usize::try_from(length).ok()? - 4];
    stream.read_exact(&mut rest).ok()?;
    let mut msg = len.to_vec();
    msg.extend(rest);
    Some(parse_request(&msg))
}

/// Split an encoded OP_QUERY into its fields.
pub fn parse_request(msg: &[u8]) -> Request {
    let nul = msg[20..].iter().position(|b| *b == 0).unwrap() + 20;
    let collection = String::from_utf8(msg[20..nul].to_vec()).unwrap();
    let mut at = nul + 1;
    let skip = le(msg, at);
    let take = le(msg, at + 4);
    at += 8;
    let query_len = le(msg, at) as usize;
    let query = bson::deserialize_from_slice::<Document>(&msg[at..at + query_len]).unwrap();
    at += query_len;
    let fields = (at < msg.len()).then(|| bson::deserialize_from_slice::<Document>(&msg[at..]).unwrap());
    Request {
        length: le(msg, 0),
        request_id: le(msg, 4),
        op_code: le(msg, 12),
        flags: le(msg, 16),
        collection,
        skip,
        take,
        query,
        fields,
    }
}

/// An OP_REPLY answering `response_to`.
pub fn reply_bytes(response_to: i32, flags: i32, starting_from: i32, docs: &[Document]) -> Vec<u8> {
    let mut body = Vec::new();
    for d in docs {
        body.extend(bson::serialize_to_vec(d).unwrap());
    }
    let len = (36 + body.len()) as i32;
    let mut out = Vec::new();
    for word in [len, 42, response_to, 1, flags] {
        out.extend(word.to_le_bytes());
    }
    out.extend(0_i64.to_le_bytes());
    out.extend(starting_from.to_le_bytes());
    out.extend((docs.len() as i32).to_le_bytes());
    out.extend(body);
    out
}
