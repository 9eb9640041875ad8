//! Test-only doubles for the model, approval and shell seams.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use anyhow::Result;

use crate::core::conversation::Message;
use crate::io::approval::Approver;
use crate::io::model::{ModelClient, ModelError};
use crate::io::shell::{CommandCapture, CommandRequest, CommandRunner};

/// Model that replays queued replies and records what it was sent.
///
/// Once the queue is exhausted every call fails with [`ModelError::Request`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<Result<String, ModelError>>>,
    calls: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: RefCell::default(),
        }
    }

    /// Queue a backend failure after the replies already queued.
    pub fn then_fail(self, message: &str) -> Self {
        self.replies.borrow_mut().push_back(Err(ModelError::Request {
            url: "scripted://model".to_string(),
            message: message.to_string(),
        }));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Conversation snapshots, one per call.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, messages: &[Message]) -> Result<String, ModelError> {
        self.calls.borrow_mut().push(messages.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ModelError::Request {
                    url: "scripted://model".to_string(),
                    message: "no scripted reply left".to_string(),
                })
            })
    }
}

/// Approver that answers from a queue; an empty queue denies.
#[derive(Debug, Default)]
pub struct ScriptedApprover {
    answers: RefCell<VecDeque<bool>>,
    descriptions: RefCell<Vec<String>>,
}

impl ScriptedApprover {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            descriptions: RefCell::default(),
        }
    }

    /// Descriptions shown for every approval request, in order.
    pub fn descriptions(&self) -> Vec<String> {
        self.descriptions.borrow().clone()
    }
}

impl Approver for ScriptedApprover {
    fn approve(&self, description: &str) -> Result<bool> {
        self.descriptions.borrow_mut().push(description.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}

/// Runner that returns queued captures without spawning anything.
///
/// An empty queue yields a capture that looks like a timed-out command.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    captures: RefCell<VecDeque<CommandCapture>>,
    requests: RefCell<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    pub fn new(captures: Vec<CommandCapture>) -> Self {
        Self {
            captures: RefCell::new(captures.into()),
            requests: RefCell::default(),
        }
    }

    /// Command text of every request, in order.
    pub fn commands(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.command.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.borrow().clone()
    }
}

/// Capture of a command killed at its deadline.
pub fn timed_out_capture(partial_output: &str, timeout_secs: u64) -> CommandCapture {
    CommandCapture {
        text: format!("{partial_output}\n[command timed out after {timeout_secs}s]"),
        exit_code: None,
        timed_out: true,
        cancelled: false,
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> Result<CommandCapture> {
        self.requests.borrow_mut().push(request.clone());
        let next = self.captures.borrow_mut().pop_front();
        Ok(next.unwrap_or_else(|| timed_out_capture("", request.timeout.as_secs())))
    }
}

/// One-shot HTTP/1.1 server on loopback that answers a single request.
pub struct StubHttpServer {
    addr: String,
    handle: JoinHandle<String>,
}

impl StubHttpServer {
    /// Serve one request with `status` and a JSON `body`, then close.
    pub fn respond_once(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("local addr").to_string();
        let body = body.to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            serve(stream, status, &body)
        });
        Self { addr, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for the request to be served and return its raw text.
    pub fn join(self) -> String {
        self.handle.join().expect("stub server thread")
    }

    /// Base URL of a loopback port nobody listens on.
    pub fn closed_base_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        format!("http://{addr}")
    }
}

fn serve(stream: TcpStream, status: u16, body: &str) -> String {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).expect("read header") == 0 {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().expect("content length");
        }
        let end_of_headers = line == "\r\n";
        request.push_str(&line);
        if end_of_headers {
            break;
        }
    }
    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload).expect("read body");
    request.push_str(&String::from_utf8_lossy(&payload));

    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = stream;
    stream
        .write_all(response.as_bytes())
        .expect("write response");
    stream.flush().expect("flush response");
    request
}
