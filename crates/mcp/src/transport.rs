//! Byte-stream transports carrying newline-delimited JSON-RPC.
//!
//! A [`Transport`] only knows how to open a pair of streams; framing and the
//! request/response discipline live in [`Client`](crate::Client) and
//! [`serve`](crate::serve). Child-process pipes and TCP sockets are
//! interchangeable as long as both ends speak MCP.

use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::error::{Error, Result};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open, not yet initialized, stream pair.
pub struct Connection {
    pub(crate) reader: BoxedReader,
    pub(crate) writer: BoxedWriter,
    pub(crate) child: Option<Child>,
}

impl Connection {
    /// Wrap an already open pair of streams.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        }
    }

    /// Attach the process that owns the other end of the streams.
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

/// Something that can open a stream pair to a tool host.
pub trait Transport: Send {
    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;

    /// Open the streams. Dropping the returned future releases anything
    /// acquired so far.
    fn open(self) -> impl Future<Output = Result<Connection>> + Send;
}

impl Transport for Connection {
    fn describe(&self) -> String {
        "in-memory streams".to_string()
    }

    async fn open(self) -> Result<Connection> {
        Ok(self)
    }
}

/// A tool host spawned as a child process, spoken to over stdin/stdout.
#[derive(Debug, Clone)]
pub struct ChildProcess {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ChildProcess {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl Transport for ChildProcess {
    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    async fn open(self) -> Result<Connection> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| Error::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let stdin = process.stdin.take().ok_or_else(|| Error::Spawn {
            command: self.command.clone(),
            source: std::io::Error::other("failed to capture stdin"),
        })?;

        let stdout = process.stdout.take().ok_or_else(|| Error::Spawn {
            command: self.command.clone(),
            source: std::io::Error::other("failed to capture stdout"),
        })?;

        Ok(Connection::from_streams(stdout, stdin).with_child(process))
    }
}

/// A tool host listening on a TCP socket.
#[derive(Debug, Clone)]
pub struct Tcp {
    pub address: String,
}

impl Tcp {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Transport for Tcp {
    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }

    async fn open(self) -> Result<Connection> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| Error::Connect {
                address: self.address.clone(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Connection::from_streams(reader, writer))
    }
}
