//! # KATCP
//!
//! A blocking client for the KATCP monitor and control protocol used by
//! [CASPER](https://casper.berkeley.edu/) FPGA boards running `tcpborphserver`.
//! Alongside the wire grammar in [`wire`], this exposes the small vocabulary of
//! requests a correlator control program needs: programming bof files, listing
//! devices, and reading and writing gateware registers.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod wire;

pub use wire::{Kind, Message};

use std::{
    io::{BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, trace};

/// The TCP port `tcpborphserver` listens on
pub const DEFAULT_PORT: u16 = 7147;

const DEFAULT_TIMEOUT: f32 = 5.0;
// Programming a bitstream can stall the server for a while
const PROGRAM_TIMEOUT: f32 = 60.0;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Internal system IO error")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] wire::Error),
    #[error("Request `{name}` came back `{status}`: {message}")]
    RequestFailed {
        name: String,
        status: String,
        message: String,
    },
    #[error("The reply to `{0}` was missing arguments we expected")]
    BadReply(String),
    #[error("Reply `{got}` arrived while waiting on `{expected}`: {message}")]
    UnexpectedReply {
        expected: String,
        got: String,
        message: String,
    },
    #[error("Read of `{device}` returned {got} bytes, expected {expected}")]
    ShortRead {
        device: String,
        expected: usize,
        got: usize,
    },
    #[error("The server closed the connection")]
    ConnectionClosed,
}

/// A blocking KATCP client connection
#[derive(Debug)]
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    /// Connect to a KATCP server, usually on port [`DEFAULT_PORT`]
    /// # Errors
    /// Returns an error if the TCP connection fails
    pub fn connect(addr: SocketAddr) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)?;
        // Request lines are tiny, don't let Nagle sit on them
        stream.set_nodelay(true)?;
        let timeout = Duration::from_secs_f32(DEFAULT_TIMEOUT);
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Set the read and write timeouts on the underlying socket
    /// # Errors
    /// Returns an error if the socket rejects the timeout
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.reader.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        self.writer.write_all(&msg.unparse())?;
        self.writer.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Message, Error> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = self.reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            // Blank lines between messages are allowed
            if !line.is_empty() {
                return Ok(Message::parse(&line)?);
            }
        }
    }

    /// Perform one request-reply exchange. Informs belonging to the request
    /// are collected and returned along with the reply; asynchronous informs
    /// (`#log`, `#version`, ...) are logged and skipped.
    /// # Errors
    /// Returns [`Error::RequestFailed`] when the server replies anything other
    /// than `ok`, [`Error::UnexpectedReply`] when a reply names a different
    /// request, or the underlying IO/parse errors
    pub fn request(
        &mut self,
        name: &str,
        arguments: &[&[u8]],
    ) -> Result<(Vec<Message>, Message), Error> {
        trace!(name, "sending request");
        self.send(&Message::request(name, arguments))?;
        let mut informs = Vec::new();
        loop {
            let msg = self.recv()?;
            match msg.kind {
                Kind::Inform if msg.name == name => informs.push(msg),
                Kind::Inform => {
                    debug!(name = %msg.name, "skipping unrelated inform");
                }
                Kind::Reply if msg.name == name => {
                    let status = msg
                        .arg(0)
                        .map(|s| String::from_utf8_lossy(s).into_owned())
                        .ok_or_else(|| Error::BadReply(name.to_string()))?;
                    if status == "ok" {
                        return Ok((informs, msg));
                    }
                    let message = msg.arguments[1..]
                        .iter()
                        .map(|a| String::from_utf8_lossy(a).into_owned())
                        .collect::<Vec<_>>()
                        .join(" ");
                    return Err(Error::RequestFailed {
                        name: name.to_string(),
                        status,
                        message,
                    });
                }
                Kind::Reply => {
                    // A reply naming another request means the exchange is
                    // desynchronized, usually a stale reply from a request
                    // that timed out earlier
                    let message = msg
                        .arguments
                        .iter()
                        .map(|a| String::from_utf8_lossy(a).into_owned())
                        .collect::<Vec<_>>()
                        .join(" ");
                    return Err(Error::UnexpectedReply {
                        expected: name.to_string(),
                        got: msg.name,
                        message,
                    });
                }
                Kind::Request => {
                    debug!(name = %msg.name, "ignoring request sent by the server");
                }
            }
        }
    }

    /// Protocol-level ping
    /// # Errors
    /// Returns an error if the server isn't responding
    pub fn watchdog(&mut self) -> Result<(), Error> {
        self.request("watchdog", &[])?;
        Ok(())
    }

    /// Whether a design is currently programmed and running. The server
    /// replies `ok` only once a bof file is up.
    /// # Errors
    /// Returns errors on IO failures (a `fail` reply is `Ok(false)`)
    pub fn status(&mut self) -> Result<bool, Error> {
        match self.request("status", &[]) {
            Ok(_) => Ok(true),
            Err(Error::RequestFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List the bof files resident on the server
    /// # Errors
    /// Returns errors on IO failures or malformed informs
    pub fn listbof(&mut self) -> Result<Vec<String>, Error> {
        let (informs, _) = self.request("listbof", &[])?;
        informs
            .iter()
            .map(|m| Ok(utf8_argument(m, 0)?.to_string()))
            .collect()
    }

    /// Program the FPGA with a bof file resident on the server
    /// # Errors
    /// Returns an error if the server fails to program the file
    pub fn progdev(&mut self, boffile: &str) -> Result<(), Error> {
        self.set_timeout(Some(Duration::from_secs_f32(PROGRAM_TIMEOUT)))?;
        let result = self
            .request("progdev", &[boffile.as_bytes()])
            .map(|_| ());
        self.set_timeout(Some(Duration::from_secs_f32(DEFAULT_TIMEOUT)))?;
        result
    }

    /// Deprogram the FPGA (`?progdev` with no argument clears the device)
    /// # Errors
    /// Returns an error if the server refuses
    pub fn deprogram(&mut self) -> Result<(), Error> {
        self.request("progdev", &[])?;
        Ok(())
    }

    /// List the devices of the running design with their sizes in bytes
    /// # Errors
    /// Returns errors on IO failures or malformed informs
    pub fn listdev(&mut self) -> Result<Vec<(String, u32)>, Error> {
        let (informs, _) = self.request("listdev", &[b"size"])?;
        informs
            .iter()
            .map(|m| {
                let name = utf8_argument(m, 0)?.to_string();
                let size = utf8_argument(m, 1)?
                    .parse()
                    .map_err(|_| Error::BadReply(m.name.clone()))?;
                Ok((name, size))
            })
            .collect()
    }

    /// Read `nbytes` bytes from `device` starting at byte `offset`
    /// # Errors
    /// Returns an error if the payload comes back the wrong size
    pub fn read(&mut self, device: &str, offset: usize, nbytes: usize) -> Result<Vec<u8>, Error> {
        let offset_arg = offset.to_string();
        let nbytes_arg = nbytes.to_string();
        let (_, reply) = self.request(
            "read",
            &[device.as_bytes(), offset_arg.as_bytes(), nbytes_arg.as_bytes()],
        )?;
        let payload = reply
            .arg(1)
            .ok_or_else(|| Error::BadReply("read".to_string()))?;
        if payload.len() != nbytes {
            return Err(Error::ShortRead {
                device: device.to_string(),
                expected: nbytes,
                got: payload.len(),
            });
        }
        Ok(payload.to_vec())
    }

    /// Write `data` to `device` starting at byte `offset`
    /// # Errors
    /// Returns an error if the server rejects the write
    pub fn write(&mut self, device: &str, offset: usize, data: &[u8]) -> Result<(), Error> {
        let offset_arg = offset.to_string();
        self.request(
            "write",
            &[device.as_bytes(), offset_arg.as_bytes(), data],
        )?;
        Ok(())
    }

    /// Read `nwords` 32-bit words from `device` starting at word `offset`.
    /// The server replies with one hex value per word.
    /// # Errors
    /// Returns errors on IO failures or malformed hex values
    pub fn wordread(
        &mut self,
        device: &str,
        word_offset: usize,
        nwords: usize,
    ) -> Result<Vec<u32>, Error> {
        let offset_arg = word_offset.to_string();
        let nwords_arg = nwords.to_string();
        let (_, reply) = self.request(
            "wordread",
            &[device.as_bytes(), offset_arg.as_bytes(), nwords_arg.as_bytes()],
        )?;
        (1..=nwords)
            .map(|idx| {
                let word = utf8_argument(&reply, idx)?;
                u32::from_str_radix(word.trim_start_matches("0x"), 16)
                    .map_err(|_| Error::BadReply("wordread".to_string()))
            })
            .collect()
    }

    /// Write one 32-bit word to `device` at word `offset`
    /// # Errors
    /// Returns an error if the server rejects the write
    pub fn wordwrite(&mut self, device: &str, word_offset: usize, value: u32) -> Result<(), Error> {
        let offset_arg = word_offset.to_string();
        let value_arg = format!("{value:#x}");
        self.request(
            "wordwrite",
            &[device.as_bytes(), offset_arg.as_bytes(), value_arg.as_bytes()],
        )?;
        Ok(())
    }
}

fn utf8_argument(msg: &Message, idx: usize) -> Result<&str, Error> {
    msg.arg(idx)
        .and_then(|a| std::str::from_utf8(a).ok())
        .ok_or_else(|| Error::BadReply(msg.name.clone()))
}
