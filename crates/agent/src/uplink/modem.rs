//! Serial modem uplink driven by AT commands.
//!
//! [`AtModem`] is a blocking command/response driver over any byte
//! transport implementing [`Read`] + [`Write`]: a real serial port opened
//! with [`open_serial`], or a scripted transport in tests. It speaks the
//! single-connection TCP command set shared by the ESP8266 AT firmware and
//! the SIM800 family:
//!
//! ```text
//! AT+CIPSTART="TCP","api.thingspeak.com",80   -> CONNECT / CONNECT OK, OK
//! AT+CIPSEND=<len>                            -> ">" prompt
//! <literal HTTP GET request>                  -> SEND OK
//! <+IPD,n:HTTP/1.1 200 OK ... body>           -> CLOSED
//! ```
//!
//! [`ModemUplink`] adapts the driver to the async [`Uplink`] trait by running
//! each exchange on the blocking thread pool.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use penwatch_core::fields::FieldMap;
use penwatch_core::reading::Reading;
use penwatch_core::thingspeak::{self, HttpResponse, WriteOutcome};

use super::{Uplink, UplinkError};

/// Default deadline for a single AT command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default serial baud rate (ESP-01 and SIM800 factory setting).
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout of the serial port itself; bounds how long a single read
/// blocks before the command deadline is re-checked.
const PORT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off when the transport has no data and does not block.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Initialisation sequence: attention, echo off, single-connection mode.
const INIT_COMMANDS: [&str; 3] = ["AT", "ATE0", "AT+CIPMUX=0"];

/// Error type for modem exchanges.
#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to open serial port: {0}")]
    Open(#[from] serialport::Error),

    #[error("timed out waiting for response to {command}")]
    Timeout { command: String },

    #[error("{command} rejected: {response}")]
    Rejected { command: String, response: String },

    #[error("bad HTTP response: {0}")]
    Response(#[from] penwatch_core::CoreError),

    #[error("modem lock poisoned")]
    Poisoned,
}

fn is_error_line(line: &str) -> bool {
    line.starts_with("ERROR")
        || line.starts_with("+CME ERROR")
        || line.contains("FAIL")
}

/// Open a serial port for the modem.
pub fn open_serial(path: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>, ModemError> {
    let port = serialport::new(path, baud_rate)
        .timeout(PORT_POLL_TIMEOUT)
        .flow_control(serialport::FlowControl::None)
        .open()?;
    Ok(port)
}

enum Frame {
    Data(Vec<u8>),
    Line(String),
}

/// Blocking AT command driver.
pub struct AtModem<T> {
    port: T,
    buf: Vec<u8>,
    timeout: Duration,
    initialized: bool,
}

impl<T: Read + Write> AtModem<T> {
    pub fn new(port: T, timeout: Duration) -> Self {
        Self {
            port,
            buf: Vec::new(),
            timeout,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the initialisation sequence. Echo is disabled so command lines
    /// do not come back as response lines.
    pub fn init(&mut self) -> Result<(), ModemError> {
        for cmd in INIT_COMMANDS {
            self.command(cmd, &["OK"])?;
        }
        self.initialized = true;
        tracing::info!("Modem initialised");
        Ok(())
    }

    /// Send `cmd` and collect response lines until one starts with a
    /// terminator. Error lines fail the command.
    pub fn command(&mut self, cmd: &str, terminators: &[&str]) -> Result<Vec<String>, ModemError> {
        self.send_line(cmd)?;
        let deadline = Instant::now() + self.timeout;

        let mut lines = Vec::new();
        loop {
            let line = self.next_line(deadline, cmd)?;
            if line.is_empty() {
                continue;
            }
            if is_error_line(&line) {
                return Err(ModemError::Rejected {
                    command: cmd.to_string(),
                    response: line,
                });
            }
            let done = terminators.iter().any(|t| line.starts_with(t));
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Issue an HTTP GET for `path` over a fresh TCP connection.
    pub fn http_get(&mut self, host: &str, port: u16, path: &str) -> Result<HttpResponse, ModemError> {
        let request = thingspeak::http_get_request(host, path);

        self.open_tcp(host, port)?;
        let result = self.exchange(&request);

        match &result {
            Ok((_, true)) => {}
            // Peer kept the socket open or the exchange failed halfway.
            _ => {
                if let Err(e) = self.command("AT+CIPCLOSE", &["CLOSE OK", "OK"]) {
                    tracing::debug!(error = %e, "AT+CIPCLOSE failed");
                }
            }
        }

        let (raw, _) = result?;
        Ok(thingspeak::parse_http_response(&raw)?)
    }

    fn open_tcp(&mut self, host: &str, port: u16) -> Result<(), ModemError> {
        let cmd = format!("AT+CIPSTART=\"TCP\",\"{host}\",{port}");
        self.send_line(&cmd)?;
        let deadline = Instant::now() + self.timeout;

        // ESP8266 answers CONNECT then OK; SIM800 answers OK then CONNECT OK.
        let (mut connected, mut ok) = (false, false);
        while !(connected && ok) {
            let line = self.next_line(deadline, &cmd)?;
            if line.starts_with("ALREADY CONNECT") {
                // ESP8266 follows this with ERROR, SIM800 with OK. Either
                // way the socket is usable once the reply is complete.
                loop {
                    let tail = self.next_line(deadline, &cmd)?;
                    if tail == "OK" || is_error_line(&tail) {
                        break;
                    }
                }
                tracing::debug!(host, port, "Reusing open TCP connection");
                return Ok(());
            }
            if is_error_line(&line) {
                return Err(ModemError::Rejected {
                    command: cmd,
                    response: line,
                });
            }
            if line == "OK" {
                ok = true;
            } else if line.starts_with("CONNECT") {
                connected = true;
            }
        }

        tracing::debug!(host, port, "TCP connection open");
        Ok(())
    }

    /// Send the request and read the raw response. The flag reports whether
    /// the peer closed the connection.
    fn exchange(&mut self, request: &str) -> Result<(String, bool), ModemError> {
        let cmd = format!("AT+CIPSEND={}", request.len());
        self.send_line(&cmd)?;
        let deadline = Instant::now() + self.timeout;
        self.wait_prompt(deadline, &cmd)?;

        self.port.write_all(request.as_bytes())?;
        self.port.flush()?;

        loop {
            let line = self.next_line(deadline, "request payload")?;
            if line.starts_with("SEND OK") {
                break;
            }
            if is_error_line(&line) {
                return Err(ModemError::Rejected {
                    command: cmd,
                    response: line,
                });
            }
        }

        self.read_response(Instant::now() + self.timeout)
    }

    /// Collect the reply until the peer closes. `+IPD,n:` frames carry
    /// exactly `n` raw payload bytes, which need not end in a line break,
    /// so `CLOSED` is only recognised between frames. Modems that forward
    /// data unframed are read line by line instead.
    fn read_response(&mut self, deadline: Instant) -> Result<(String, bool), ModemError> {
        let mut framed: Vec<u8> = Vec::new();
        let mut unframed: Vec<String> = Vec::new();

        loop {
            let frame = match self.take_frame() {
                Some(frame) => frame,
                None => {
                    match self.fill(deadline, "HTTP response") {
                        Ok(()) => {}
                        // Keep whatever arrived if the peer never closed.
                        Err(ModemError::Timeout { .. }) if !(framed.is_empty() && unframed.is_empty()) => {
                            return Ok((Self::collect(framed, unframed), false));
                        }
                        Err(e) => return Err(e),
                    }
                    continue;
                }
            };

            match frame {
                Frame::Data(data) => framed.extend_from_slice(&data),
                Frame::Line(line) if line == "CLOSED" || line.ends_with(",CLOSED") => {
                    return Ok((Self::collect(framed, unframed), true));
                }
                // Line breaks and notices between frames.
                Frame::Line(_) if !framed.is_empty() => {}
                Frame::Line(line) => {
                    if !unframed.is_empty() || line.starts_with("HTTP/") {
                        unframed.push(line);
                    }
                }
            }
        }
    }

    fn collect(framed: Vec<u8>, unframed: Vec<String>) -> String {
        if framed.is_empty() {
            unframed.join("\r\n")
        } else {
            String::from_utf8_lossy(&framed).into_owned()
        }
    }

    /// Split one complete `+IPD` frame or line off the buffer. `None` means
    /// more bytes are needed.
    fn take_frame(&mut self) -> Option<Frame> {
        const IPD: &[u8] = b"+IPD,";

        if self.buf.starts_with(IPD) {
            let colon = self.buf.iter().position(|b| *b == b':')?;
            // Multi-connection firmware prefixes the link id: +IPD,<id>,<len>:
            let len = std::str::from_utf8(&self.buf[IPD.len()..colon])
                .ok()
                .and_then(|h| h.rsplit(',').next())
                .and_then(|n| n.trim().parse::<usize>().ok());
            if let Some(len) = len {
                let end = colon + 1 + len;
                if self.buf.len() < end {
                    return None;
                }
                let data: Vec<u8> = self.buf.drain(..end).skip(colon + 1).collect();
                tracing::trace!(len, "modem -> +IPD frame");
                return Some(Frame::Data(data));
            }
        } else if IPD.starts_with(&self.buf) {
            // Empty, or a frame header cut short by the serial read.
            return None;
        }

        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        tracing::trace!(line = %line, "modem ->");
        Some(Frame::Line(line))
    }

    fn send_line(&mut self, cmd: &str) -> Result<(), ModemError> {
        // Drop unsolicited output left over from the previous exchange.
        self.buf.clear();
        tracing::trace!(cmd, "modem <-");
        self.port.write_all(cmd.as_bytes())?;
        self.port.write_all(b"\r\n")?;
        self.port.flush()?;
        Ok(())
    }

    /// Next `\n`-terminated line with the trailing `\r` removed. Empty lines
    /// are returned as-is; HTTP header/body separation depends on them.
    fn next_line(&mut self, deadline: Instant, command: &str) -> Result<String, ModemError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                tracing::trace!(line = %line, "modem ->");
                return Ok(line);
            }
            self.fill(deadline, command)?;
        }
    }

    fn wait_prompt(&mut self, deadline: Instant, command: &str) -> Result<(), ModemError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'>') {
                self.buf.drain(..=pos);
                return Ok(());
            }
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if is_error_line(&line) {
                    return Err(ModemError::Rejected {
                        command: command.to_string(),
                        response: line,
                    });
                }
                continue;
            }
            self.fill(deadline, command)?;
        }
    }

    fn fill(&mut self, deadline: Instant, command: &str) -> Result<(), ModemError> {
        if Instant::now() >= deadline {
            return Err(ModemError::Timeout {
                command: command.to_string(),
            });
        }

        let mut chunk = [0u8; 256];
        match self.port.read(&mut chunk) {
            Ok(0) => std::thread::sleep(IDLE_SLEEP),
            Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(IDLE_SLEEP),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

/// [`Uplink`] that writes channel fields through an [`AtModem`].
pub struct ModemUplink<T> {
    modem: Arc<Mutex<AtModem<T>>>,
    host: String,
    port: u16,
    api_key: String,
    fields: FieldMap,
}

impl<T> ModemUplink<T>
where
    T: Read + Write + Send + 'static,
{
    pub fn new(
        modem: AtModem<T>,
        host: impl Into<String>,
        port: u16,
        api_key: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        Self {
            modem: Arc::new(Mutex::new(modem)),
            host: host.into(),
            port,
            api_key: api_key.into(),
            fields,
        }
    }
}

#[async_trait]
impl<T> Uplink for ModemUplink<T>
where
    T: Read + Write + Send + 'static,
{
    fn name(&self) -> &'static str {
        "modem"
    }

    async fn publish(&mut self, reading: &Reading) -> Result<WriteOutcome, UplinkError> {
        let modem = Arc::clone(&self.modem);
        let host = self.host.clone();
        let port = self.port;
        let path = thingspeak::update_path(&self.api_key, &self.fields.encode(reading));

        let response = tokio::task::spawn_blocking(move || -> Result<HttpResponse, ModemError> {
            let mut modem = modem.lock().map_err(|_| ModemError::Poisoned)?;
            if !modem.is_initialized() {
                modem.init()?;
            }
            let result = modem.http_get(&host, port, &path);
            if result.is_err() {
                // The modem may have reset; re-run the init sequence next time.
                modem.initialized = false;
            }
            result
        })
        .await??;

        Ok(WriteOutcome::from_response(response.status, &response.body))
    }
}
