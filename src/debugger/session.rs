use crate::error::{Error, Result};
use log::{debug, info, trace, warn};
use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The command that keeps the emulator running until a breakpoint or a wake up.
pub const RUN_COMMAND: &str = "run";

const STRAY_PROMPT_WAIT_MS: u64 = 50;
/// How often an idle worker checks whether the emulator is still connected.
const IDLE_POLL_MS: u64 = 100;
const IDLE_PEEK_MS: u64 = 1;

/// Called once with the reason when the connection is lost.
pub type CloseHook = Box<dyn FnOnce(String) + Send>;

/// Request/response transport to the emulator.
///
/// Responses are correlated 1:1 with requests in submission order. Callers block until their
/// response arrives, so a sequence of calls is a sequential pipeline by construction.
pub trait CommandChannel: Send {
    /// Send one command and wait for its textual response.
    fn send(&mut self, command: &str) -> Result<String>;

    /// Let the emulator run and wait until it stops; the response is the stop reason.
    fn run(&mut self) -> Result<String>;

    /// Wait until the channel has been idle for `period`.
    fn wait_until_quiet(&mut self, _period: Duration) -> Result<()> {
        Ok(())
    }

    /// Close the transport, pending and later requests fail with `ChannelClosed`.
    fn shutdown(&mut self) {}

    /// Register `hook` for a connection loss that was not caused by `shutdown`.
    fn on_close(&mut self, _hook: CloseHook) {}

    /// Like `send`, but a response starting with `Error` becomes a protocol error.
    fn send_checked(&mut self, command: &str) -> Result<String> {
        let response = self.send(command)?;
        if is_error_response(&response) {
            return Err(Error::protocol(command, response));
        }
        Ok(response)
    }

    /// `read-memory`, answered with `len` bytes as contiguous hex pairs.
    fn read_memory(&mut self, addr: u16, len: u16) -> Result<Vec<u8>> {
        let command = format!("read-memory {} {}", addr, len);
        let response = self.send_checked(&command)?;
        let hex: Vec<u8> = response.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        if hex.len() != 2 * len as usize {
            return Err(Error::protocol(command, response));
        }
        hex.chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|p| u8::from_str_radix(p, 16).ok())
                    .ok_or_else(|| Error::protocol(&command, &response))
            })
            .collect()
    }

    /// Little endian word at `addr`.
    fn read_word(&mut self, addr: u16) -> Result<u16> {
        let bytes = self.read_memory(addr, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

impl<T: CommandChannel + ?Sized> CommandChannel for Box<T> {
    fn send(&mut self, command: &str) -> Result<String> {
        (**self).send(command)
    }

    fn run(&mut self) -> Result<String> {
        (**self).run()
    }

    fn wait_until_quiet(&mut self, period: Duration) -> Result<()> {
        (**self).wait_until_quiet(period)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn on_close(&mut self, hook: CloseHook) {
        (**self).on_close(hook)
    }

    fn send_checked(&mut self, command: &str) -> Result<String> {
        (**self).send_checked(command)
    }

    fn read_memory(&mut self, addr: u16, len: u16) -> Result<Vec<u8>> {
        (**self).read_memory(addr, len)
    }
}

/// ZEsarUX reports failures in-band as text starting with `Error`.
pub fn is_error_response(response: &str) -> bool {
    let head = response.trim_start();
    head.starts_with("Error") || head.starts_with("ERROR")
}

enum Job {
    Command {
        text: String,
        interruptable: bool,
        reply: Sender<Result<String>>,
    },
    WhenIdle(Box<dyn FnOnce() + Send>),
}

struct QueueState {
    jobs: VecDeque<Job>,
    busy: bool,
    closed: Option<String>,
    last_change: Instant,
    on_close: Option<CloseHook>,
}

struct Shared {
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every queued command; `notify` runs the close hook.
    fn close(&self, reason: &str, notify: bool) {
        let mut state = self.lock();
        let mut hook = None;
        if state.closed.is_none() {
            warn!(target: "zesarux", "channel closed: {}", reason);
            state.closed = Some(reason.to_string());
            hook = state.on_close.take().filter(|_| notify);
        }
        for job in state.jobs.drain(..) {
            if let Job::Command { reply, .. } = job {
                let _ = reply.send(Err(Error::ChannelClosed(reason.to_string())));
            }
        }
        state.last_change = Instant::now();
        self.changed.notify_all();
        drop(state);
        if let Some(hook) = hook {
            hook(reason.to_string());
        }
    }
}

/// Response handle of a queued command.
pub struct PendingReply {
    command: String,
    rx: Receiver<Result<String>>,
}

impl PendingReply {
    pub fn wait(self) -> Result<String> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(Error::ChannelClosed(format!(
                "no response to `{}`",
                self.command
            )))
        })
    }
}

/// Out-of-band access to the socket, usable while another thread waits on `run`.
#[derive(Clone)]
pub struct Interrupter {
    writer: Arc<Mutex<TcpStream>>,
}

impl Interrupter {
    /// Write an empty line, which makes ZEsarUX return from a running `run` command.
    pub fn send_blank(&self) -> Result<()> {
        debug!(target: "zesarux", "-> <blank>");
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// TCP connection to the ZEsarUX remote command port.
pub struct ZesaruxSocket {
    shared: Arc<Shared>,
    interrupter: Interrupter,
    stream: TcpStream,
    worker: Option<JoinHandle<()>>,
}

impl ZesaruxSocket {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidArgument(format!("cannot resolve {}:{}", host, port)))?;
        info!(target: "zesarux", "connecting to {}", addr);
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        Self::from_stream(stream, timeout)
    }

    /// Wrap an already connected stream; reads the greeting up to the first prompt.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self> {
        stream.set_nodelay(true)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        stream.set_read_timeout(Some(timeout))?;
        let greeting = read_response(&mut reader).map_err(|e| closed_by(e, "greeting"))?;
        trace!(target: "zesarux", "greeting: {:?}", greeting);

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                busy: false,
                closed: None,
                last_change: Instant::now(),
                on_close: None,
            }),
            changed: Condvar::new(),
        });
        let writer = Arc::new(Mutex::new(stream.try_clone()?));
        let worker = Worker {
            shared: shared.clone(),
            reader,
            writer: writer.clone(),
            timeout,
        };
        let handle = thread::Builder::new()
            .name("zesarux-socket".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            interrupter: Interrupter { writer },
            stream,
            worker: Some(handle),
        })
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(reason) = &state.closed {
            return Err(Error::ChannelClosed(reason.clone()));
        }
        state.jobs.push_back(job);
        state.last_change = Instant::now();
        self.shared.changed.notify_all();
        Ok(())
    }

    fn queue_command(&self, command: &str, interruptable: bool) -> Result<PendingReply> {
        let (reply, rx) = mpsc::channel();
        self.enqueue(Job::Command {
            text: command.to_string(),
            interruptable,
            reply,
        })?;
        Ok(PendingReply {
            command: command.to_string(),
            rx,
        })
    }

    /// Queue a command; it is dispatched after every command queued before it.
    pub fn send_command(&self, command: &str) -> Result<PendingReply> {
        self.queue_command(command, false)
    }

    /// Queue `run` without a read timeout, it only returns when the emulator stops.
    pub fn send_interruptable_run_cmd(&self) -> Result<PendingReply> {
        self.queue_command(RUN_COMMAND, true)
    }

    /// Run `callback` on the socket thread once all commands queued so far are answered.
    ///
    /// The callback must not wait on a reply of this socket.
    pub fn execute_when_queue_is_empty(&self, callback: impl FnOnce() + Send + 'static) -> Result<()> {
        self.enqueue(Job::WhenIdle(Box::new(callback)))
    }

    pub fn send_blank(&self) -> Result<()> {
        self.interrupter.send_blank()
    }

    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Block until the queue has been empty and idle for `period`.
    pub fn wait_until_quiet(&self, period: Duration) -> Result<()> {
        let mut state = self.shared.lock();
        loop {
            if let Some(reason) = &state.closed {
                return Err(Error::ChannelClosed(reason.clone()));
            }
            if state.jobs.is_empty() && !state.busy {
                let idle = state.last_change.elapsed();
                if idle >= period {
                    return Ok(());
                }
                state = self
                    .shared
                    .changed
                    .wait_timeout(state, period - idle)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            } else {
                state = self
                    .shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed.is_some()
    }

    /// Run `hook` when the emulator drops the connection or stops answering.
    ///
    /// Runs right away if that already happened. `close` never runs it.
    pub fn set_close_hook(&self, hook: impl FnOnce(String) + Send + 'static) {
        let mut state = self.shared.lock();
        match state.closed.clone() {
            Some(reason) => {
                drop(state);
                hook(reason);
            }
            None => state.on_close = Some(Box::new(hook)),
        }
    }

    pub fn close(&mut self) {
        self.shared.close("closed by the debugger", false);
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ZesaruxSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl CommandChannel for ZesaruxSocket {
    fn send(&mut self, command: &str) -> Result<String> {
        self.send_command(command)?.wait()
    }

    fn run(&mut self) -> Result<String> {
        self.send_interruptable_run_cmd()?.wait()
    }

    fn wait_until_quiet(&mut self, period: Duration) -> Result<()> {
        ZesaruxSocket::wait_until_quiet(self, period)
    }

    fn shutdown(&mut self) {
        self.close();
    }

    fn on_close(&mut self, hook: CloseHook) {
        self.set_close_hook(hook);
    }
}

struct Worker {
    shared: Arc<Shared>,
    reader: BufReader<TcpStream>,
    writer: Arc<Mutex<TcpStream>>,
    timeout: Duration,
}

impl Worker {
    fn run(mut self) {
        while let Some(job) = self.next_job() {
            match job {
                Job::WhenIdle(callback) => callback(),
                Job::Command {
                    text,
                    interruptable,
                    reply,
                } => {
                    let result = self.execute(&text, interruptable);
                    if let Err(ref e) = result {
                        let reason = match e {
                            Error::ChannelClosed(reason) => reason.clone(),
                            other => other.to_string(),
                        };
                        self.shared.close(&reason, true);
                    }
                    let _ = reply.send(result);
                }
            }
            let mut state = self.shared.lock();
            state.busy = false;
            state.last_change = Instant::now();
            self.shared.changed.notify_all();
        }
    }

    fn next_job(&mut self) -> Option<Job> {
        loop {
            {
                let mut state = self.shared.lock();
                if state.closed.is_some() {
                    return None;
                }
                if let Some(job) = state.jobs.pop_front() {
                    state.busy = true;
                    state.last_change = Instant::now();
                    self.shared.changed.notify_all();
                    return Some(job);
                }
                let (state, wait) = self
                    .shared
                    .changed
                    .wait_timeout(state, Duration::from_millis(IDLE_POLL_MS))
                    .unwrap_or_else(|e| e.into_inner());
                if !wait.timed_out() || !state.jobs.is_empty() || state.closed.is_some() {
                    continue;
                }
            }
            if let Err(reason) = self.check_idle_connection() {
                self.shared.close(&reason, true);
            }
        }
    }

    /// Notice an emulator that went away while nothing was asked, and drop unsolicited
    /// prompts such as the answer to a pause sent while stopped.
    fn check_idle_connection(&mut self) -> std::result::Result<(), String> {
        if !self.reader.buffer().is_empty() {
            return self.drain_stray_prompts().map_err(|e| e.to_string());
        }
        let stream = self.reader.get_ref();
        stream
            .set_read_timeout(Some(Duration::from_millis(IDLE_PEEK_MS)))
            .map_err(|e| e.to_string())?;
        match stream.peek(&mut [0u8; 1]) {
            Ok(0) => Err("connection closed by the emulator".to_string()),
            Ok(_) => self.drain_stray_prompts().map_err(|e| e.to_string()),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn execute(&mut self, command: &str, interruptable: bool) -> Result<String> {
        debug!(target: "zesarux", "-> {}", command);
        let read_timeout = if interruptable { None } else { Some(self.timeout) };
        self.reader.get_ref().set_read_timeout(read_timeout)?;
        {
            let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
            writer.write_all(command.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        let response = read_response(&mut self.reader).map_err(|e| closed_by(e, command))?;
        trace!(target: "zesarux", "<- {:?}", response);
        if interruptable {
            self.drain_stray_prompts()?;
        }
        Ok(response)
    }

    /// A blank line sent to stop `run` may be answered with one more prompt.
    fn drain_stray_prompts(&mut self) -> Result<()> {
        self.reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(STRAY_PROMPT_WAIT_MS)))?;
        match read_response(&mut self.reader) {
            Ok(extra) => trace!(target: "zesarux", "discarded {:?}", extra),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(closed_by(e, RUN_COMMAND)),
        }
        Ok(())
    }
}

fn closed_by(error: io::Error, command: &str) -> Error {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            Error::ChannelClosed(format!("no response to `{}` in time", command))
        }
        io::ErrorKind::UnexpectedEof => {
            Error::ChannelClosed("connection closed by the emulator".to_string())
        }
        _ => Error::Io(error),
    }
}

/// The prompt is `command> `, or `command@cpu-step> ` while ZEsarUX is in step mode.
fn ends_with_prompt(data: &[u8]) -> bool {
    if !data.ends_with(b"> ") {
        return false;
    }
    let last_line = match data.iter().rposition(|&b| b == b'\n') {
        Some(pos) => &data[pos + 1..],
        None => data,
    };
    last_line.starts_with(b"command")
}

/// Read until the prompt and return the text before it, without the trailing newline.
fn read_response(reader: &mut impl Read) -> io::Result<String> {
    let mut data = Vec::with_capacity(256);
    let mut buf = [0u8; 1024];
    while !ends_with_prompt(&data) {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&buf[..n]);
    }
    let body = match data.iter().rposition(|&b| b == b'\n') {
        Some(pos) => &data[..pos],
        None => &[][..],
    };
    Ok(String::from_utf8_lossy(body).trim_end_matches('\r').to_string())
}
