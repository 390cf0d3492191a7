use super::protocol::{write_message, DapMessage, DapMessageContent};
use crate::config::LaunchConfig;
use crate::debugger::{
    BreakpointRequest, CommandChannel, DebugContext, DebugEvent, Events, ExecutionGuard, Frame,
    Interrupter, RunMode, StepResult, ZesaruxSocket,
};
use crate::error::{Error, Result};
use crate::parser::{parse_number, Labels, Listing};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// Debug session as driven by the adapter.
pub type Session = DebugContext<Box<dyn CommandChannel>>;

const THREAD_ID: u64 = 1;
const REGISTERS_REFERENCE: u64 = 1;
/// `variablesReference` of the data stack of frame `n` is this plus `n`.
const FRAME_DATA_REFERENCE: u64 = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Message writer shared by the request loop, the execution threads and the event forwarder.
pub struct DapOutput<W: Write> {
    writer: W,
    seq: u64,
}

impl<W: Write> DapOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, seq: 0 }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn send_response(
        &mut self,
        request_seq: u64,
        command: &str,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success,
                command: command.to_string(),
                message,
                body,
            },
        };
        self.send_message(&msg);
    }

    pub fn send_event(&mut self, event: &str, body: Option<Value>) {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "event".to_string(),
            content: DapMessageContent::Event {
                event: event.to_string(),
                body,
            },
        };
        self.send_message(&msg);
    }

    pub fn send_output(&mut self, category: &str, text: &str) {
        let mut output = text.to_string();
        if !output.ends_with('\n') {
            output.push('\n');
        }
        self.send_event(
            "output",
            Some(json!({ "category": category, "output": output })),
        );
    }

    fn send_message(&mut self, msg: &DapMessage) {
        if let Err(err) = write_message(&mut self.writer, msg) {
            error!(target: "dap", "failed to send message {}: {}", msg.seq, err);
        }
    }
}

/// Turn a debug session event into DAP events.
pub fn forward_event<W: Write>(output: &mut DapOutput<W>, event: DebugEvent) {
    match event {
        DebugEvent::Initialized => output.send_event("initialized", None),
        DebugEvent::Terminated => output.send_event("terminated", None),
        DebugEvent::Error(msg) => output.send_output("stderr", &msg),
        DebugEvent::Warning(msg) | DebugEvent::Log(msg) => output.send_output("console", &msg),
        DebugEvent::Coverage(addresses) => {
            let addresses: Vec<u16> = addresses.into_iter().collect();
            output.send_event("coverage", Some(json!({ "addresses": addresses })));
        }
    }
}

/// Report the end of a step or continue: console summary, then `stopped`.
pub fn report_stop<W: Write>(output: &mut DapOutput<W>, mode: RunMode, result: &StepResult) {
    if result.is_error() {
        output.send_output("stderr", result.error.as_deref().unwrap_or_default());
    } else {
        output.send_output("console", &result.summary());
    }
    let mut body = json!({
        "reason": mode.stop_reason(),
        "threadId": THREAD_ID,
        "allThreadsStopped": true,
    });
    if let Some(reason) = &result.reason {
        body["description"] = json!(reason);
        body["text"] = json!(reason);
    }
    output.send_event("stopped", Some(body));
}

fn find_listing<'a>(listings: &'a [Listing], source: &str) -> Option<&'a Listing> {
    let source = Path::new(source);
    listings
        .iter()
        .find(|l| l.path == source)
        .or_else(|| {
            listings
                .iter()
                .find(|l| l.path.file_name().is_some() && l.path.file_name() == source.file_name())
        })
}

pub struct DapServer<W: Write + Send + 'static> {
    output: Arc<Mutex<DapOutput<W>>>,
    context: Option<Arc<Mutex<Session>>>,
    interrupter: Option<Interrupter>,
    guard: ExecutionGuard,
    config: LaunchConfig,
    listings: Vec<Listing>,
    /// Breakpoint ids per source path.
    source_breakpoints: HashMap<String, Vec<u16>>,
    function_breakpoints: Vec<u16>,
}

impl<W: Write + Send + 'static> DapServer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            output: Arc::new(Mutex::new(DapOutput::new(writer))),
            context: None,
            interrupter: None,
            guard: ExecutionGuard::new(),
            config: LaunchConfig::default(),
            listings: Vec::new(),
            source_breakpoints: HashMap::new(),
            function_breakpoints: Vec::new(),
        }
    }

    /// Use an already connected session instead of connecting on `launch`.
    pub fn attach(
        &mut self,
        session: Session,
        interrupter: Option<Interrupter>,
        config: LaunchConfig,
        listings: Vec<Listing>,
    ) {
        self.context = Some(Arc::new(Mutex::new(session)));
        self.interrupter = interrupter;
        self.config = config;
        self.listings = listings;
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    pub fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    /// Forward session events to the client until every sender is gone.
    pub fn spawn_event_forwarder(&self, rx: Receiver<DebugEvent>) {
        let output = self.output.clone();
        let spawned = thread::Builder::new()
            .name("dap-events".to_string())
            .spawn(move || {
                for event in rx {
                    forward_event(&mut lock(&output), event);
                }
            });
        if let Err(err) = spawned {
            error!(target: "dap", "cannot start event forwarder: {}", err);
        }
    }

    fn respond(&self, seq: u64, command: &str, body: Option<Value>) {
        lock(&self.output).send_response(seq, command, true, None, body);
    }

    fn respond_error(&self, seq: u64, command: &str, message: String) {
        warn!(target: "dap", "{} failed: {}", command, message);
        lock(&self.output).send_response(seq, command, false, Some(message), None);
    }

    fn session(&self) -> Result<Arc<Mutex<Session>>> {
        self.context
            .clone()
            .ok_or_else(|| Error::InvalidArgument("not connected to ZEsarUX".to_string()))
    }

    /// The session, for requests that cannot wait for a running program to stop.
    fn stopped_session(&self) -> Result<Arc<Mutex<Session>>> {
        let context = self.session()?;
        if self.guard.is_running() {
            return Err(Error::Running);
        }
        Ok(context)
    }

    /// A lost connection ends the session whichever request noticed it.
    fn report_connection_loss(&self, err: &Error) {
        if let (Error::ChannelClosed(_), Some(context)) = (err, &self.context) {
            lock(context).report_error(err);
        }
    }

    /// Handle one message, false once the client disconnected.
    pub fn handle(&mut self, msg: DapMessage) -> bool {
        let DapMessageContent::Request { command, arguments } = msg.content else {
            debug!(target: "dap", "ignoring non-request message {}", msg.seq);
            return true;
        };
        let seq = msg.seq;
        let args = arguments.unwrap_or(Value::Null);
        debug!(target: "dap", "request #{} {}", seq, command);

        let result = match command.as_str() {
            "initialize" => Ok(Some(capabilities())),
            "launch" | "attach" => self.handle_launch(&args).map(|_| None),
            "setBreakpoints" => self.handle_set_breakpoints(&args).map(Some),
            "setFunctionBreakpoints" => self.handle_set_function_breakpoints(&args).map(Some),
            "configurationDone" => {
                if !self.config.stop_on_entry && self.context.is_some() {
                    return self.execute(seq, command, RunMode::Continue);
                }
                self.respond(seq, &command, None);
                if self.context.is_some() {
                    lock(&self.output).send_event(
                        "stopped",
                        Some(json!({
                            "reason": "entry",
                            "threadId": THREAD_ID,
                            "allThreadsStopped": true
                        })),
                    );
                }
                return true;
            }
            "threads" => Ok(Some(json!({
                "threads": [{ "id": THREAD_ID, "name": "Z80" }]
            }))),
            "stackTrace" => self.handle_stack_trace().map(Some),
            "scopes" => Ok(Some(scopes(&args))),
            "variables" => self.handle_variables(&args).map(Some),
            "setVariable" => self.handle_set_variable(&args).map(Some),
            "evaluate" => self.handle_evaluate(&args).map(Some),
            "continue" => return self.execute(seq, command, RunMode::Continue),
            "next" => return self.execute(seq, command, RunMode::StepOver),
            "stepIn" => return self.execute(seq, command, RunMode::StepInto),
            "stepOut" => return self.execute(seq, command, RunMode::StepOut),
            "stepBack" => return self.execute(seq, command, RunMode::StepBack),
            "reverseContinue" => return self.execute(seq, command, RunMode::ReverseContinue),
            "pause" => self.handle_pause().map(|_| None),
            "disconnect" => {
                self.shutdown();
                self.respond(seq, &command, None);
                return false;
            }
            _ => Err(Error::Unsupported(format!("request `{}`", command))),
        };

        match result {
            Ok(body) => self.respond(seq, &command, body),
            Err(err) => {
                self.report_connection_loss(&err);
                self.respond_error(seq, &command, err.to_string());
            }
        }
        true
    }

    /// Interrupt a running operation and end the session.
    pub fn shutdown(&mut self) {
        if self.guard.is_running() {
            if let Some(interrupter) = &self.interrupter {
                if let Err(err) = interrupter.send_blank() {
                    debug!(target: "dap", "interrupt on shutdown: {}", err);
                }
            }
        }
        if let Some(context) = self.context.take() {
            lock(&context).terminate();
        }
    }

    fn handle_launch(&mut self, args: &Value) -> Result<()> {
        let config: LaunchConfig = serde_json::from_value(args.clone())?;

        let mut labels = Labels::new();
        for path in &config.label_files {
            match labels.load_file(path) {
                Ok(count) => info!(target: "dap", "{} labels from {}", count, path.display()),
                Err(err) => lock(&self.output)
                    .send_output("console", &format!("cannot read {}: {}", path.display(), err)),
            }
        }
        let mut listings = Vec::new();
        for path in &config.list_files {
            match Listing::load(path) {
                Ok(listing) => listings.push(listing),
                Err(err) => lock(&self.output)
                    .send_output("console", &format!("cannot read {}: {}", path.display(), err)),
            }
        }

        let socket = ZesaruxSocket::connect(&config.hostname, config.port, config.socket_timeout())?;
        let interrupter = socket.interrupter();
        let (tx, rx) = mpsc::channel();
        self.spawn_event_forwarder(rx);

        let channel: Box<dyn CommandChannel> = Box::new(socket);
        let mut session = DebugContext::new(channel, &config, labels, Events::new(tx));
        session.init()?;
        self.attach(session, Some(interrupter), config, listings);
        Ok(())
    }

    fn set_breakpoints(
        session: &mut Session,
        requests: Vec<(Value, Option<u16>)>,
    ) -> (Vec<u16>, Vec<Value>) {
        let mut ids = Vec::new();
        let mut results = Vec::new();
        for (request, address) in requests {
            let mut result = json!({ "verified": false });
            if let Some(line) = request.get("line") {
                result["line"] = line.clone();
            }
            let Some(address) = address else {
                result["message"] = json!("no code at this location");
                results.push(result);
                continue;
            };
            let breakpoint = BreakpointRequest {
                address: Some(address),
                condition: request["condition"].as_str().map(str::to_string),
                log_message: request["logMessage"].as_str().map(str::to_string),
            };
            match session.set_breakpoint(breakpoint) {
                Ok(bp) if bp.verified => {
                    ids.push(bp.id);
                    result["id"] = json!(bp.id);
                    result["verified"] = json!(true);
                }
                Ok(bp) => result["message"] = json!(format!("rejected: {}", bp.native_condition)),
                Err(err) => result["message"] = json!(err.to_string()),
            }
            results.push(result);
        }
        (ids, results)
    }

    fn handle_set_breakpoints(&mut self, args: &Value) -> Result<Value> {
        let context = self.stopped_session()?;
        let path = args["source"]["path"].as_str().unwrap_or_default().to_string();
        let listing = find_listing(&self.listings, &path);
        let requests: Vec<(Value, Option<u16>)> = args["breakpoints"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|bp| {
                let line = bp["line"].as_u64().unwrap_or(0) as usize;
                let address = listing.and_then(|l| l.address_of_line(line.saturating_sub(1)));
                (bp, address)
            })
            .collect();

        let mut session = lock(&context);
        for id in self.source_breakpoints.remove(&path).unwrap_or_default() {
            if let Err(err) = session.remove_breakpoint(id) {
                warn!(target: "dap", "removing breakpoint {}: {}", id, err);
            }
        }
        let (ids, results) = Self::set_breakpoints(&mut session, requests);
        drop(session);

        self.source_breakpoints.insert(path, ids);
        Ok(json!({ "breakpoints": results }))
    }

    fn handle_set_function_breakpoints(&mut self, args: &Value) -> Result<Value> {
        let context = self.stopped_session()?;
        let mut session = lock(&context);
        for id in self.function_breakpoints.drain(..) {
            if let Err(err) = session.remove_breakpoint(id) {
                warn!(target: "dap", "removing breakpoint {}: {}", id, err);
            }
        }
        let requests: Vec<(Value, Option<u16>)> = args["breakpoints"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|bp| {
                let address = session.resolve_address(bp["name"].as_str().unwrap_or_default()).ok();
                (bp, address)
            })
            .collect();
        let (ids, results) = Self::set_breakpoints(&mut session, requests);
        drop(session);

        self.function_breakpoints = ids;
        Ok(json!({ "breakpoints": results }))
    }

    fn frame_json(&self, id: usize, frame: &Frame) -> Value {
        let mut value = json!({
            "id": id,
            "name": frame.name,
            "line": 0,
            "column": 0,
            "instructionPointerReference": format!("0x{:04X}", frame.addr),
        });
        let location = self
            .listings
            .iter()
            .find_map(|l| l.line_of_address(frame.addr).map(|line| (l, line)));
        if let Some((listing, line)) = location {
            let name = listing
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            value["line"] = json!(line + 1);
            value["column"] = json!(1);
            value["source"] = json!({
                "name": name,
                "path": listing.path.to_string_lossy(),
            });
        } else {
            value["name"] = json!(format!("{} [{:04X}h]", frame.name, frame.addr));
            value["presentationHint"] = json!("subtle");
        }
        value
    }

    fn handle_stack_trace(&self) -> Result<Value> {
        let context = self.stopped_session()?;
        let frames = lock(&context).stack_trace()?;
        let stack_frames: Vec<Value> = frames
            .iter()
            .enumerate()
            .map(|(id, frame)| self.frame_json(id, frame))
            .collect();
        Ok(json!({
            "stackFrames": stack_frames,
            "totalFrames": frames.len(),
        }))
    }

    fn handle_variables(&self, args: &Value) -> Result<Value> {
        let context = self.stopped_session()?;
        let reference = args["variablesReference"].as_u64().unwrap_or(0);
        let mut session = lock(&context);

        let variables: Vec<Value> = if reference == REGISTERS_REFERENCE {
            let regs = session.registers()?;
            let mut vars: Vec<Value> = regs
                .entries()
                .into_iter()
                .map(|(name, value, width)| {
                    json!({
                        "name": name,
                        "value": format!("{:0width$X}h", value, width = width),
                        "variablesReference": 0,
                    })
                })
                .collect();
            vars.push(json!({
                "name": "Flags",
                "value": regs.flags_string(),
                "variablesReference": 0,
            }));
            vars
        } else if reference >= FRAME_DATA_REFERENCE {
            let frames = session.stack_trace()?;
            frames
                .get((reference - FRAME_DATA_REFERENCE) as usize)
                .map(|frame| {
                    frame
                        .stack
                        .iter()
                        .rev()
                        .enumerate()
                        .map(|(i, value)| {
                            json!({
                                "name": format!("[{}]", i),
                                "value": format!("{:04X}h", value),
                                "variablesReference": 0,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(json!({ "variables": variables }))
    }

    fn handle_set_variable(&self, args: &Value) -> Result<Value> {
        if args["variablesReference"].as_u64() != Some(REGISTERS_REFERENCE) {
            return Err(Error::Unsupported("only registers can be changed".to_string()));
        }
        let name = args["name"].as_str().unwrap_or_default();
        let text = args["value"].as_str().unwrap_or_default();
        let value = parse_number(text)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| Error::InvalidArgument(format!("invalid value {:?}", text)))?;
        let context = self.stopped_session()?;
        let regs = lock(&context).set_register(name, value)?;
        let value = regs.get(name).unwrap_or(value);
        Ok(json!({ "value": format!("{:04X}h", value) }))
    }

    fn handle_evaluate(&self, args: &Value) -> Result<Value> {
        let context = self.stopped_session()?;
        let expression = args["expression"].as_str().unwrap_or_default();
        let result = lock(&context).evaluate(expression)?;
        Ok(json!({ "result": result, "variablesReference": 0 }))
    }

    fn handle_pause(&self) -> Result<()> {
        match &self.interrupter {
            Some(interrupter) => interrupter.send_blank(),
            None => Err(Error::Unsupported("pause without a socket connection".to_string())),
        }
    }

    /// Respond right away and run the operation on its own thread; `stopped` follows when it ends.
    fn execute(&mut self, seq: u64, command: String, mode: RunMode) -> bool {
        let context = match self.session() {
            Ok(context) => context,
            Err(err) => {
                self.respond_error(seq, &command, err.to_string());
                return true;
            }
        };
        let ticket = match self.guard.try_begin() {
            Ok(ticket) => ticket,
            Err(err) => {
                self.respond_error(seq, &command, err.to_string());
                return true;
            }
        };

        let body = (mode == RunMode::Continue).then(|| json!({ "allThreadsContinued": true }));
        self.respond(seq, &command, body);

        let output = self.output.clone();
        let spawned = thread::Builder::new()
            .name("zesarux-exec".to_string())
            .spawn(move || {
                let _ticket = ticket;
                let mut session = lock(&context);
                let result = match mode {
                    RunMode::Continue => session.continue_(),
                    RunMode::StepOver => session.step_over(),
                    RunMode::StepInto => session.step_into(),
                    RunMode::StepOut => session.step_out(),
                    RunMode::StepBack => session.step_back(),
                    RunMode::ReverseContinue => session.reverse_continue(),
                };
                let result = result.unwrap_or_else(|err| {
                    session.report_error(&err);
                    StepResult::failed(err)
                });
                let ended = session.is_terminating() || session.is_connection_lost();
                drop(session);
                if !ended {
                    report_stop(&mut lock(&output), mode, &result);
                }
            });
        if let Err(err) = spawned {
            error!(target: "dap", "cannot start execution thread: {}", err);
        }
        true
    }
}

fn capabilities() -> Value {
    json!({
        "supportsConfigurationDoneRequest": true,
        "supportsStepBack": true,
        "supportsConditionalBreakpoints": true,
        "supportsLogPoints": true,
        "supportsFunctionBreakpoints": true,
        "supportsEvaluateForHovers": true,
        "supportsSetVariable": true,
        "supportsStepInTargetsRequest": false,
    })
}

fn scopes(args: &Value) -> Value {
    let frame_id = args["frameId"].as_u64().unwrap_or(0);
    json!({
        "scopes": [
            {
                "name": "Registers",
                "variablesReference": REGISTERS_REFERENCE,
                "expensive": false
            },
            {
                "name": "Stack",
                "variablesReference": FRAME_DATA_REFERENCE + frame_id,
                "expensive": false
            }
        ]
    })
}
