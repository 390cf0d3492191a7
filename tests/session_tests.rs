use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use zesarux_dap::debugger::{CommandChannel, ZesaruxSocket};
use zesarux_dap::Error;

const TIMEOUT: Duration = Duration::from_millis(500);

/// Minimal remote command server: echoes commands, holds `run` until a blank line, drops the
/// connection on `bye` and never answers `hang`.
struct FakeZesarux {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    running: Receiver<()>,
}

impl FakeZesarux {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (running_tx, running) = mpsc::channel();
        let log = received.clone();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            writer
                .write_all(b"Welcome to ZEsarUX remote command protocol\ncommand> ")
                .unwrap();

            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let command = line.trim_end().to_string();
                log.lock().unwrap().push(command.clone());
                let response = match command.as_str() {
                    "bye" => return,
                    "hang" => continue,
                    "run" => {
                        let _ = running_tx.send(());
                        loop {
                            line.clear();
                            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                                return;
                            }
                            if line.trim().is_empty() {
                                break;
                            }
                        }
                        "Running until a breakpoint, key press or data sent, menu opening or other event\nReturning from run".to_string()
                    }
                    "read-memory 32768 4" => "CD341200".to_string(),
                    "" => String::new(),
                    other => format!("echo {}", other),
                };
                if write!(writer, "{}\ncommand> ", response).is_err() {
                    return;
                }
            }
        });

        Self {
            port,
            received,
            running,
        }
    }

    fn connect(&self) -> ZesaruxSocket {
        ZesaruxSocket::connect("127.0.0.1", self.port, TIMEOUT).unwrap()
    }
}

#[cfg(test)]
mod socket_tests {
    use super::*;

    #[test]
    fn test_responses_match_submission_order() {
        let server = FakeZesarux::start();
        let socket = server.connect();

        let replies: Vec<_> = ["about", "get-version", "get-registers"]
            .iter()
            .map(|c| socket.send_command(c).unwrap())
            .collect();
        let responses: Vec<String> = replies.into_iter().map(|r| r.wait().unwrap()).collect();

        assert_eq!(
            responses,
            vec!["echo about", "echo get-version", "echo get-registers"]
        );
        assert_eq!(
            *server.received.lock().unwrap(),
            vec!["about", "get-version", "get-registers"]
        );
    }

    #[test]
    fn test_callback_runs_after_queued_commands() {
        let server = FakeZesarux::start();
        let socket = server.connect();
        let (tx, rx) = mpsc::channel();

        let first = socket.send_command("close-all-menus").unwrap();
        let second = socket.send_command("enable-breakpoints").unwrap();
        let log = server.received.clone();
        socket
            .execute_when_queue_is_empty(move || {
                let _ = tx.send(log.lock().unwrap().len());
            })
            .unwrap();

        assert_eq!(first.wait().unwrap(), "echo close-all-menus");
        assert_eq!(second.wait().unwrap(), "echo enable-breakpoints");
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 2);
    }

    #[test]
    fn test_blank_line_interrupts_run() {
        let server = FakeZesarux::start();
        let socket = server.connect();
        let interrupter = socket.interrupter();

        let reply = socket.send_interruptable_run_cmd().unwrap();
        server.running.recv_timeout(TIMEOUT).unwrap();
        // longer than the read timeout of ordinary commands
        thread::sleep(TIMEOUT + Duration::from_millis(100));
        interrupter.send_blank().unwrap();

        let response = reply.wait().unwrap();
        assert!(response.ends_with("Returning from run"));
        assert_eq!(socket.send_command("get-registers").unwrap().wait().unwrap(), "echo get-registers");
    }

    #[test]
    fn test_read_memory_through_socket() {
        let server = FakeZesarux::start();
        let mut socket = server.connect();
        assert_eq!(socket.read_memory(0x8000, 4).unwrap(), vec![0xCD, 0x34, 0x12, 0x00]);
        assert_eq!(socket.send("get-version").unwrap(), "echo get-version");
    }

    #[test]
    fn test_connection_loss_fails_pending_and_later_commands() {
        let server = FakeZesarux::start();
        let mut socket = server.connect();

        assert!(matches!(socket.send("bye"), Err(Error::ChannelClosed(_))));
        assert!(socket.is_closed());
        assert!(matches!(socket.send("about"), Err(Error::ChannelClosed(_))));
    }

    #[test]
    fn test_missing_response_times_out() {
        let server = FakeZesarux::start();
        let mut socket = server.connect();

        let result = socket.send("hang");
        match result {
            Err(Error::ChannelClosed(reason)) => assert!(reason.contains("hang")),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_wait_until_quiet() {
        let server = FakeZesarux::start();
        let mut socket = server.connect();
        socket.send("about").unwrap();
        assert!(CommandChannel::wait_until_quiet(&mut socket, Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn test_close_rejects_new_commands() {
        let server = FakeZesarux::start();
        let mut socket = server.connect();
        socket.close();
        assert!(matches!(
            socket.send_command("about"),
            Err(Error::ChannelClosed(_))
        ));
    }

    #[test]
    fn test_emulator_leaving_while_idle_closes_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Welcome\ncommand> ").unwrap();
            thread::sleep(Duration::from_millis(100));
            drop(stream);
        });

        let mut socket = ZesaruxSocket::connect("127.0.0.1", port, TIMEOUT).unwrap();
        let (tx, rx) = mpsc::channel();
        socket.set_close_hook(move |reason| {
            let _ = tx.send(reason);
        });

        let reason = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(reason.contains("closed by the emulator"));
        assert!(socket.is_closed());
        assert!(matches!(socket.send("about"), Err(Error::ChannelClosed(_))));
    }

    #[test]
    fn test_close_by_debugger_skips_hook() {
        let server = FakeZesarux::start();
        let mut socket = server.connect();
        let (tx, rx) = mpsc::channel::<String>();
        socket.set_close_hook(move |reason| {
            let _ = tx.send(reason);
        });

        socket.close();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_unsolicited_prompt_is_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            writer.write_all(b"Welcome\ncommand> ").unwrap();
            // answer to a pause sent while the machine was already stopped
            writer.write_all(b"\ncommand> ").unwrap();
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 {
                let _ = write!(writer, "echo {}\ncommand> ", line.trim_end());
                line.clear();
            }
        });

        let mut socket = ZesaruxSocket::connect("127.0.0.1", port, TIMEOUT).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(socket.send("about").unwrap(), "echo about");
    }

    #[test]
    fn test_greeting_is_required() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        assert!(matches!(
            ZesaruxSocket::from_stream(stream, TIMEOUT),
            Err(Error::ChannelClosed(_))
        ));
    }
}
