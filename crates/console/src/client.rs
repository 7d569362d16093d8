//! Console connection to an evalport server
//!
//! Speaks the newline-delimited JSON protocol: waits for the `connected`
//! greeting, then sends one `evaluate` request per expression and reads the
//! matching `eval_result`.

use evalport::protocol::{self, ClientMessage, ServerMessage};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Outcome of one remote evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub success: bool,
    pub text: String,
}

/// An open console session
pub struct Session {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Session {
    /// Connect and wait for the greeting
    ///
    /// Returns the session and the greeting message.
    pub fn connect(
        addr: impl ToSocketAddrs,
        timeout: Duration,
    ) -> Result<(Self, String), String> {
        let writer = TcpStream::connect(addr).map_err(|e| format!("Failed to connect: {}", e))?;
        writer
            .set_read_timeout(Some(timeout))
            .map_err(|e| format!("Failed to set read timeout: {}", e))?;
        let reader = BufReader::new(
            writer
                .try_clone()
                .map_err(|e| format!("Failed to clone socket: {}", e))?,
        );

        let mut session = Self { writer, reader };
        loop {
            match session.read_frame()? {
                ServerMessage::Connected { message } => return Ok((session, message)),
                // Stray results before the greeting are not ours
                ServerMessage::EvalResult { .. } => continue,
            }
        }
    }

    /// Evaluate one expression remotely
    pub fn evaluate(&mut self, expression: &str) -> Result<Reply, String> {
        let line = protocol::serialize(&ClientMessage::evaluate(expression))
            .map_err(|e| format!("Failed to encode request: {}", e))?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| format!("Failed to send request: {}", e))?;

        loop {
            match self.read_frame()? {
                ServerMessage::EvalResult { success, result } => {
                    return Ok(Reply {
                        success,
                        text: result,
                    });
                }
                ServerMessage::Connected { .. } => continue,
            }
        }
    }

    /// Read the next frame, skipping lines that are not protocol frames
    fn read_frame(&mut self) -> Result<ServerMessage, String> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return Err("Connection closed by server".to_string()),
                Ok(_) => {
                    if let Some(frame) = protocol::parse_response(&line) {
                        return Ok(frame);
                    }
                }
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err("Timed out waiting for the server".to_string());
                }
                Err(e) => return Err(format!("Failed to read from server: {}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Serve a scripted exchange on an ephemeral port
    fn scripted_server(script: Vec<(&'static str, &'static str)>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            writer
                .write_all(b"{\"type\":\"connected\",\"message\":\"ready\"}\n")
                .unwrap();

            for (expected, reply) in script {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                assert!(line.contains(expected), "{}", line);
                writer.write_all(reply.as_bytes()).unwrap();
            }
        });

        addr
    }

    #[test]
    fn test_connect_reads_greeting() {
        let addr = scripted_server(vec![]);
        let (_session, greeting) = Session::connect(addr, Duration::from_secs(5)).unwrap();
        assert_eq!(greeting, "ready");
    }

    #[test]
    fn test_evaluate_success_and_failure() {
        let addr = scripted_server(vec![
            (
                "\"expression\":\"1+1\"",
                "{\"type\":\"eval_result\",\"success\":true,\"result\":\"2\"}\n",
            ),
            (
                "\"expression\":\"1 +\"",
                "noise\n{\"success\":false,\"type\":\"eval_result\",\"result\":\"Compile error: x\"}\n",
            ),
        ]);
        let (mut session, _) = Session::connect(addr, Duration::from_secs(5)).unwrap();

        assert_eq!(
            session.evaluate("1+1").unwrap(),
            Reply {
                success: true,
                text: "2".to_string()
            }
        );
        assert_eq!(
            session.evaluate("1 +").unwrap(),
            Reply {
                success: false,
                text: "Compile error: x".to_string()
            }
        );
    }

    #[test]
    fn test_server_close_is_reported() {
        let addr = scripted_server(vec![]);
        let (mut session, _) = Session::connect(addr, Duration::from_secs(5)).unwrap();
        let err = session.evaluate("1").unwrap_err();
        assert!(
            err.contains("closed") || err.contains("Failed"),
            "{}",
            err
        );
    }

    #[test]
    fn test_against_ticking_server() {
        use evalport::{LuaContext, ReplServer, ServerConfig};
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let mut server = ReplServer::new(ServerConfig::default().with_port(0), LuaContext::new());
        server.start().unwrap();
        let addr = server.local_addr().unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let host = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                server.tick();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let (mut session, greeting) = Session::connect(addr, Duration::from_secs(5)).unwrap();
        assert_eq!(greeting, evalport::DEFAULT_GREETING);
        assert_eq!(
            session.evaluate("2*21").unwrap(),
            Reply {
                success: true,
                text: "42".to_string()
            }
        );
        let failed = session.evaluate("undefined_fn()").unwrap();
        assert!(!failed.success);
        assert!(failed.text.starts_with("Error: "), "{}", failed.text);

        done.store(true, Ordering::Relaxed);
        host.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let err = Session::connect(addr, Duration::from_secs(1)).err().unwrap();
        assert!(err.starts_with("Failed to connect"), "{}", err);
    }
}
