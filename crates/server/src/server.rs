//! REPL server state and protocol handling
//!
//! `ReplServer` ties the transport to the evaluation engine. It has no
//! thread or timer of its own: the host calls `tick` on a fixed cadence and
//! each call does at most one accept, one line read and one evaluation.

use crate::config::ServerConfig;
use crate::engine::{Engine, EvalContext};
use crate::error::ServerError;
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::transport::Transport;
use std::net::SocketAddr;
use tracing::{error, info, trace};

/// Server state: configuration, engine, and the bound transport (if running)
pub struct ReplServer<C: EvalContext> {
    config: ServerConfig,
    engine: Engine<C>,
    transport: Option<Transport>,
}

impl<C: EvalContext> ReplServer<C> {
    pub fn new(config: ServerConfig, context: C) -> Self {
        Self {
            config,
            engine: Engine::new(context),
            transport: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn context(&self) -> &C {
        self.engine.context()
    }

    pub fn context_mut(&mut self) -> &mut C {
        self.engine.context_mut()
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_some()
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(Transport::local_addr)
    }

    pub fn has_client(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::has_client)
    }

    /// Bind the listener
    ///
    /// Already running is a no-op: the listener is not rebound and a
    /// connected client is kept.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }

        match Transport::bind(&self.config) {
            Ok(transport) => {
                info!("REPL server listening on {}", transport.local_addr());
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                error!("REPL server failed to start: {}", e);
                Err(e)
            }
        }
    }

    /// Close the client and listener; safe when not running
    pub fn stop(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close();
            info!("REPL server stopped");
        }
    }

    /// One non-blocking step of the accept/read/evaluate loop
    pub fn tick(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        // Finish replies the client was too slow to take last time
        transport.flush();

        if let Some(peer) = transport.accept_if_none() {
            info!("REPL client connected from {}", peer);
            transport.send(&ServerMessage::connected(self.config.greeting.as_str()));
        }

        // One request per tick, even when more lines are already buffered
        let Some(line) = transport.receive_line() else {
            return;
        };

        if let Some(reply) = respond(&self.engine, &line) {
            transport.send(&reply);
        }
    }

    /// Turn one request line into its reply
    ///
    /// Lines that are not evaluate requests produce no reply.
    pub fn handle_line(&self, line: &str) -> Option<ServerMessage> {
        respond(&self.engine, line)
    }
}

impl<C: EvalContext> Drop for ReplServer<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn respond<C: EvalContext>(engine: &Engine<C>, line: &str) -> Option<ServerMessage> {
    let Some(request) = protocol::parse(line) else {
        trace!("ignoring non-request line ({} bytes)", line.len());
        return None;
    };

    match request {
        ClientMessage::Evaluate { expression } => {
            Some(engine.evaluate(&expression).into_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua::LuaContext;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn server() -> ReplServer<LuaContext> {
        let config = ServerConfig::default().with_port(0);
        let mut server = ReplServer::new(config, LuaContext::new());
        server.start().unwrap();
        server
    }

    /// Tick until a line arrives on the client side
    fn tick_until_line(
        server: &mut ReplServer<LuaContext>,
        reader: &mut BufReader<TcpStream>,
    ) -> ServerMessage {
        reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(5)))
            .unwrap();
        let mut partial = Vec::new();
        for _ in 0..400 {
            server.tick();
            // Bytes read before a timeout stay in `partial`
            if reader.read_until(b'\n', &mut partial).is_ok() && partial.ends_with(b"\n") {
                let line = String::from_utf8_lossy(&partial);
                return protocol::parse_response(&line).expect("server frame");
            }
        }
        panic!("no frame received");
    }

    #[test]
    fn test_handle_line_evaluates() {
        let server = ReplServer::new(ServerConfig::default(), LuaContext::new());
        assert_eq!(
            server.handle_line(r#"{"type":"evaluate","expression":"1+1"}"#),
            Some(ServerMessage::success("2"))
        );
    }

    #[test]
    fn test_handle_line_ignores_noise() {
        let server = ReplServer::new(ServerConfig::default(), LuaContext::new());
        assert_eq!(server.handle_line("hello"), None);
        assert_eq!(server.handle_line(r#"{"type":"status"}"#), None);
    }

    #[test]
    fn test_handle_line_failures() {
        let server = ReplServer::new(ServerConfig::default(), LuaContext::new());
        match server.handle_line(r#"{"type":"evaluate","expression":"1 +"}"#) {
            Some(ServerMessage::EvalResult { success, result }) => {
                assert!(!success);
                assert!(result.starts_with("Compile error: "), "{}", result);
            }
            other => panic!("Expected eval_result, got {:?}", other),
        }
        match server.handle_line(r#"{"type":"evaluate","expression":"local t = nil; t.x()"}"#) {
            Some(ServerMessage::EvalResult { success, result }) => {
                assert!(!success);
                assert!(result.starts_with("Error: "), "{}", result);
            }
            other => panic!("Expected eval_result, got {:?}", other),
        }
    }

    #[test]
    fn test_tick_when_stopped_is_noop() {
        let mut server = ReplServer::new(ServerConfig::default(), LuaContext::new());
        server.tick();
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }

    #[test]
    fn test_start_twice_keeps_listener() {
        let mut server = server();
        let addr = server.local_addr();
        server.start().unwrap();
        assert_eq!(server.local_addr(), addr);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut server = server();
        server.stop();
        assert!(!server.is_running());
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn test_greeting_then_result() {
        let mut server = server();
        let addr = server.local_addr().unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        assert_eq!(
            tick_until_line(&mut server, &mut reader),
            ServerMessage::connected("UE4SS REPL ready!")
        );

        stream
            .write_all(b"{\"type\":\"evaluate\",\"expression\":\"2*21\"}\n")
            .unwrap();
        assert_eq!(
            tick_until_line(&mut server, &mut reader),
            ServerMessage::success("42")
        );
    }

    #[test]
    fn test_custom_greeting() {
        let config = ServerConfig {
            greeting: "hello from the host".to_string(),
            ..ServerConfig::default().with_port(0)
        };
        let mut server = ReplServer::new(config, LuaContext::new());
        server.start().unwrap();

        let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let mut reader = BufReader::new(stream);
        assert_eq!(
            tick_until_line(&mut server, &mut reader),
            ServerMessage::connected("hello from the host")
        );
    }

    #[test]
    fn test_context_mut_reaches_shared_state() {
        let mut server = ReplServer::new(ServerConfig::default(), LuaContext::new());
        server.context_mut().lua().globals().set("answer", 41).unwrap();
        assert_eq!(
            server.handle_line(r#"{"type":"evaluate","expression":"answer + 1"}"#),
            Some(ServerMessage::success("42"))
        );
    }
}
