//! Loopback client used by the integration tests

#![allow(dead_code)]

use evalport::protocol::{self, ClientMessage, ServerMessage};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const MAX_TICKS: usize = 2000;

pub struct TestClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    /// Bytes of a frame that arrived across several reads
    partial: Vec<u8>,
}

impl TestClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let writer = TcpStream::connect(addr).unwrap();
        writer
            .set_read_timeout(Some(Duration::from_millis(5)))
            .unwrap();
        let reader = BufReader::new(writer.try_clone().unwrap());
        Self {
            writer,
            reader,
            partial: Vec::new(),
        }
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }

    pub fn evaluate(&mut self, expression: &str) {
        let line = protocol::serialize(&ClientMessage::evaluate(expression)).unwrap();
        self.send_raw(line.as_bytes());
    }

    /// Read one line if the server has finished writing one
    ///
    /// A line cut off by the read timeout is kept for the next call.
    pub fn try_read_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.partial) {
            Ok(_) if self.partial.ends_with(b"\n") => {
                let line = std::mem::take(&mut self.partial);
                Some(String::from_utf8(line).expect("utf-8 frame"))
            }
            Ok(_) => None,
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
            Err(e) => panic!("client read failed: {}", e),
        }
    }

    /// Call `tick` until a frame arrives
    pub fn next_frame(&mut self, mut tick: impl FnMut()) -> ServerMessage {
        for _ in 0..MAX_TICKS {
            tick();
            if let Some(line) = self.try_read_line() {
                return protocol::parse_response(&line)
                    .unwrap_or_else(|| panic!("unparseable frame: {:?}", line));
            }
        }
        panic!("no frame after {} ticks", MAX_TICKS);
    }

    /// Call `tick` a few times and assert nothing is written back
    pub fn expect_silence(&mut self, ticks: usize, mut tick: impl FnMut()) {
        for _ in 0..ticks {
            tick();
            if let Some(line) = self.try_read_line() {
                panic!("unexpected frame: {:?}", line);
            }
        }
    }

    pub fn close(self) {
        drop(self.reader);
        drop(self.writer);
    }
}

pub fn result_of(frame: ServerMessage) -> (bool, String) {
    match frame {
        ServerMessage::EvalResult { success, result } => (success, result),
        other => panic!("Expected eval_result, got {:?}", other),
    }
}
