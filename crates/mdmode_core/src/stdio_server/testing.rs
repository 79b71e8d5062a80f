//! Scripted in-process host for exercising the async components over the
//! real wire: requests are answered from a per-method script and every
//! method the backend sends is recorded in order.

use crate::stdio_server::editor::Editor;
use rpc::{EditorMessage, RpcClient};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

type Responder = Box<dyn FnMut(&Value) -> Value + Send>;

pub(crate) struct HostStub {
    responders: HashMap<String, Responder>,
}

impl HostStub {
    pub fn new() -> Self {
        Self {
            responders: HashMap::new(),
        }
    }

    /// Answers `method` with a fixed result.
    pub fn on(self, method: &str, result: Value) -> Self {
        self.on_fn(method, move |_| result.clone())
    }

    /// Answers `method` with a closure over the request params.
    pub fn on_fn(
        mut self,
        method: &str,
        responder: impl FnMut(&Value) -> Value + Send + 'static,
    ) -> Self {
        self.responders.insert(method.to_string(), Box::new(responder));
        self
    }

    /// Starts the host thread and returns the connected editor handle plus
    /// the recording side.
    pub fn spawn(self) -> (Editor, Host) {
        let (backend_side, host_side) = UnixStream::pair().unwrap();
        let log: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));

        let host_log = log.clone();
        let mut responders = self.responders;
        std::thread::spawn(move || {
            let mut writer = host_side.try_clone().unwrap();
            let mut reader = BufReader::new(host_side);
            while let Some(message) = read_framed(&mut reader) {
                let Some(method) = message.get("method").and_then(Value::as_str) else {
                    continue;
                };
                let method = method.to_string();
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                host_log.lock().unwrap().push((method.clone(), params.clone()));

                // Requests carry an id and expect an answer; notifications
                // are only recorded.
                if let Some(id) = message.get("id") {
                    let result = responders
                        .get_mut(&method)
                        .map(|respond| respond(&params))
                        .unwrap_or(Value::Null);
                    let response = json!({ "id": id, "result": result });
                    if writeln!(writer, "{response}").is_err() {
                        break;
                    }
                }
            }
        });

        let (call_tx, call_rx) = tokio::sync::mpsc::unbounded_channel();
        let writer = backend_side.try_clone().unwrap();
        let editor = Editor::new(Arc::new(RpcClient::new(
            BufReader::new(backend_side),
            writer,
            call_tx,
        )));

        (
            editor,
            Host {
                log,
                _host_calls: call_rx,
            },
        )
    }
}

/// Recorded view of the backend-to-host traffic.
pub(crate) struct Host {
    log: Arc<Mutex<Vec<(String, Value)>>>,
    _host_calls: UnboundedReceiver<EditorMessage>,
}

impl Host {
    /// Index of the first call of `method` in arrival order.
    pub fn position_of(&self, method: &str) -> Option<usize> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .position(|(recorded, _)| recorded == method)
    }

    /// Params of the first call of `method`.
    pub fn params_of(&self, method: &str) -> Option<Value> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(recorded, _)| recorded == method)
            .map(|(_, params)| params.clone())
    }
}

/// Reads one `Content-length`-framed message from the backend.
fn read_framed(reader: &mut impl BufRead) -> Option<Value> {
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).ok()? == 0 {
            return None;
        }
        let Some(len) = header.trim().strip_prefix("Content-length: ") else {
            continue;
        };
        let len: usize = len.parse().ok()?;
        let mut blank = String::new();
        reader.read_line(&mut blank).ok()?;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).ok()?;
        return serde_json::from_slice(&payload).ok();
    }
}
