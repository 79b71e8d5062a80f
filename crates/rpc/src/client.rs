use crate::{
    Error, ErrorCode, Failure, Id, Params, RpcError, RpcMessage, RpcNotification, RpcRequest,
    RpcResponse, Success,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

/// RPC message actively initiated from the editor host.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EditorMessage {
    Request(RpcRequest),
    Notification(RpcNotification),
}

/// RPC client talking to the editor host over stdio.
#[derive(Debug)]
pub struct RpcClient {
    /// Id of request to the host created from the backend side.
    id: AtomicU64,
    /// Sender for sending message from the backend to the host.
    writer_sender: UnboundedSender<RpcMessage>,
    /// Sender for passing the host response of a request initiated from the backend.
    response_sender_tx: UnboundedSender<(Id, oneshot::Sender<RpcResponse>)>,
}

impl RpcClient {
    /// Creates a new instance of [`RpcClient`].
    ///
    /// # Arguments
    ///
    /// * `reader`: a buffer reader on top of [`std::io::Stdin`].
    /// * `writer`: a buffer writer on top of [`std::io::Stdout`].
    /// * `sink`: channel receiving the messages initiated from the host.
    pub fn new(
        reader: impl BufRead + Send + 'static,
        writer: impl Write + Send + 'static,
        sink: UnboundedSender<EditorMessage>,
    ) -> Self {
        let (response_sender_tx, response_sender_rx): (
            UnboundedSender<(Id, oneshot::Sender<RpcResponse>)>,
            _,
        ) = unbounded_channel();

        // A blocking std thread so that reading stdin never stalls the async runtime.
        let _ = std::thread::Builder::new()
            .name("stdio-reader".to_string())
            .spawn(move || {
                if let Err(error) = loop_read(reader, response_sender_rx, &sink) {
                    tracing::error!(?error, "Thread stdio-reader exited");
                }
            });

        let (writer_sender, io_writer_receiver) = unbounded_channel();
        tokio::spawn(async move {
            if let Err(error) = loop_write(writer, io_writer_receiver).await {
                tracing::error!(?error, "Task stdio-writer exited");
            }
        });

        Self {
            id: Default::default(),
            response_sender_tx,
            writer_sender,
        }
    }

    pub fn next_request_id(&self) -> u64 {
        self.id.fetch_add(1, Ordering::SeqCst)
    }

    /// Calls `method` with `params` in the host and returns the result.
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: impl AsRef<str>,
        params: impl Serialize,
    ) -> Result<R, RpcError> {
        let id = self.next_request_id();
        let rpc_request = RpcRequest {
            id: Id::Num(id),
            method: method.as_ref().to_owned(),
            params: to_array_or_none(params)?,
        };
        let (request_result_tx, request_result_rx) = oneshot::channel();
        // Request result will be sent back in a RpcResponse message.
        self.response_sender_tx
            .send((Id::Num(id), request_result_tx))?;
        self.writer_sender.send(RpcMessage::Request(rpc_request))?;
        match request_result_rx.await? {
            RpcResponse::Success(ok) => Ok(serde_json::from_value(ok.result)?),
            RpcResponse::Failure(err) => Err(RpcError::Request(format!(
                "RpcClient request error: {err:?}"
            ))),
        }
    }

    /// Sends a notification message to the host.
    pub fn notify(&self, method: impl AsRef<str>, params: impl Serialize) -> Result<(), RpcError> {
        let notification = RpcNotification {
            method: method.as_ref().to_owned(),
            params: to_array_or_none(params)?,
        };

        self.writer_sender
            .send(RpcMessage::Notification(notification))?;

        Ok(())
    }

    /// Sends the response of a request initiated from the host.
    pub fn send_response(
        &self,
        id: Id,
        output_result: Result<impl Serialize, RpcError>,
    ) -> Result<(), RpcError> {
        let rpc_response = match output_result {
            Ok(ok) => RpcResponse::Success(Success {
                id,
                result: serde_json::to_value(ok)?,
            }),
            Err(err) => RpcResponse::Failure(Failure {
                id,
                error: Error {
                    code: ErrorCode::InternalError,
                    message: format!("{err:?}"),
                    data: None,
                },
            }),
        };

        self.writer_sender
            .send(RpcMessage::Response(rpc_response))?;

        Ok(())
    }
}

/// Keep reading and processing the lines from stdin.
fn loop_read(
    mut reader: impl BufRead,
    mut response_sender_rx: UnboundedReceiver<(Id, oneshot::Sender<RpcResponse>)>,
    sink: &UnboundedSender<EditorMessage>,
) -> Result<(), RpcError> {
    let mut pending_response_senders = HashMap::new();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => return Err(RpcError::StreamClosed),
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RpcMessage>(line) {
                    Ok(rpc_message) => match rpc_message {
                        RpcMessage::Request(rpc_request) => {
                            sink.send(EditorMessage::Request(rpc_request))?;
                        }
                        RpcMessage::Notification(notification) => {
                            sink.send(EditorMessage::Notification(notification))?;
                        }
                        RpcMessage::Response(response) => {
                            while let Ok((id, response_sender)) = response_sender_rx.try_recv() {
                                pending_response_senders.insert(id, response_sender);
                            }

                            if let Some(response_sender) =
                                pending_response_senders.remove(response.id())
                            {
                                response_sender.send(response).map_err(|response| {
                                    tracing::debug!("Failed to send response: {response:?}");
                                    RpcError::SendResponse(response)
                                })?;
                            }
                        }
                    },
                    Err(err) => {
                        tracing::error!(error = ?err, ?line, "Invalid raw host message");
                    }
                }
            }
            Err(error) => {
                tracing::error!(?error, "Failed to read_line");
            }
        }
    }
}

/// Keep writing the messages from the backend to the host via stdout.
async fn loop_write(
    mut writer: impl Write,
    mut io_writer_receiver: UnboundedReceiver<RpcMessage>,
) -> Result<(), RpcError> {
    while let Some(msg) = io_writer_receiver.recv().await {
        let s = serde_json::to_string(&msg)?;

        if s.len() < 128 {
            tracing::trace!(?msg, "=> Host");
        } else {
            let msg_size = s.len();
            match msg {
                RpcMessage::Request(request) => {
                    tracing::trace!(method = ?request.method, msg_size, "=> Host Request")
                }
                RpcMessage::Response(response) => {
                    tracing::trace!(id = %response.id(), msg_size, "=> Host Response")
                }
                RpcMessage::Notification(notification) => {
                    tracing::trace!(method = ?notification.method, msg_size, "=> Host Notification")
                }
            }
        }

        // The host output handler requires both the length header and the
        // trailing line ending to fire reliably.
        write!(writer, "Content-length: {}\n\n{}\n", s.len(), s)?;
        writer.flush()?;
    }

    Ok(())
}

fn to_array_or_none(value: impl Serialize) -> Result<Params, RpcError> {
    let json_value = serde_json::to_value(value)?;

    let params = match json_value {
        Value::Null => Params::None,
        Value::Array(vec) => Params::Array(vec),
        Value::Object(map) => Params::Map(map),
        Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            Params::Array(vec![json_value])
        }
    };

    Ok(params)
}
