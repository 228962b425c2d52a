/*!
 * JSON-lines codec for the method channel
 *
 * One request per line:
 *
 * ```text
 * {"id":1,"method":"writeFile","args":{"path":{"str":"/tmp/x"},"bytes":{"bytes":[65,66]}}}
 * ```
 *
 * One response per line, in completion order:
 *
 * ```text
 * {"id":1,"result":{"ok":{"bool":true}}}
 * {"id":2,"result":{"error":{"code":"NO_SERVICE","message":"Remote file service not connected"}}}
 * {"id":3,"result":"not_implemented"}
 * ```
 */

use elevate_core_interface::{Arguments, ErrorCode, MethodCall, MethodError, MethodResult, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::channel::MethodChannel;
use crate::error::{ElevateError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub args: Arguments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ok(Value),
    Error { code: ErrorCode, message: String },
    NotImplemented,
}

impl From<MethodResult> for Reply {
    fn from(result: MethodResult) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(MethodError::NotImplemented(_)) => Reply::NotImplemented,
            Err(MethodError::Failed { code, message }) => Reply::Error { code, message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// `None` when the request line could not be parsed
    pub id: Option<u64>,
    pub result: Reply,
}

impl Response {
    fn malformed(message: String) -> Self {
        Self {
            id: None,
            result: Reply::Error {
                code: ErrorCode::InvalidArgument,
                message,
            },
        }
    }
}

/// Serve requests from `reader` until EOF, writing responses to `writer`
///
/// Requests run concurrently; a slow call does not hold up the ones behind
/// it. Returns the number of request lines read once every response has been
/// written.
pub async fn serve<R, W>(channel: Arc<MethodChannel>, reader: R, writer: W) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(write_responses(rx, writer));

    let mut lines = reader.lines();
    let mut in_flight = JoinSet::new();
    let mut requests = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        requests += 1;

        match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                debug!(id = request.id, method = %request.method, "Request received");
                let channel = Arc::clone(&channel);
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let result = channel
                        .invoke(MethodCall::with_args(request.method, request.args))
                        .await;
                    let _ = tx.send(Response {
                        id: Some(request.id),
                        result: result.into(),
                    });
                });
            }
            Err(e) => {
                warn!(error = %e, "Malformed request line");
                let _ = tx.send(Response::malformed(e.to_string()));
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Request task failed");
        }
    }
    drop(tx);

    writer_task
        .await
        .map_err(|e| ElevateError::Other(format!("Response writer failed: {}", e)))??;
    info!(requests, "Input closed, server finished");
    Ok(requests)
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<Response>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
