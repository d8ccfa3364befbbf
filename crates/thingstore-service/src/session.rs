//! Newline-delimited JSON session.
//!
//! Each input line is one envelope. Queries get exactly one response line;
//! published messages are handed to the recorder and get none.
//!
//! ```text
//! {"client_id": "app-1", "request": {"op": "create_cursor", "thing_id": "urn:thing:1"}}
//! {"publish": {"kind": "notification", "thing_id": "urn:thing:1", "name": "temperature",
//!              "affordance_type": "property", "sender_id": "agent-1", "data": 21.5}}
//! ```

use std::sync::Arc;

use serde::Deserialize;
use thingstore_history::History;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::dispatch::{HistoryRequest, HistoryResponse, dispatch};
use crate::message::ThingMessage;
use crate::recorder::Recorder;

/// One input line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Query {
        client_id: String,
        request: HistoryRequest,
    },
    Publish {
        publish: ThingMessage,
    },
}

/// Process envelopes from `reader` until end of input.
pub async fn run<R, W>(
    history: Arc<History>,
    recorder: &Recorder,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Envelope>(line) {
            Ok(Envelope::Query { client_id, request }) => {
                dispatch(Arc::clone(&history), client_id, request).await
            }
            Ok(Envelope::Publish { publish }) => {
                let outcome = recorder.submit(&publish);
                debug!(
                    "Published {} of {}: {:?}",
                    publish.name, publish.thing_id, outcome
                );
                continue;
            }
            Err(e) => {
                warn!("Ignoring malformed line: {}", e);
                HistoryResponse::Error {
                    message: format!("malformed request: {}", e),
                }
            }
        };

        let mut encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode response: {}", e);
                continue;
            }
        };
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}
