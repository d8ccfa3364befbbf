//! Request/response surface over the history engine.
//!
//! Requests and responses are plain serde types so any transport carrying JSON
//! can expose the engine. Every request runs on the blocking thread pool since
//! backends do synchronous I/O.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thingstore_history::{Error, History};
use thingstore_types::ThingValue;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

/// Message returned for both unknown and foreign cursor keys.
pub const CURSOR_NOT_FOUND: &str = "cursor not found";

/// A history query issued by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HistoryRequest {
    CreateCursor {
        thing_id: String,
        /// Only return values of this affordance.
        #[serde(default)]
        name: Option<String>,
    },
    First {
        cursor_key: String,
    },
    Last {
        cursor_key: String,
    },
    Next {
        cursor_key: String,
    },
    Prev {
        cursor_key: String,
    },
    NextN {
        cursor_key: String,
        #[serde(with = "time::serde::rfc3339")]
        until: OffsetDateTime,
        #[serde(default)]
        limit: i64,
    },
    PrevN {
        cursor_key: String,
        #[serde(with = "time::serde::rfc3339")]
        until: OffsetDateTime,
        #[serde(default)]
        limit: i64,
    },
    Seek {
        cursor_key: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ReleaseCursor {
        cursor_key: String,
    },
    ReadHistory {
        thing_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        /// Window length; negative reads backward from `timestamp`.
        #[serde(default)]
        duration_secs: i64,
        #[serde(default)]
        limit: i64,
    },
}

/// Answer to a [`HistoryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryResponse {
    Cursor {
        cursor_key: String,
    },
    Value {
        value: Option<ThingValue>,
        valid: bool,
    },
    Page {
        values: Vec<ThingValue>,
        items_remaining: bool,
    },
    Released,
    Error {
        message: String,
    },
}

impl HistoryResponse {
    fn value(value: Option<ThingValue>) -> Self {
        let valid = value.is_some();
        HistoryResponse::Value { value, valid }
    }

    fn error(err: &Error) -> Self {
        let message = if err.is_unknown_cursor() {
            debug!("Rejecting cursor request: {}", err);
            CURSOR_NOT_FOUND.to_string()
        } else {
            warn!("History request failed: {}", err);
            err.to_string()
        };
        HistoryResponse::Error { message }
    }
}

/// Run `request` for `client_id` on the blocking pool.
pub async fn dispatch(
    history: Arc<History>,
    client_id: String,
    request: HistoryRequest,
) -> HistoryResponse {
    let outcome = tokio::task::spawn_blocking(move || execute(&history, &client_id, request)).await;

    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => HistoryResponse::error(&e),
        Err(e) => {
            error!("History request panicked: {}", e);
            HistoryResponse::Error {
                message: "internal error".to_string(),
            }
        }
    }
}

/// Run `request` on the calling thread.
pub fn execute(
    history: &History,
    client_id: &str,
    request: HistoryRequest,
) -> thingstore_history::Result<HistoryResponse> {
    let response = match request {
        HistoryRequest::CreateCursor { thing_id, name } => HistoryResponse::Cursor {
            cursor_key: history.create_cursor(client_id, &thing_id, name.as_deref())?,
        },
        HistoryRequest::First { cursor_key } => {
            HistoryResponse::value(history.first(client_id, &cursor_key)?)
        }
        HistoryRequest::Last { cursor_key } => {
            HistoryResponse::value(history.last(client_id, &cursor_key)?)
        }
        HistoryRequest::Next { cursor_key } => {
            HistoryResponse::value(history.next(client_id, &cursor_key)?)
        }
        HistoryRequest::Prev { cursor_key } => {
            HistoryResponse::value(history.prev(client_id, &cursor_key)?)
        }
        HistoryRequest::Seek {
            cursor_key,
            timestamp,
        } => HistoryResponse::value(history.seek(client_id, &cursor_key, timestamp)?),
        HistoryRequest::NextN {
            cursor_key,
            until,
            limit,
        } => history.next_n(client_id, &cursor_key, until, limit)?.into(),
        HistoryRequest::PrevN {
            cursor_key,
            until,
            limit,
        } => history.prev_n(client_id, &cursor_key, until, limit)?.into(),
        HistoryRequest::ReleaseCursor { cursor_key } => {
            history.release_cursor(client_id, &cursor_key)?;
            HistoryResponse::Released
        }
        HistoryRequest::ReadHistory {
            thing_id,
            name,
            timestamp,
            duration_secs,
            limit,
        } => history
            .read_history(&thing_id, name.as_deref(), timestamp, duration_secs, limit)?
            .into(),
    };
    Ok(response)
}

impl From<thingstore_history::HistoryPage> for HistoryResponse {
    fn from(page: thingstore_history::HistoryPage) -> Self {
        HistoryResponse::Page {
            values: page.values,
            items_remaining: page.items_remaining,
        }
    }
}
