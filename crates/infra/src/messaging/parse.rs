//! Decoding of raw stream replies.
//!
//! Reply shapes:
//! - entry: `[id, [field, value, ...]]` (fields are nil for entries deleted
//!   while pending)
//! - `XREADGROUP`: nil on timeout, else `[[stream, [entry, ...]], ...]`
//! - `XAUTOCLAIM`: `[next_cursor, [entry, ...], ...]`

use redis::Value;

use strata_events::QueueError;

use super::BODY_FIELD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamEntry {
    pub id: String,
    /// `None` when the entry was deleted after delivery.
    pub body: Option<String>,
}

fn malformed(what: &str) -> QueueError {
    QueueError::Malformed(format!("unexpected stream reply: {what}"))
}

pub(crate) fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Status(s) => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn parse_entry(value: &Value) -> Result<StreamEntry, QueueError> {
    let Value::Bulk(parts) = value else {
        return Err(malformed("entry is not an array"));
    };
    let [id, fields, ..] = parts.as_slice() else {
        return Err(malformed("entry too short"));
    };
    let id = as_string(id).ok_or_else(|| malformed("entry id"))?;

    let body = match fields {
        Value::Nil => None,
        Value::Bulk(fields) => {
            let body = fields
                .chunks(2)
                .find(|kv| kv.first().and_then(as_string).as_deref() == Some(BODY_FIELD))
                .and_then(|kv| kv.get(1))
                .and_then(as_string)
                .ok_or_else(|| QueueError::Malformed(format!("entry {id} has no body field")))?;
            Some(body)
        }
        _ => return Err(malformed("entry fields")),
    };

    Ok(StreamEntry { id, body })
}

fn parse_entries(value: &Value) -> Result<Vec<StreamEntry>, QueueError> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Bulk(entries) => entries.iter().map(parse_entry).collect(),
        _ => Err(malformed("entry list")),
    }
}

/// Entries of `stream` in an `XREADGROUP` reply.
pub(crate) fn parse_read_reply(value: &Value, stream: &str) -> Result<Vec<StreamEntry>, QueueError> {
    let streams = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Bulk(streams) => streams,
        _ => return Err(malformed("XREADGROUP reply")),
    };

    for s in streams {
        let Value::Bulk(pair) = s else {
            return Err(malformed("XREADGROUP stream"));
        };
        let [name, entries, ..] = pair.as_slice() else {
            return Err(malformed("XREADGROUP stream too short"));
        };
        if as_string(name).as_deref() == Some(stream) {
            return parse_entries(entries);
        }
    }
    Ok(Vec::new())
}

/// `(next_cursor, claimed_entries)` of an `XAUTOCLAIM` reply.
pub(crate) fn parse_autoclaim_reply(value: &Value) -> Result<(String, Vec<StreamEntry>), QueueError> {
    let Value::Bulk(parts) = value else {
        return Err(malformed("XAUTOCLAIM reply"));
    };
    let [cursor, entries, ..] = parts.as_slice() else {
        return Err(malformed("XAUTOCLAIM reply too short"));
    };
    let cursor = as_string(cursor).ok_or_else(|| malformed("XAUTOCLAIM cursor"))?;
    Ok((cursor, parse_entries(entries)?))
}
