//! Builds an [`EventHistory`] from the flat JSON records written by the test harness.
//!
//! Each record is an object with the keys `process`, `type`, `f`, `value` and `time`. Other
//! keys are ignored. A missing key or a value of the wrong shape aborts the whole ingest: a
//! history that cannot be read faithfully must not be audited at all.

use {
    crate::{Event, EventHistory, HistoryError},
    thiserror::Error,
    tracing::debug,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("history is not a JSON array of records: {0}")]
    Document(#[source] serde_json::Error),
    #[error("record {index} is malformed: {source}")]
    Record {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
}

pub fn from_json_str(json: &str) -> Result<EventHistory, IngestError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(IngestError::Document)?;
    from_records(records)
}

pub fn from_records(
    records: impl IntoIterator<Item = serde_json::Value>,
) -> Result<EventHistory, IngestError> {
    let events = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value::<Event>(record)
                .map_err(|source| IngestError::Record { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(count = events.len(), "Ingested history records.");
    Ok(EventHistory::new(events)?)
}
