use super::EventOrigin;
use super::EventPayload;
use crate::store::EventFilter;
use crate::store::EventRow;
use crate::store::Events;
use crate::store::StoreError;
use tokio_postgres::Client;

/// query results never exceed this many events; the boolean half of the
/// result reports truncation
pub const QUERY_CAP: i64 = 100;

/// append one event to the ledger. atomicity of the event row plus its
/// parameter rows comes from the caller's transaction: identity commands
/// record inside their own transactional unit, standalone callers wrap
/// this in `store::atomically`. returns the new event id.
pub async fn record(
    client: &Client,
    payload: &EventPayload,
    sub_type: i16,
    origin: EventOrigin,
    origin_id: i32,
    message: Option<&str>,
) -> Result<i64, StoreError> {
    let kind = payload.kind();
    let params = payload.params();
    debug_assert!(params.len() == kind.params().len());
    let rendered;
    let message = match message {
        Some(text) => text,
        None => {
            rendered = payload.render();
            &rendered
        }
    };
    let event_id = client
        .insert_event(
            chrono::Utc::now(),
            kind.id(),
            sub_type,
            origin.id(),
            origin_id,
            message,
            &params,
        )
        .await?;
    log::info!("event {} [{}] {}", event_id, kind.name(), message);
    Ok(event_id)
}

/// a ledger event with its parameters attached
#[derive(Debug, Clone, PartialEq)]
pub struct EventView {
    pub row: EventRow,
    pub params: Vec<(String, String)>,
}

/// time-bounded, filtered history lookup. the flag reports truncation at
/// the query cap.
pub async fn history(
    client: &Client,
    filter: &EventFilter,
) -> Result<(Vec<EventView>, bool), StoreError> {
    let (rows, truncated) = client.events(filter, QUERY_CAP).await?;
    let params = futures::future::try_join_all(
        rows.iter().map(|row| client.event_params(row.event_id)),
    )
    .await?;
    let views = rows
        .into_iter()
        .zip(params)
        .map(|(row, params)| EventView { row, params })
        .collect();
    Ok((views, truncated))
}
