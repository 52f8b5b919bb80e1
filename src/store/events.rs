use super::StoreError;
use super::schema::*;
use chrono::DateTime;
use chrono::Utc;
use const_format::concatcp;
use tokio_postgres::Client;

/// a stored admin event, parameters not included
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub event_id: i64,
    pub date: DateTime<Utc>,
    pub kind: i16,
    pub sub_type: i16,
    pub origin: i16,
    pub origin_id: i32,
    pub message: String,
}

/// a time-bounded event query with optional attribute filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<i16>,
    pub sub_type: Option<i16>,
    pub origin: Option<i16>,
    pub origin_id: Option<i32>,
}

/// Events defines the append-only ledger rows. The event row and its
/// parameter rows are written by the caller's transaction; nothing here
/// ever updates or deletes.
#[async_trait::async_trait]
pub trait Events: Send + Sync {
    async fn insert_event(
        &self,
        date: DateTime<Utc>,
        kind: i16,
        sub_type: i16,
        origin: i16,
        origin_id: i32,
        message: &str,
        params: &[(String, String)],
    ) -> Result<i64, StoreError>;
    /// matching events oldest first, capped; the flag reports truncation
    async fn events(
        &self,
        filter: &EventFilter,
        cap: i64,
    ) -> Result<(Vec<EventRow>, bool), StoreError>;
    async fn event_params(&self, event_id: i64) -> Result<Vec<(String, String)>, StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl Events for Client {
    async fn insert_event(
        &self,
        date: DateTime<Utc>,
        kind: i16,
        sub_type: i16,
        origin: i16,
        origin_id: i32,
        message: &str,
        params: &[(String, String)],
    ) -> Result<i64, StoreError> {
        const EVENT: &str = concatcp!(
            "INSERT INTO ", ADMIN_EVENTS, " ",
            "(date, type, sub_type, origin, origin_id, message) ",
            "VALUES ($1, $2, $3, $4, $5, $6) ",
            "RETURNING event_id"
        );
        const PARAM: &str = concatcp!(
            "INSERT INTO ", ADMIN_EVENT_PARAMS, " (event_id, name, value) ",
            "VALUES      ($1, $2, $3)"
        );
        let event_id = self
            .query_one(EVENT, &[&date, &kind, &sub_type, &origin, &origin_id, &message])
            .await?
            .get::<_, i64>(0);
        for (name, value) in params {
            self.execute(PARAM, &[&event_id, &name, &value]).await?;
        }
        Ok(event_id)
    }

    async fn events(
        &self,
        filter: &EventFilter,
        cap: i64,
    ) -> Result<(Vec<EventRow>, bool), StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   event_id, date, type, sub_type, origin, origin_id, message ",
            "FROM     ", ADMIN_EVENTS, " ",
            "WHERE    ($1::timestamptz IS NULL OR date >= $1) ",
            "AND      ($2::timestamptz IS NULL OR date <= $2) ",
            "AND      ($3::int2 IS NULL OR type = $3) ",
            "AND      ($4::int2 IS NULL OR sub_type = $4) ",
            "AND      ($5::int2 IS NULL OR origin = $5) ",
            "AND      ($6::int4 IS NULL OR origin_id = $6) ",
            "ORDER BY date, event_id ",
            "LIMIT    $7"
        );
        let rows = self
            .query(
                SQL,
                &[
                    &filter.from,
                    &filter.to,
                    &filter.kind,
                    &filter.sub_type,
                    &filter.origin,
                    &filter.origin_id,
                    &(cap + 1),
                ],
            )
            .await?;
        let truncated = rows.len() as i64 > cap;
        Ok((
            rows.iter()
                .take(cap as usize)
                .map(|row| EventRow {
                    event_id: row.get::<_, i64>(0),
                    date: row.get(1),
                    kind: row.get::<_, i16>(2),
                    sub_type: row.get::<_, i16>(3),
                    origin: row.get::<_, i16>(4),
                    origin_id: row.get::<_, i32>(5),
                    message: row.get(6),
                })
                .collect(),
            truncated,
        ))
    }

    async fn event_params(&self, event_id: i64) -> Result<Vec<(String, String)>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   name, value ",
            "FROM     ", ADMIN_EVENT_PARAMS, " ",
            "WHERE    event_id = $1 ",
            "ORDER BY name"
        );
        Ok(self
            .query(SQL, &[&event_id])
            .await?
            .iter()
            .map(|row| (row.get(0), row.get(1)))
            .collect())
    }
}
