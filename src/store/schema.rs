use super::StoreError;
use crate::rating::Period;
use tokio_postgres::Client;

// table names, shared by every SQL constant in this module tree
pub const ACCOUNTS: &str = "accounts";
pub const ACCOUNT_NAMES: &str = "account_names";
pub const ACCOUNT_COUNTRIES: &str = "account_countries";
pub const ACCOUNT_HARDWARE: &str = "account_hardware";
pub const USERS: &str = "users";
pub const USER_ACCOUNTS: &str = "user_accounts";
pub const USER_IPS: &str = "user_ips";
pub const SMURFS: &str = "smurfs";
pub const GAMES: &str = "games";
pub const GAME_PLAYERS: &str = "game_players";
pub const GAME_BOTS: &str = "game_bots";
pub const RATING_QUEUE: &str = "rating_queue";
pub const RATINGS: &str = "ratings";
pub const GAME_RATINGS: &str = "game_ratings";
pub const RERATE_REQUESTS: &str = "rerate_requests";
pub const PENDING_RERATES: &str = "pending_rerates";
pub const RATING_STATE: &str = "rating_state";
pub const ADMIN_EVENTS: &str = "admin_events";
pub const ADMIN_EVENT_PARAMS: &str = "admin_event_params";
pub const ACCOUNT_PREFS: &str = "account_prefs";
pub const USER_PREFS: &str = "user_prefs";

/// idempotent schema bootstrap. the per-player rating tables partition by
/// period; months are attached lazily by `ensure_partition` and never
/// dropped here.
pub async fn ensure(client: &Client) -> Result<(), StoreError> {
    const DDL: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        account_id  INTEGER PRIMARY KEY,
        rank        SMALLINT NOT NULL DEFAULT 0,
        bot         BOOLEAN NOT NULL DEFAULT FALSE,
        cpu         BIGINT,
        last_update TIMESTAMPTZ
    );
    CREATE TABLE IF NOT EXISTS account_names (
        account_id  INTEGER NOT NULL,
        name        TEXT NOT NULL,
        last_seen   TIMESTAMPTZ,
        PRIMARY KEY (account_id, name)
    );
    CREATE TABLE IF NOT EXISTS account_countries (
        account_id  INTEGER NOT NULL,
        country     TEXT NOT NULL,
        last_seen   TIMESTAMPTZ,
        PRIMARY KEY (account_id, country)
    );
    CREATE TABLE IF NOT EXISTS account_hardware (
        account_id  INTEGER NOT NULL,
        hardware    TEXT NOT NULL,
        last_seen   TIMESTAMPTZ,
        PRIMARY KEY (account_id, hardware)
    );
    CREATE TABLE IF NOT EXISTS users (
        user_id     INTEGER PRIMARY KEY,
        name        VARCHAR(24) NOT NULL UNIQUE,
        clan        TEXT,
        email       TEXT
    );
    CREATE TABLE IF NOT EXISTS user_accounts (
        account_id  INTEGER PRIMARY KEY,
        user_id     INTEGER NOT NULL,
        nb_ips      INTEGER NOT NULL DEFAULT 0,
        no_smurf    BOOLEAN NOT NULL DEFAULT FALSE
    );
    CREATE INDEX IF NOT EXISTS idx_user_accounts_user ON user_accounts (user_id);
    CREATE TABLE IF NOT EXISTS user_ips (
        user_id     INTEGER NOT NULL,
        ip_start    BIGINT NOT NULL,
        ip_end      BIGINT NOT NULL,
        PRIMARY KEY (user_id, ip_start, ip_end)
    );
    CREATE TABLE IF NOT EXISTS smurfs (
        id1         INTEGER NOT NULL,
        id2         INTEGER NOT NULL,
        status      SMALLINT NOT NULL,
        origin      SMALLINT NOT NULL DEFAULT 0,
        PRIMARY KEY (id1, id2),
        CHECK (id1 < id2),
        CHECK (status IN (0, 1, 2))
    );
    CREATE TABLE IF NOT EXISTS games (
        game_id     BIGINT PRIMARY KEY,
        host        INTEGER NOT NULL,
        started     BIGINT NOT NULL,
        ended       BIGINT NOT NULL,
        reported    BIGINT NOT NULL,
        mod_name    TEXT NOT NULL,
        map_name    TEXT NOT NULL,
        undecided   BOOLEAN NOT NULL DEFAULT FALSE,
        cheating    BOOLEAN NOT NULL DEFAULT FALSE
    );
    CREATE INDEX IF NOT EXISTS idx_games_reported ON games (reported, game_id);
    CREATE TABLE IF NOT EXISTS game_players (
        game_id     BIGINT NOT NULL,
        account_id  INTEGER NOT NULL,
        team        INTEGER,
        ally_team   INTEGER,
        win         BOOLEAN NOT NULL DEFAULT FALSE,
        ip          BIGINT,
        PRIMARY KEY (game_id, account_id)
    );
    CREATE INDEX IF NOT EXISTS idx_game_players_account ON game_players (account_id);
    CREATE TABLE IF NOT EXISTS game_bots (
        game_id     BIGINT NOT NULL,
        name        TEXT NOT NULL,
        team        INTEGER,
        ally_team   INTEGER,
        win         BOOLEAN NOT NULL DEFAULT FALSE
    );
    CREATE TABLE IF NOT EXISTS rating_queue (
        game_id     BIGINT PRIMARY KEY,
        reported    BIGINT NOT NULL,
        status      SMALLINT NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_rating_queue_order ON rating_queue (status, reported, game_id);
    CREATE TABLE IF NOT EXISTS ratings (
        period      INTEGER NOT NULL,
        user_id     INTEGER NOT NULL,
        mod_short   TEXT NOT NULL,
        game_type   SMALLINT NOT NULL,
        mu          DOUBLE PRECISION NOT NULL,
        sigma       DOUBLE PRECISION NOT NULL,
        skill       DOUBLE PRECISION NOT NULL,
        penalties   INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (period, user_id, mod_short, game_type)
    ) PARTITION BY LIST (period);
    CREATE TABLE IF NOT EXISTS game_ratings (
        period       INTEGER NOT NULL,
        game_id      BIGINT NOT NULL,
        account_id   INTEGER NOT NULL,
        user_id      INTEGER NOT NULL,
        mod_short    TEXT NOT NULL,
        game_type    SMALLINT NOT NULL,
        mu_before    DOUBLE PRECISION NOT NULL,
        sigma_before DOUBLE PRECISION NOT NULL,
        mu_after     DOUBLE PRECISION NOT NULL,
        sigma_after  DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (period, game_id, account_id, game_type)
    ) PARTITION BY LIST (period);
    CREATE TABLE IF NOT EXISTS rerate_requests (
        id          BIGSERIAL PRIMARY KEY,
        kind        CHAR(1) NOT NULL,
        account_id  INTEGER,
        game_id     BIGINT,
        mod_short   TEXT,
        period      INTEGER,
        requested   BIGINT NOT NULL,
        status      SMALLINT NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS pending_rerates (
        mod_short   TEXT PRIMARY KEY,
        period      INTEGER NOT NULL,
        requested   BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS rating_state (
        key         TEXT PRIMARY KEY,
        value       BIGINT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS admin_events (
        event_id    BIGSERIAL PRIMARY KEY,
        date        TIMESTAMPTZ NOT NULL,
        type        SMALLINT NOT NULL,
        sub_type    SMALLINT NOT NULL DEFAULT 0,
        origin      SMALLINT NOT NULL,
        origin_id   INTEGER NOT NULL DEFAULT 0,
        message     TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_admin_events_date ON admin_events (date);
    CREATE TABLE IF NOT EXISTS admin_event_params (
        event_id    BIGINT NOT NULL,
        name        TEXT NOT NULL,
        value       TEXT NOT NULL,
        PRIMARY KEY (event_id, name)
    );
    CREATE TABLE IF NOT EXISTS account_prefs (
        account_id  INTEGER NOT NULL,
        name        TEXT NOT NULL,
        value       TEXT NOT NULL,
        PRIMARY KEY (account_id, name)
    );
    CREATE TABLE IF NOT EXISTS user_prefs (
        user_id     INTEGER NOT NULL,
        name        TEXT NOT NULL,
        value       TEXT NOT NULL,
        PRIMARY KEY (user_id, name)
    );
    ";
    client.batch_execute(DDL).await?;
    Ok(())
}

/// attach the month's partitions for both per-player rating tables.
/// idempotent; called before the first write of any new period.
pub async fn ensure_partition(client: &Client, period: Period) -> Result<(), StoreError> {
    for table in [RATINGS, GAME_RATINGS] {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {t}_p{p} PARTITION OF {t} FOR VALUES IN ({p})",
            t = table,
            p = u32::from(period),
        );
        client.batch_execute(&sql).await?;
    }
    Ok(())
}
