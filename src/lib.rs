pub mod config;
pub mod identity;
pub mod ledger;
pub mod prefs;
pub mod query;
pub mod rating;
pub mod store;
pub mod trueskill;

/// dimensional analysis types
pub type AccountId = i32;
pub type UserId = i32;
pub type GameId = i64;
pub type Timestamp = i64;
pub type Mu = f64;
pub type Sigma = f64;
pub type Skill = f64;

// trueskill parameters
const DEFAULT_MU: Mu = 25.0;
const DEFAULT_SIGMA: Sigma = 25.0 / 3.0;
const DEFAULT_BETA: f64 = 25.0 / 6.0;
const DEFAULT_TAU: f64 = 25.0 / 300.0;
const DEFAULT_DRAW_PROBABILITY: f64 = 0.10;

// inactivity penalty parameters
const PENALTY_THRESHOLD: u32 = 5;
const PENALTY_MIN_MU: Mu = 22.0;
const PENALTY_MAX_SIGMA: Sigma = 5.0;
const PENALTY_MAX_COUNT: u32 = 10;
const PENALTY_MU_STEP: Mu = 0.05;
const PENALTY_SIGMA_STEP: Sigma = 0.05;

// identity evidence parameters
const DYN_IP_THRESHOLD: usize = 16;
const DYN_IP_RANGE: u32 = 4;

// engine scheduling parameters
const RERATE_DELAY_SECS: i64 = 300;
const MAX_RUN_TIME_SECS: u64 = 60 * 60 * 24 * 7;
const IDLE_SLEEP_MILLIS: u64 = 1_000;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// initialize logging and exit on ctrl-c
pub fn init() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// get a database connection and return the client
pub async fn db() -> std::sync::Arc<tokio_postgres::Client> {
    log::info!("connecting to database");
    let tls = tokio_postgres::tls::NoTls;
    let ref url = std::env::var("DB_URL").expect("DB_URL must be set");
    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .expect("database connection failed");
    tokio::spawn(connection);
    std::sync::Arc::new(client)
}
