//! Rating Engine Binary
//!
//! The long-lived rating worker: incremental match rating, monthly
//! rollover, and identity-triggered batch re-rates, all against the
//! postgres warehouse named by DB_URL.

use clap::Parser;
use sldb::config::Config;
use sldb::rating::Engine;
use sldb::rating::Exit;
use sldb::rating::Signals;

#[derive(Parser)]
#[command(about = "SLDB rating engine worker")]
struct Args {
    /// path to the JSON configuration file
    #[arg(long, default_value = "sldb.json")]
    config: String,
}

#[tokio::main]
async fn main() {
    sldb::init();
    let args = Args::parse();
    let cfg = Config::load(&args.config).expect("load configuration");
    let client = sldb::db().await;
    let signals = Signals::install();
    let engine = Engine::new(client, cfg, signals).expect("configure engine");
    match engine.run().await.expect("engine loop") {
        Exit::Shutdown => {}
        Exit::Restart => restart(),
    }
}

/// graceful restart: replace this process with a fresh copy of itself
fn restart() -> ! {
    use std::os::unix::process::CommandExt;
    let exe = std::env::current_exe().expect("own executable path");
    let err = std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec();
    panic!("re-exec failed: {}", err);
}
