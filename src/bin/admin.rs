//! Admin Command Binary
//!
//! One-shot typed dispatch of the identity and lookup commands the
//! lobby bot would otherwise drive.

use clap::Parser;
use clap::Subcommand;
use sldb::config::Config;
use sldb::identity::Actor;
use sldb::identity::Command;
use sldb::identity::Flags;
use sldb::ledger;
use sldb::query;
use sldb::rating::GameType;
use sldb::rating::Period;
use sldb::store::Directory;
use sldb::store::EventFilter;
use sldb::store::Scores;

#[derive(Parser)]
#[command(about = "SLDB identity and lookup commands")]
struct Args {
    /// path to the JSON configuration file
    #[arg(long, default_value = "sldb.json")]
    config: String,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// merge two users into one
    Join {
        u1: i32,
        u2: i32,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        sticky: bool,
        #[arg(long)]
        test: bool,
    },
    /// split an account (and its evidence dependencies) off a user
    Split {
        user: i32,
        account: i32,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        sticky: bool,
        #[arg(long)]
        test: bool,
    },
    /// mark two accounts probable smurfs
    ProbableSmurf { a1: i32, a2: i32 },
    /// mark two accounts as different people
    NotSmurf { a1: i32, a2: i32 },
    /// rename a user
    SetName { user: i32, name: String },
    /// staged name search over accounts and users
    Whois {
        search: String,
        #[arg(long)]
        user_first: bool,
    },
    /// recent admin events
    History {
        #[arg(long)]
        kind: Option<i16>,
        #[arg(long)]
        origin: Option<i16>,
        #[arg(long)]
        origin_id: Option<i32>,
    },
    /// the five rating dimensions of an account
    Skills {
        period: u32,
        account: i32,
        mod_short: String,
        #[arg(long)]
        ip: Option<String>,
    },
    /// leaderboard by conservative skill
    Top {
        period: u32,
        mod_short: String,
        #[arg(long, default_value = "global")]
        dimension: GameType,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() {
    sldb::init();
    let args = Args::parse();
    let cfg = Config::load(&args.config).expect("load configuration");
    let client = sldb::db().await;
    let actor = Actor::default();
    match args.cmd {
        Cmd::Join {
            u1,
            u2,
            force,
            sticky,
            test,
        } => {
            let command = Command::Join {
                u1,
                u2,
                flags: Flags { force, sticky, test },
            };
            report(sldb::identity::dispatch(&client, &cfg, actor, command).await);
        }
        Cmd::Split {
            user,
            account,
            force,
            sticky,
            test,
        } => {
            let command = Command::Split {
                user,
                account,
                flags: Flags { force, sticky, test },
            };
            report(sldb::identity::dispatch(&client, &cfg, actor, command).await);
        }
        Cmd::ProbableSmurf { a1, a2 } => {
            let command = Command::ProbableSmurf { a1, a2 };
            report(sldb::identity::dispatch(&client, &cfg, actor, command).await);
        }
        Cmd::NotSmurf { a1, a2 } => {
            let command = Command::NotSmurf { a1, a2 };
            report(sldb::identity::dispatch(&client, &cfg, actor, command).await);
        }
        Cmd::SetName { user, name } => {
            let command = Command::SetName { user, name };
            report(sldb::identity::dispatch(&client, &cfg, actor, command).await);
        }
        Cmd::Whois { search, user_first } => {
            let found = client
                .identify(&search, user_first)
                .await
                .expect("name search");
            println!("{:?}", found);
        }
        Cmd::History {
            kind,
            origin,
            origin_id,
        } => {
            let filter = EventFilter {
                kind,
                origin,
                origin_id,
                ..EventFilter::default()
            };
            let (events, truncated) = ledger::history(&client, &filter)
                .await
                .expect("event history");
            for view in events {
                println!(
                    "{} #{} [{}/{}] {}",
                    view.row.date.format("%Y-%m-%d %H:%M:%S"),
                    view.row.event_id,
                    view.row.kind,
                    view.row.sub_type,
                    view.row.message
                );
            }
            if truncated {
                println!("(truncated at {})", ledger::QUERY_CAP);
            }
        }
        Cmd::Skills {
            period,
            account,
            mod_short,
            ip,
        } => {
            let ip = ip.map(|text| parse_ip(&text).expect("dotted-quad ip"));
            let report = sldb::store::retrying(|| {
                query::skills(&client, Period::from(period), account, ip, &mod_short)
            })
            .await
            .expect("skills lookup");
            for (dim, rating) in report {
                println!("{:8} {}", dim.to_string(), rating);
            }
        }
        Cmd::Top {
            period,
            mod_short,
            dimension,
            limit,
        } => {
            let rows = client
                .top_skills(Period::from(period), &mod_short, dimension, limit)
                .await
                .expect("leaderboard");
            for (place, (user, skill)) in rows.into_iter().enumerate() {
                println!("{:3}. user {:<8} {:.3}", place + 1, user, skill);
            }
        }
    }
}

fn report(outcome: Result<sldb::identity::Reply, sldb::identity::CommandError>) {
    match outcome {
        Ok(reply) => println!("{:?}", reply),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn parse_ip(text: &str) -> Option<u32> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for slot in &mut octets {
        *slot = parts.next()?.parse().ok()?;
    }
    match parts.next() {
        None => Some(u32::from_be_bytes(octets)),
        Some(_) => None,
    }
}
