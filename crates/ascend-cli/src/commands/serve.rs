//! `serve`: host a focus service and drive it with line commands on stdin.
//!
//! ```text
//! start <user> <guild> <channel> <minutes> [name]
//! cancel <user>
//! status <user>
//! count
//! quit
//! ```
//!
//! Every command gets one JSON line on stdout. When `report.guild_id` is
//! configured the weekly report also runs on its schedule.

use std::sync::Arc;

use ascend_core::integrations::{
    AnnounceBadgeHook, BadgeHook, DiscordBadgeHook, DiscordClient, LogSink, NotificationSink,
};
use ascend_core::storage::{ReportArchive, SessionLog, UserStore};
use ascend_core::{
    Config, Database, FocusService, MemoryStore, Notification, StartError, SystemClock,
    WeeklyReporter,
};
use chrono::Utc;
use clap::Args;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::CmdResult;

#[derive(Args)]
pub struct ServeArgs {
    /// Keep progression in memory instead of the SQLite database
    #[arg(long)]
    ephemeral: bool,
    /// Deliver notifications through the Discord bot instead of the log
    #[arg(long)]
    discord: bool,
}

#[derive(Debug, PartialEq)]
enum Request {
    Start {
        user: String,
        guild: String,
        channel: String,
        minutes: u32,
        name: Option<String>,
    },
    Cancel {
        user: String,
    },
    Status {
        user: String,
    },
    Count,
    Quit,
}

fn parse_request(line: &str) -> Result<Request, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["start", user, guild, channel, minutes, name @ ..] if name.len() <= 1 => {
            let minutes = minutes
                .parse()
                .map_err(|_| format!("invalid minutes: {minutes}"))?;
            Ok(Request::Start {
                user: user.to_string(),
                guild: guild.to_string(),
                channel: channel.to_string(),
                minutes,
                name: name.first().map(|n| n.to_string()),
            })
        }
        ["cancel", user] => Ok(Request::Cancel {
            user: user.to_string(),
        }),
        ["status", user] => Ok(Request::Status {
            user: user.to_string(),
        }),
        ["count"] => Ok(Request::Count),
        ["quit"] | ["exit"] => Ok(Request::Quit),
        [cmd, ..] => Err(format!("unknown or malformed command: {cmd}")),
        [] => Err("empty command".to_string()),
    }
}

fn start_error_reply(e: &StartError) -> Value {
    let kind = match e {
        StartError::DurationOutOfRange { .. } => "duration_out_of_range",
        StartError::AlreadyActive(_) => "already_active",
        StartError::OnCooldown { .. } => "on_cooldown",
    };
    let mut reply = json!({ "ok": false, "error": kind, "message": e.to_string() });
    if let StartError::OnCooldown { remaining_ms } = e {
        reply["remaining_ms"] = json!(remaining_ms);
    }
    reply
}

async fn announce(sink: &dyn NotificationSink, channel: &str, notification: Notification) {
    if let Err(e) = sink.send_to_channel(channel, &notification).await {
        warn!(channel, error = %e, "notification not delivered");
    }
}

async fn handle(service: &FocusService, sink: &dyn NotificationSink, request: Request) -> Value {
    match request {
        Request::Start {
            user,
            guild,
            channel,
            minutes,
            name,
        } => {
            let started = match &name {
                Some(name) => {
                    service.start_focus_session_as(&user, name, &guild, &channel, minutes)
                }
                None => service.start_focus_session(&user, &guild, &channel, minutes),
            };
            match started {
                Ok(handle) => {
                    announce(
                        sink,
                        &channel,
                        Notification::SessionStarted {
                            user_id: user.clone(),
                            duration_minutes: minutes,
                            ends_at: handle.ends_at,
                        },
                    )
                    .await;
                    json!({ "ok": true, "session": handle })
                }
                Err(e) => start_error_reply(&e),
            }
        }
        Request::Cancel { user } => {
            let channel = service.get_active_session(&user).map(|s| s.channel_id);
            let cancelled = service.cancel_focus_session(&user);
            if let (true, Some(channel)) = (cancelled, channel) {
                announce(
                    sink,
                    &channel,
                    Notification::SessionCancelled {
                        user_id: user.clone(),
                        at: Utc::now(),
                    },
                )
                .await;
            }
            json!({ "ok": cancelled, "cancelled": cancelled })
        }
        Request::Status { user } => json!({
            "ok": true,
            "session": service.get_active_session(&user),
            "cooldown_remaining_ms": service.cooldown_remaining(&user),
        }),
        Request::Count => json!({ "ok": true, "active": service.active_session_count() }),
        Request::Quit => json!({ "ok": true }),
    }
}

type Adapters = (Arc<dyn NotificationSink>, Arc<dyn BadgeHook>);

fn adapters(config: &Config, discord: bool) -> Result<Adapters, Box<dyn std::error::Error>> {
    let announce_channel = config.discord.announce_channel_id.clone();
    if discord {
        let client = Arc::new(DiscordClient::from_stored_token(&config.discord.api_base)?);
        let hook: Arc<dyn BadgeHook> =
            Arc::new(DiscordBadgeHook::new(client.clone(), announce_channel));
        let sink: Arc<dyn NotificationSink> = client;
        return Ok((sink, hook));
    }
    let sink: Arc<dyn NotificationSink> = Arc::new(LogSink::new());
    let hook: Arc<dyn BadgeHook> = Arc::new(AnnounceBadgeHook::new(sink.clone(), announce_channel));
    Ok((sink, hook))
}

pub async fn run(args: ServeArgs) -> CmdResult {
    let config = Config::load()?;

    let (users, log, archive): (Arc<dyn UserStore>, Arc<dyn SessionLog>, Arc<dyn ReportArchive>) =
        if args.ephemeral {
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store.clone(), store)
        } else {
            let db = Arc::new(Database::open()?);
            (db.clone(), db.clone(), db)
        };
    let (sink, hook) = adapters(&config, args.discord)?;

    let reports = config.report.guild_id.as_ref().map(|guild_id| {
        info!(
            guild_id = %guild_id,
            weekday = %config.report.weekday,
            hour_utc = config.report.hour_utc,
            "weekly report scheduled"
        );
        WeeklyReporter::new(users.clone(), log.clone(), archive, sink.clone(), guild_id.as_str())
            .post_to(config.discord.announce_channel_id.clone())
            .spawn(
                config.report.weekday,
                config.report.hour_utc,
                Arc::new(SystemClock),
            )
    });

    let service = FocusService::from_config(&config, users, log, sink.clone(), hook);
    let sweeper = service.spawn_cooldown_sweep();
    info!(
        ephemeral = args.ephemeral,
        sink = sink.name(),
        "focus engine ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match parse_request(line) {
            Ok(Request::Quit) => break,
            Ok(request) => handle(&service, sink.as_ref(), request).await,
            Err(message) => json!({ "ok": false, "error": "bad_request", "message": message }),
        };
        println!("{reply}");
    }

    sweeper.abort();
    if let Some(reports) = reports {
        reports.abort();
    }
    service.shutdown();
    Ok(())
}
