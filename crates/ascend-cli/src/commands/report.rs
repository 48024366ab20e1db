use std::sync::Arc;

use ascend_core::integrations::DiscordClient;
use ascend_core::storage::ReportArchive;
use ascend_core::{stats, Config, Database, WeeklyReport, WeeklyReporter};
use chrono::Utc;
use clap::Subcommand;
use tracing::info;

use super::CmdResult;

#[derive(Subcommand)]
pub enum ReportAction {
    /// Summarize the last seven days of a guild
    Weekly {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Post the report to Discord and archive it instead of printing it
        #[arg(long)]
        post: bool,
        /// Channel to post to (defaults to discord.announce_channel_id)
        #[arg(long)]
        channel: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent archived weekly report of a guild
    Last {
        /// Guild id
        #[arg(long)]
        guild: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn print_report(report: &WeeklyReport, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(())
}

pub async fn run(action: ReportAction) -> CmdResult {
    match action {
        ReportAction::Weekly {
            guild,
            post,
            channel,
            json,
        } => {
            let config = Config::load()?;
            let db = Arc::new(Database::open()?);

            if post {
                let channel = channel
                    .or(config.discord.announce_channel_id.clone())
                    .ok_or("no channel: pass --channel or set discord.announce_channel_id")?;
                let client = Arc::new(DiscordClient::from_stored_token(&config.discord.api_base)?);
                WeeklyReporter::new(db.clone(), db.clone(), db, client, guild.as_str())
                    .post_to(Some(channel.clone()))
                    .publish(Utc::now())
                    .await?;
                info!(guild = %guild, channel = %channel, "weekly report posted");
                println!("posted to {channel}");
            } else {
                let report = stats::weekly_report(db.as_ref(), db.as_ref(), &guild, Utc::now()).await?;
                print_report(&report, json)?;
            }
        }
        ReportAction::Last { guild, json } => {
            let db = Database::open()?;
            match db.latest_report(&guild).await? {
                Some(report) => print_report(&report, json)?,
                None => println!("No archived report for guild {guild}."),
            }
        }
    }
    Ok(())
}
