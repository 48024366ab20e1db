use ascend_core::{stats, Config, Database};

use super::CmdResult;

pub async fn user(user_id: &str, name: Option<&str>) -> CmdResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let stats = stats::user_stats(&db, user_id, name.unwrap_or(user_id), &config.progression).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub async fn leaderboard(limit: usize) -> CmdResult {
    let db = Database::open()?;
    let entries = stats::leaderboard(&db, limit).await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
