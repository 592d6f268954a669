use chrono::Utc;
use mergepulse_host::PullRequestSource;

use super::{github_source, load_config};

pub async fn run() -> anyhow::Result<()> {
    let config = load_config()?;
    let source = github_source(&config)?;

    let rl = source.rate_limit_status().await?;
    let resets_in = (rl.reset_at - Utc::now()).num_minutes().max(0);
    println!(
        "Rate limit: {}/{} remaining (resets {}, in {} min)",
        rl.remaining, rl.limit, rl.reset_at, resets_in
    );
    if rl.remaining < config.quota_buffer {
        println!(
            "Below the configured buffer of {}; syncs will pause until reset.",
            config.quota_buffer
        );
    }

    for repo in &config.repositories {
        let label = if source.validate_repository(repo).await? {
            "ok"
        } else {
            "not found"
        };
        println!("  {repo}: {label}");
    }
    Ok(())
}
