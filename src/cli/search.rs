use super::CliContext;

pub async fn run_search(ctx: &CliContext, query: &str, limit: usize) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let results = client.search(query, limit.clamp(1, 50)).await?;

    if results.results.is_empty() {
        println!("No results for '{query}'.");
        return Ok(());
    }

    for entry in &results.results {
        let summary = entry.summary.as_deref().unwrap_or("");
        println!(
            "{}@{}  {}  {}",
            entry.slug, entry.version, entry.display_name, summary
        );
    }
    Ok(())
}

pub async fn run_explore(ctx: &CliContext, limit: usize) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let skills = client.explore(limit.clamp(1, 50)).await?;

    if skills.is_empty() {
        println!("Nothing trending right now.");
        return Ok(());
    }

    for skill in &skills {
        let summary = truncate_summary(skill.summary.as_deref().unwrap_or(""));
        println!("{}  {}  {}", skill.slug, skill.display_name, summary);
    }
    Ok(())
}

/// Summaries are clipped to 50 characters, the ellipsis included.
fn truncate_summary(summary: &str) -> String {
    const LIMIT: usize = 50;
    let count = summary.chars().count();
    if count <= LIMIT {
        return summary.to_string();
    }
    let mut out: String = summary.chars().take(LIMIT - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_summary() {
        assert_eq!(truncate_summary("short"), "short");

        let exact: String = "x".repeat(50);
        assert_eq!(truncate_summary(&exact), exact);

        let long: String = "x".repeat(60);
        let truncated = truncate_summary(&long);
        assert_eq!(truncated.chars().count(), 50);
        assert!(truncated.ends_with('…'));
    }
}
