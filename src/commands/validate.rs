use anyhow::Result;

use faqharvest_core::config::AppConfig;

/// The TOML layer already rejected unknown keys; this applies the semantic
/// checks and reports the effective crawl shape.
pub fn run(config: &AppConfig) -> Result<()> {
    config.validate()?;

    println!("configuration OK");
    println!("  seed sitemap:   {}", config.crawl.seed_sitemap_url);
    println!("  domains:        {}", config.scope.allowed_domains.join(", "));
    println!(
        "  depth budgets:  faq={} general={}",
        config.crawl.max_depth_faq, config.crawl.max_depth_general
    );
    println!(
        "  workers:        {} @ {:.1} req/s per host",
        config.crawl.worker_count, config.http.per_host_rps
    );
    println!("  registry:       {}", config.storage.registry_path.display());
    println!("  artifacts:      {}", config.storage.artifacts_dir.display());
    Ok(())
}
