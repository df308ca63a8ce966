use anyhow::Result;

use faqharvest_core::config::AppConfig;
use faqharvest_registry::Registry;

pub async fn run(config: AppConfig) -> Result<()> {
    let registry = Registry::open(&config.storage.registry_path).await?;
    registry.run_migrations().await?;

    let pages = registry.page_count().await?;
    let by_status = registry.status_counts().await?;
    let edges = registry.edge_count().await?;
    let assets = registry.asset_count().await?;
    let faqs = registry.faq_count().await?;
    let external = registry.external_domain_counts().await?;

    println!("\n╔══════════════════════════════════════════════╗");
    println!("║            faqharvest status                 ║");
    println!("╠══════════════════════════════════════════════╣");
    println!("║ Pages known:        {:>20}    ║", pages);
    for (status, count) in &by_status {
        println!("║   {:<18}{:>20}    ║", status, count);
    }
    println!("║ Link edges:         {:>20}    ║", edges);
    println!("║ Assets:             {:>20}    ║", assets);
    println!("║ FAQ items:          {:>20}    ║", faqs);
    println!("║ External domains:   {:>20}    ║", external.len());
    println!("╚══════════════════════════════════════════════╝\n");

    if !external.is_empty() {
        println!("Top external domains:");
        for (domain, count) in external.iter().take(5) {
            println!("  {:>6}  {}", count, domain);
        }
        println!();
    }

    Ok(())
}
