use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use faqharvest_core::config::AppConfig;
use faqharvest_registry::Registry;

/// Dump the registry as line-delimited JSON plus a CSV of the FAQ items.
pub async fn run(config: AppConfig, output: Option<PathBuf>) -> Result<()> {
    let registry = Registry::open(&config.storage.registry_path).await?;
    registry.run_migrations().await?;

    let out_dir = output.unwrap_or_else(|| config.storage.export_dir.clone());
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create export dir {}", out_dir.display()))?;

    let pages = registry.list_pages().await?;
    write_jsonl(&out_dir.join("pages.jsonl"), &pages)?;

    let assets = registry.list_assets().await?;
    write_jsonl(&out_dir.join("assets.jsonl"), &assets)?;

    let faqs = registry.list_faqs().await?;
    write_jsonl(&out_dir.join("faq_items.jsonl"), &faqs)?;

    let csv_path = out_dir.join("faq_items.csv");
    let mut writer = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("cannot write {}", csv_path.display()))?;
    writer.write_record(["page_url", "question", "answer", "answer_mode"])?;
    for item in &faqs {
        writer.write_record([
            item.page_url.as_str(),
            item.question.as_str(),
            item.answer.as_str(),
            item.answer_mode.as_str(),
        ])?;
    }
    writer.flush()?;

    info!(
        pages = pages.len(),
        assets = assets.len(),
        faqs = faqs.len(),
        dir = %out_dir.display(),
        "export complete"
    );
    Ok(())
}

fn write_jsonl<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot write {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
