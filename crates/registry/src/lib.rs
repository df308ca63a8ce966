use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};
use url::Url;

use faqharvest_core::{
    AssetRecord, EdgeRecord, FaqItem, FrontierEntry, Lineage, PageRecord, PageStatus,
    UpsertOutcome,
};

/// Terminal-side fields written by `complete`.
#[derive(Debug, Clone, Default)]
pub struct CompletedPage {
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub raw_path: Option<String>,
    pub markdown_path: Option<String>,
    pub attempts: u32,
    pub postprocess_error: Option<String>,
}

/// Persisted robots.txt snapshot for one host.
#[derive(Debug, Clone)]
pub struct RobotsRow {
    pub host: String,
    pub body: Option<String>,
    pub user_agent: String,
    pub fetched_at: DateTime<Utc>,
    pub unreachable: bool,
}

type PageRow = (
    String,                // url
    String,                // host
    i64,                   // depth
    String,                // lineage
    String,                // status
    Option<i64>,           // http_status
    Option<String>,        // content_type
    Option<DateTime<Utc>>, // fetched_at
    Option<String>,        // content_hash
    Option<String>,        // raw_path
    Option<String>,        // markdown_path
    Option<String>,        // parent_url
    i64,                   // attempts
    Option<String>,        // postprocess_error
);

const PAGE_COLUMNS: &str = "url, host, depth, lineage, status, http_status, content_type, \
     fetched_at, content_hash, raw_path, markdown_path, parent_url, attempts, postprocess_error";

/// Single-file SQLite store. The sole source of truth for resume: the
/// engine keeps no frontier state that is not reconstructible from here.
#[derive(Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        info!(path = %path.display(), "registry opened");
        Ok(Self { pool })
    }

    /// Ephemeral in-memory registry for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    /// Offer a URL to the frontier.
    ///
    /// NEW inserts a PENDING row; PROMOTED lowers the depth and/or upgrades
    /// GENERAL to FAQ on an existing PENDING row; SKIPPED leaves terminal
    /// rows and equal-or-better frontier entries untouched.
    pub async fn upsert_frontier(
        &self,
        url: &Url,
        parent: Option<&str>,
        depth: u32,
        lineage: Lineage,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let existing: Option<(String, i64, String)> =
            sqlx::query_as("SELECT status, depth, lineage FROM pages WHERE url = ?1")
                .bind(url.as_str())
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO pages (url, host, path, depth, lineage, status, parent_url)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
                )
                .bind(url.as_str())
                .bind(url.host_str().unwrap_or_default())
                .bind(url.path())
                .bind(depth as i64)
                .bind(lineage.as_str())
                .bind(parent)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::New
            }
            Some((status, _, _)) if status != "pending" => UpsertOutcome::Skipped,
            Some((_, old_depth, old_lineage)) => {
                let old_lineage = Lineage::parse(&old_lineage).unwrap_or(Lineage::General);
                let merged = old_lineage.merge(lineage);
                let new_depth = (depth as i64).min(old_depth);
                if new_depth < old_depth || merged != old_lineage {
                    sqlx::query(
                        "UPDATE pages SET depth = ?2, lineage = ?3,
                                parent_url = COALESCE(?4, parent_url)
                         WHERE url = ?1",
                    )
                    .bind(url.as_str())
                    .bind(new_depth)
                    .bind(merged.as_str())
                    .bind(parent)
                    .execute(&mut *tx)
                    .await?;
                    UpsertOutcome::Promoted
                } else {
                    UpsertOutcome::Skipped
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    /// Durable depth-gate decision: the URL exists but its budget is spent.
    /// No-op when any row for the URL already exists.
    pub async fn mark_skipped_depth(
        &self,
        url: &Url,
        parent: Option<&str>,
        depth: u32,
        lineage: Lineage,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO pages (url, host, path, depth, lineage, status, parent_url)
             VALUES (?1, ?2, ?3, ?4, ?5, 'skipped_depth', ?6)
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(url.as_str())
        .bind(url.host_str().unwrap_or_default())
        .bind(url.path())
        .bind(depth as i64)
        .bind(lineage.as_str())
        .bind(parent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically claim the best PENDING row: ascending depth, then
    /// insertion order (FIFO within a depth level).
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<FrontierEntry>> {
        let row: Option<(String, i64, String, Option<String>)> = sqlx::query_as(
            "UPDATE pages SET status = 'fetching', claimed_by = ?1
             WHERE id = (SELECT id FROM pages WHERE status = 'pending'
                         ORDER BY depth ASC, id ASC LIMIT 1)
             RETURNING url, depth, lineage, parent_url",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((url, depth, lineage, parent)) = row else {
            return Ok(None);
        };
        let url = Url::parse(&url)
            .map_err(|e| anyhow::anyhow!("registry holds unparseable url {url}: {e}"))?;
        Ok(Some(FrontierEntry {
            url,
            depth: depth as u32,
            lineage: Lineage::parse(&lineage).unwrap_or(Lineage::General),
            parent,
        }))
    }

    /// Yield a claimed URL back to the frontier (politeness or shutdown),
    /// keeping its discovery depth and lineage.
    pub async fn release(&self, url: &str) -> Result<()> {
        sqlx::query(
            "UPDATE pages SET status = 'pending', claimed_by = NULL
             WHERE url = ?1 AND status = 'fetching'",
        )
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition a FETCHING row to its terminal status and record fetch
    /// metadata. Rows not in FETCHING are left untouched (terminal statuses
    /// never transition again).
    pub async fn complete(
        &self,
        url: &str,
        status: PageStatus,
        fields: &CompletedPage,
    ) -> Result<()> {
        debug_assert!(status.is_terminal());
        let result = sqlx::query(
            "UPDATE pages SET status = ?2, http_status = ?3, content_type = ?4,
                    fetched_at = ?5, content_hash = ?6, raw_path = ?7,
                    markdown_path = ?8, attempts = ?9, postprocess_error = ?10,
                    claimed_by = NULL
             WHERE url = ?1 AND status = 'fetching'",
        )
        .bind(url)
        .bind(status.as_str())
        .bind(fields.http_status.map(|s| s as i64))
        .bind(&fields.content_type)
        .bind(fields.fetched_at)
        .bind(&fields.content_hash)
        .bind(&fields.raw_path)
        .bind(&fields.markdown_path)
        .bind(fields.attempts as i64)
        .bind(&fields.postprocess_error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(url, status = status.as_str(), "complete on a row not in FETCHING, ignored");
        }
        Ok(())
    }

    /// Startup crash recovery: every orphaned FETCHING row returns to
    /// PENDING. Idempotent.
    pub async fn recover_orphans(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE pages SET status = 'pending', claimed_by = NULL
             WHERE status = 'fetching'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn record_edges(
        &self,
        from_url: &str,
        discovered_depth: u32,
        edges: &[EdgeRecord],
    ) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for edge in edges {
            sqlx::query(
                "INSERT INTO link_edges (from_url, to_url, anchor_text, is_external, discovered_depth)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (from_url, to_url) DO NOTHING",
            )
            .bind(from_url)
            .bind(&edge.to_url)
            .bind(&edge.anchor_text)
            .bind(edge.is_external)
            .bind(discovered_depth as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn record_asset(&self, asset: &AssetRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO assets (url, kind, local_path, content_hash, size_bytes, owning_page, extracted_text_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (url) DO UPDATE SET
                local_path = excluded.local_path,
                content_hash = excluded.content_hash,
                size_bytes = excluded.size_bytes,
                extracted_text_path = excluded.extracted_text_path",
        )
        .bind(&asset.url)
        .bind(asset.kind.as_str())
        .bind(&asset.local_path)
        .bind(&asset.content_hash)
        .bind(asset.size_bytes as i64)
        .bind(&asset.owning_page)
        .bind(&asset.extracted_text_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_faqs(&self, items: &[FaqItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO faq_items (page_url, question, answer, answer_mode)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (page_url, question) DO UPDATE SET
                    answer = excluded.answer,
                    answer_mode = excluded.answer_mode",
            )
            .bind(&item.page_url)
            .bind(&item.question)
            .bind(&item.answer)
            .bind(&item.answer_mode)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Record an out-of-scope URL and keep the per-domain aggregate in step.
    pub async fn record_external(&self, url: &Url, referrer: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO external_urls (url, referrer) VALUES (?1, ?2)
             ON CONFLICT (url) DO NOTHING",
        )
        .bind(url.as_str())
        .bind(referrer)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 1 {
            sqlx::query(
                "INSERT INTO external_domains (domain, url_count) VALUES (?1, 1)
                 ON CONFLICT (domain) DO UPDATE SET url_count = url_count + 1",
            )
            .bind(url.host_str().unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn record_robots(&self, row: &RobotsRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO robots (host, body, user_agent, fetched_at, unreachable)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (host) DO UPDATE SET
                body = excluded.body,
                user_agent = excluded.user_agent,
                fetched_at = excluded.fetched_at,
                unreachable = excluded.unreachable",
        )
        .bind(&row.host)
        .bind(&row.body)
        .bind(&row.user_agent)
        .bind(row.fetched_at)
        .bind(row.unreachable)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_robots(&self, host: &str) -> Result<Option<RobotsRow>> {
        let row: Option<(String, Option<String>, String, DateTime<Utc>, bool)> = sqlx::query_as(
            "SELECT host, body, user_agent, fetched_at, unreachable FROM robots WHERE host = ?1",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(host, body, user_agent, fetched_at, unreachable)| RobotsRow {
            host,
            body,
            user_agent,
            fetched_at,
            unreachable,
        }))
    }

    pub async fn pending_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM pages GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn page_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn edge_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM link_edges")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn asset_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM assets")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn faq_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM faq_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn external_domain_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT domain, url_count FROM external_domains ORDER BY url_count DESC, domain",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_page(&self, url: &str) -> Result<Option<PageRecord>> {
        let row: Option<PageRow> =
            sqlx::query_as(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE url = ?1"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(map_page_row))
    }

    pub async fn list_pages(&self) -> Result<Vec<PageRecord>> {
        let rows: Vec<PageRow> =
            sqlx::query_as(&format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(map_page_row).collect())
    }

    pub async fn list_faqs(&self) -> Result<Vec<FaqItem>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT page_url, question, answer, answer_mode FROM faq_items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(page_url, question, answer, answer_mode)| FaqItem {
                page_url,
                question,
                answer,
                answer_mode,
            })
            .collect())
    }

    pub async fn list_assets(&self) -> Result<Vec<AssetRecord>> {
        let rows: Vec<(String, String, String, String, i64, String, Option<String>)> =
            sqlx::query_as(
                "SELECT url, kind, local_path, content_hash, size_bytes, owning_page,
                        extracted_text_path
                 FROM assets ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |(url, kind, local_path, content_hash, size_bytes, owning_page, text)| {
                    AssetRecord {
                        url,
                        kind: match kind.as_str() {
                            "pdf" => faqharvest_core::AssetKind::Pdf,
                            "video" => faqharvest_core::AssetKind::Video,
                            "audio" => faqharvest_core::AssetKind::Audio,
                            _ => faqharvest_core::AssetKind::Other,
                        },
                        local_path,
                        content_hash,
                        size_bytes: size_bytes as u64,
                        owning_page,
                        extracted_text_path: text,
                    }
                },
            )
            .collect())
    }
}

fn map_page_row(row: PageRow) -> PageRecord {
    let (
        url,
        host,
        depth,
        lineage,
        status,
        http_status,
        content_type,
        fetched_at,
        content_hash,
        raw_path,
        markdown_path,
        parent_url,
        attempts,
        postprocess_error,
    ) = row;
    PageRecord {
        url,
        host,
        depth: depth as u32,
        lineage: Lineage::parse(&lineage).unwrap_or(Lineage::General),
        status: PageStatus::parse(&status).unwrap_or(PageStatus::FetchError),
        http_status: http_status.map(|s| s as u16),
        content_type,
        fetched_at,
        content_hash,
        raw_path,
        markdown_path,
        parent_url,
        attempts: attempts as u32,
        postprocess_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> Registry {
        let registry = Registry::in_memory().await.unwrap();
        registry.run_migrations().await.unwrap();
        registry
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn upsert_inserts_then_skips_duplicates() {
        let registry = registry().await;
        let u = url("https://example.com/a");

        let first = registry
            .upsert_frontier(&u, None, 2, Lineage::General)
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::New);

        let again = registry
            .upsert_frontier(&u, None, 2, Lineage::General)
            .await
            .unwrap();
        assert_eq!(again, UpsertOutcome::Skipped);

        let deeper = registry
            .upsert_frontier(&u, None, 5, Lineage::General)
            .await
            .unwrap();
        assert_eq!(deeper, UpsertOutcome::Skipped);
    }

    #[tokio::test]
    async fn upsert_promotes_on_lower_depth_or_faq_lineage() {
        let registry = registry().await;
        let u = url("https://example.com/a");
        registry
            .upsert_frontier(&u, None, 4, Lineage::General)
            .await
            .unwrap();

        let shallower = registry
            .upsert_frontier(&u, Some("https://example.com/"), 1, Lineage::General)
            .await
            .unwrap();
        assert_eq!(shallower, UpsertOutcome::Promoted);

        let upgraded = registry
            .upsert_frontier(&u, None, 3, Lineage::Faq)
            .await
            .unwrap();
        assert_eq!(upgraded, UpsertOutcome::Promoted);

        // FAQ lineage is absorbing and depth stays at the minimum seen.
        let entry = registry.claim_next("w0").await.unwrap().unwrap();
        assert_eq!(entry.depth, 1);
        assert_eq!(entry.lineage, Lineage::Faq);

        // A later GENERAL sighting cannot demote.
        registry.release(entry.url.as_str()).await.unwrap();
        let demote = registry
            .upsert_frontier(&u, None, 1, Lineage::General)
            .await
            .unwrap();
        assert_eq!(demote, UpsertOutcome::Skipped);
    }

    #[tokio::test]
    async fn terminal_rows_are_never_reopened() {
        let registry = registry().await;
        let u = url("https://example.com/done");
        registry
            .upsert_frontier(&u, None, 1, Lineage::General)
            .await
            .unwrap();
        registry.claim_next("w0").await.unwrap().unwrap();
        registry
            .complete(u.as_str(), PageStatus::Ok, &CompletedPage::default())
            .await
            .unwrap();

        let offered = registry
            .upsert_frontier(&u, None, 0, Lineage::Faq)
            .await
            .unwrap();
        assert_eq!(offered, UpsertOutcome::Skipped);
        assert!(registry.claim_next("w0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_orders_by_depth_then_insertion() {
        let registry = registry().await;
        registry
            .upsert_frontier(&url("https://example.com/deep"), None, 2, Lineage::General)
            .await
            .unwrap();
        registry
            .upsert_frontier(&url("https://example.com/first"), None, 0, Lineage::General)
            .await
            .unwrap();
        registry
            .upsert_frontier(&url("https://example.com/second"), None, 0, Lineage::General)
            .await
            .unwrap();

        let order: Vec<String> = {
            let mut claimed = Vec::new();
            while let Some(entry) = registry.claim_next("w0").await.unwrap() {
                claimed.push(entry.url.path().to_string());
            }
            claimed
        };
        assert_eq!(order, vec!["/first", "/second", "/deep"]);
    }

    #[tokio::test]
    async fn claim_marks_fetching_and_is_exclusive() {
        let registry = registry().await;
        registry
            .upsert_frontier(&url("https://example.com/a"), None, 0, Lineage::General)
            .await
            .unwrap();

        let first = registry.claim_next("w0").await.unwrap();
        assert!(first.is_some());
        let second = registry.claim_next("w1").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn recover_orphans_restores_pending_without_loss() {
        let registry = registry().await;
        for i in 0..3 {
            registry
                .upsert_frontier(
                    &url(&format!("https://example.com/p{i}")),
                    None,
                    0,
                    Lineage::General,
                )
                .await
                .unwrap();
        }
        registry.claim_next("w0").await.unwrap().unwrap();
        registry.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(registry.pending_count().await.unwrap(), 1);

        // Simulated crash: both FETCHING rows are orphans.
        let recovered = registry.recover_orphans().await.unwrap();
        assert_eq!(recovered, 2);
        assert_eq!(registry.pending_count().await.unwrap(), 3);
        assert_eq!(registry.page_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn release_keeps_depth_and_lineage() {
        let registry = registry().await;
        let u = url("https://example.com/faq/x");
        registry
            .upsert_frontier(&u, None, 3, Lineage::Faq)
            .await
            .unwrap();
        let entry = registry.claim_next("w0").await.unwrap().unwrap();
        registry.release(entry.url.as_str()).await.unwrap();

        let reclaimed = registry.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(reclaimed.depth, 3);
        assert_eq!(reclaimed.lineage, Lineage::Faq);
    }

    #[tokio::test]
    async fn complete_writes_metadata_and_clears_claim() {
        let registry = registry().await;
        let u = url("https://example.com/a");
        registry
            .upsert_frontier(&u, None, 0, Lineage::General)
            .await
            .unwrap();
        registry.claim_next("w0").await.unwrap().unwrap();

        registry
            .complete(
                u.as_str(),
                PageStatus::Ok,
                &CompletedPage {
                    http_status: Some(200),
                    content_type: Some("text/html".into()),
                    fetched_at: Some(Utc::now()),
                    content_hash: Some("abc123".into()),
                    raw_path: Some("artifacts/html/abc123.html".into()),
                    markdown_path: Some("artifacts/md/abc123.md".into()),
                    attempts: 4,
                    postprocess_error: None,
                },
            )
            .await
            .unwrap();

        let page = registry.get_page(u.as_str()).await.unwrap().unwrap();
        assert_eq!(page.status, PageStatus::Ok);
        assert_eq!(page.http_status, Some(200));
        assert_eq!(page.attempts, 4);
        assert_eq!(page.content_hash.as_deref(), Some("abc123"));

        // complete on a row no longer in FETCHING is a no-op.
        registry
            .complete(u.as_str(), PageStatus::Broken, &CompletedPage::default())
            .await
            .unwrap();
        let page = registry.get_page(u.as_str()).await.unwrap().unwrap();
        assert_eq!(page.status, PageStatus::Ok);
    }

    #[tokio::test]
    async fn skipped_depth_rows_are_durable_and_not_claimable() {
        let registry = registry().await;
        let u = url("https://example.com/too-deep");
        registry
            .mark_skipped_depth(&u, Some("https://example.com/"), 7, Lineage::Faq)
            .await
            .unwrap();
        assert!(registry.claim_next("w0").await.unwrap().is_none());

        let page = registry.get_page(u.as_str()).await.unwrap().unwrap();
        assert_eq!(page.status, PageStatus::SkippedDepth);
        assert_eq!(page.depth, 7);
    }

    #[tokio::test]
    async fn external_urls_roll_up_per_domain_once_per_url() {
        let registry = registry().await;
        let a = url("https://cdn.example.net/a.js");
        let b = url("https://cdn.example.net/b.js");

        registry
            .record_external(&a, "https://example.com/")
            .await
            .unwrap();
        registry
            .record_external(&a, "https://example.com/other")
            .await
            .unwrap();
        registry
            .record_external(&b, "https://example.com/")
            .await
            .unwrap();

        let counts = registry.external_domain_counts().await.unwrap();
        assert_eq!(counts, vec![("cdn.example.net".to_string(), 2)]);
    }

    #[tokio::test]
    async fn edges_and_faqs_deduplicate() {
        let registry = registry().await;
        let edges = vec![
            EdgeRecord {
                to_url: "https://example.com/b".into(),
                anchor_text: Some("B".into()),
                is_external: false,
            },
            EdgeRecord {
                to_url: "https://example.com/b".into(),
                anchor_text: Some("B again".into()),
                is_external: false,
            },
        ];
        registry
            .record_edges("https://example.com/a", 1, &edges)
            .await
            .unwrap();
        assert_eq!(registry.edge_count().await.unwrap(), 1);

        let items = vec![FaqItem {
            page_url: "https://example.com/faq".into(),
            question: "What is this?".into(),
            answer: "A crawler.".into(),
            answer_mode: "heading".into(),
        }];
        registry.record_faqs(&items).await.unwrap();
        registry.record_faqs(&items).await.unwrap();
        assert_eq!(registry.faq_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn robots_rows_round_trip() {
        let registry = registry().await;
        let now = Utc::now();
        registry
            .record_robots(&RobotsRow {
                host: "example.com".into(),
                body: Some("User-agent: *\nDisallow: /private/".into()),
                user_agent: "faqharvest/0.1".into(),
                fetched_at: now,
                unreachable: false,
            })
            .await
            .unwrap();

        let row = registry.load_robots("example.com").await.unwrap().unwrap();
        assert!(!row.unreachable);
        assert!(row.body.unwrap().contains("/private/"));
        assert!(registry.load_robots("other.org").await.unwrap().is_none());
    }
}
