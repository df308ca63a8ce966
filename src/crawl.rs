use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, error, info, warn};
use url::Url;

use faqharvest_core::normalize::normalize;
use faqharvest_core::scope::{ScopeDecision, ScopePolicy};
use faqharvest_core::{
    AppConfig, AssetRecord, ContentKind, EdgeRecord, FetchConfig, FrontierEntry, Lineage,
    PageRecord, PageStatus,
};
use faqharvest_fetch::{ArtifactStore, FetchOutcome, Fetcher, HostLimiter};
use faqharvest_parser::{extract_links, LinkClassifier};
use faqharvest_postprocess::default_processors;
use faqharvest_registry::{CompletedPage, Registry};
use faqharvest_robots::{RobotsCache, RobotsVerdict};
use faqharvest_sitemap::{HttpSource, SitemapExpander};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Done,
    Aborted,
}

/// Everything a worker needs, shared across the pool. The registry and the
/// robots cache are the only mutable state in here.
struct CrawlContext {
    registry: Registry,
    robots: RobotsCache,
    limiter: HostLimiter,
    fetcher: Fetcher,
    classifier: LinkClassifier,
    scope: ScopePolicy,
    max_depth_faq: u32,
    max_depth_general: u32,
}

impl CrawlContext {
    fn depth_budget(&self, lineage: Lineage) -> u32 {
        match lineage {
            Lineage::Faq => self.max_depth_faq,
            Lineage::General => self.max_depth_general,
        }
    }
}

pub async fn run_crawl(config: AppConfig) -> Result<EngineOutcome> {
    config.validate().context("config rejected")?;

    let registry = Registry::open(&config.storage.registry_path)
        .await
        .context("registry unavailable")?;
    registry.run_migrations().await?;
    let orphans = registry.recover_orphans().await?;
    if orphans > 0 {
        info!(orphans, "reset orphaned FETCHING rows to PENDING");
    }

    let scope = ScopePolicy::from_config(&config.scope);
    let client = reqwest::Client::builder()
        .user_agent(&config.http.user_agent)
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;

    let fetch_config = FetchConfig {
        max_retries: config.http.max_retries,
        backoff_base: Duration::from_millis(500),
        size_cap_html: config.http.size_cap_html,
        size_cap_pdf: config.http.size_cap_pdf,
        size_cap_media: config.http.size_cap_media,
    };
    let artifacts = ArtifactStore::new(config.storage.artifacts_dir.clone());
    let postprocessors = default_processors(artifacts.root());

    let context = Arc::new(CrawlContext {
        robots: RobotsCache::new(
            client.clone(),
            registry.clone(),
            config.http.user_agent.clone(),
            config.robots_ttl(),
        ),
        limiter: HostLimiter::new(config.http.per_host_rps, config.http.per_host_burst),
        fetcher: Fetcher::new(
            client.clone(),
            fetch_config,
            artifacts,
            scope.clone(),
            postprocessors,
        ),
        classifier: LinkClassifier::new(config.scope.faq_indicators.clone()),
        scope: scope.clone(),
        max_depth_faq: config.crawl.max_depth_faq,
        max_depth_general: config.crawl.max_depth_general,
        registry,
    });

    // --- Sitemap expansion seeds the frontier at depth 0 ---
    // Idempotent on resume: known URLs come back SKIPPED from the upsert.
    let seed = Url::parse(&config.crawl.seed_sitemap_url)?;
    info!(seed = %seed, "expanding sitemap");
    let expander = SitemapExpander::new(
        HttpSource::new(client.clone(), config.http.user_agent.clone()),
        scope,
        config.scope.faq_indicators.clone(),
    );
    let mut seeded = 0usize;
    for entry in expander.expand(&seed).await {
        let outcome = context
            .registry
            .upsert_frontier(&entry.url, None, 0, entry.lineage)
            .await?;
        if outcome != faqharvest_core::UpsertOutcome::Skipped {
            seeded += 1;
        }
    }
    let pending = context.registry.pending_count().await?;
    info!(seeded, pending, "frontier ready");

    // --- Worker pool ---
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let in_flight = Arc::new(AtomicUsize::new(0));

    let mut worker_handles = Vec::new();
    for worker_id in 0..config.crawl.worker_count {
        let context = Arc::clone(&context);
        let in_flight = Arc::clone(&in_flight);
        let shutdown = shutdown_tx.subscribe();
        worker_handles.push(tokio::spawn(worker_loop(
            worker_id, context, in_flight, shutdown,
        )));
    }
    info!(workers = worker_handles.len(), "crawl started, press Ctrl+C to stop");

    let drain = async move {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    tokio::pin!(drain);

    let outcome = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("interrupt received, workers will finish in-flight pages");
            let _ = shutdown_tx.send(());
            drain.as_mut().await;
            EngineOutcome::Aborted
        }
        _ = drain.as_mut() => EngineOutcome::Done,
    };

    let remaining = context.registry.pending_count().await?;
    match outcome {
        EngineOutcome::Done => info!("crawl complete, frontier drained"),
        EngineOutcome::Aborted => info!(pending = remaining, "crawl aborted, resume with the same config"),
    }
    Ok(outcome)
}

async fn worker_loop(
    worker_id: usize,
    context: Arc<CrawlContext>,
    in_flight: Arc<AtomicUsize>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let worker = format!("w{worker_id}");
    debug!(worker, "worker started");
    loop {
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => {
                debug!(worker, "worker shutting down");
                break;
            }
        }

        // Count ourselves before claiming so idle workers never observe a
        // moment where a claimed row is invisible to the drain check.
        in_flight.fetch_add(1, Ordering::SeqCst);
        let claimed = context.registry.claim_next(&worker).await;
        match claimed {
            Err(e) => {
                in_flight.fetch_sub(1, Ordering::SeqCst);
                error!(worker, error = %e, "claim failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok(None) => {
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if in_flight.load(Ordering::SeqCst) == 0 {
                    match context.registry.pending_count().await {
                        Ok(0) => {
                            debug!(worker, "frontier drained");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => error!(worker, error = %e, "pending count failed"),
                    }
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(Some(entry)) => {
                let url = entry.url.to_string();
                if let Err(e) = process_entry(&worker, &context, entry).await {
                    error!(worker, url, error = %e, "processing failed");
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

/// One frontier entry, claim to completion. Every error path maps to a
/// deterministic terminal status; nothing escapes to the worker loop except
/// registry failures.
async fn process_entry(worker: &str, context: &CrawlContext, entry: FrontierEntry) -> Result<()> {
    let url_str = entry.url.to_string();
    let host = entry.url.host_str().unwrap_or_default().to_string();

    // Robots gate. Cache failures fail open, matching unreachable hosts.
    let verdict = match context.robots.check(&entry.url).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(url = %url_str, error = %e, "robots check failed, failing open");
            RobotsVerdict {
                allowed: true,
                crawl_delay: None,
            }
        }
    };
    if !verdict.allowed {
        info!(url = %url_str, from_status = "fetching", to_status = "blocked_robots",
              reason = "robots disallow", attempt = 0, "page transition");
        context
            .registry
            .complete(&url_str, PageStatus::BlockedRobots, &CompletedPage::default())
            .await?;
        return Ok(());
    }

    // Politeness gate: no token means yield the claim and move on, so one
    // slow host cannot starve the pool.
    if !context.limiter.try_acquire(&host, verdict.crawl_delay) {
        debug!(worker, url = %url_str, "no host token, yielding claim");
        context.registry.release(&url_str).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        return Ok(());
    }

    match context.fetcher.fetch(&entry.url).await {
        FetchOutcome::Html(html) => {
            let page = PageRecord {
                url: url_str.clone(),
                host,
                depth: entry.depth,
                lineage: entry.lineage,
                status: PageStatus::Ok,
                http_status: Some(html.status),
                content_type: html.content_type.clone(),
                fetched_at: Some(html.fetched_at),
                content_hash: Some(html.content_hash.clone()),
                raw_path: Some(html.raw_path.display().to_string()),
                markdown_path: None,
                parent_url: entry.parent.clone(),
                attempts: html.attempts,
                postprocess_error: None,
            };
            let post = context.fetcher.run_postprocessors(
                ContentKind::Html,
                html.content_type.as_deref(),
                &html.raw_path,
                &page,
            );

            context
                .registry
                .complete(
                    &url_str,
                    PageStatus::Ok,
                    &CompletedPage {
                        http_status: Some(html.status),
                        content_type: html.content_type.clone(),
                        fetched_at: Some(html.fetched_at),
                        content_hash: Some(html.content_hash.clone()),
                        raw_path: Some(html.raw_path.display().to_string()),
                        markdown_path: post.markdown_path.clone(),
                        attempts: html.attempts,
                        postprocess_error: post.error.clone(),
                    },
                )
                .await?;
            info!(url = %url_str, from_status = "fetching", to_status = "ok",
                  reason = "fetched", attempt = html.attempts, "page transition");

            if !post.faqs.is_empty() {
                info!(url = %url_str, count = post.faqs.len(), "faq items recorded");
                context.registry.record_faqs(&post.faqs).await?;
            }

            feed_frontier(context, &entry, &url_str, &html.final_url, &html.body).await?;
        }
        FetchOutcome::Asset(asset) => {
            let page = PageRecord {
                url: url_str.clone(),
                host,
                depth: entry.depth,
                lineage: entry.lineage,
                status: PageStatus::Ok,
                http_status: Some(asset.status),
                content_type: asset.content_type.clone(),
                fetched_at: Some(asset.fetched_at),
                content_hash: Some(asset.content_hash.clone()),
                raw_path: Some(asset.local_path.display().to_string()),
                markdown_path: None,
                parent_url: entry.parent.clone(),
                attempts: asset.attempts,
                postprocess_error: None,
            };
            let post = context.fetcher.run_postprocessors(
                asset.kind,
                asset.content_type.as_deref(),
                &asset.local_path,
                &page,
            );

            context
                .registry
                .complete(
                    &url_str,
                    PageStatus::Ok,
                    &CompletedPage {
                        http_status: Some(asset.status),
                        content_type: asset.content_type.clone(),
                        fetched_at: Some(asset.fetched_at),
                        content_hash: Some(asset.content_hash.clone()),
                        raw_path: Some(asset.local_path.display().to_string()),
                        markdown_path: None,
                        attempts: asset.attempts,
                        postprocess_error: post.error.clone(),
                    },
                )
                .await?;
            info!(url = %url_str, from_status = "fetching", to_status = "ok",
                  reason = "asset stored", attempt = asset.attempts, "page transition");

            if let Some(kind) = asset.kind.asset_kind() {
                context
                    .registry
                    .record_asset(&AssetRecord {
                        url: url_str.clone(),
                        kind,
                        local_path: asset.local_path.display().to_string(),
                        content_hash: asset.content_hash.clone(),
                        size_bytes: asset.size_bytes,
                        owning_page: entry.parent.clone().unwrap_or_else(|| url_str.clone()),
                        extracted_text_path: post
                            .extracted_text_path
                            .clone()
                            .or(post.transcript_path.clone()),
                    })
                    .await?;
            }
        }
        FetchOutcome::RedirectedOut {
            final_url,
            status,
            attempts,
        } => {
            context.registry.record_external(&final_url, &url_str).await?;
            context
                .registry
                .complete(
                    &url_str,
                    PageStatus::ExcludedPolicy,
                    &CompletedPage {
                        http_status: Some(status),
                        attempts,
                        ..Default::default()
                    },
                )
                .await?;
            info!(url = %url_str, from_status = "fetching", to_status = "excluded_policy",
                  reason = "redirected out of scope", attempt = attempts, "page transition");
        }
        FetchOutcome::Broken { status, attempts } => {
            context
                .registry
                .complete(
                    &url_str,
                    PageStatus::Broken,
                    &CompletedPage {
                        http_status: Some(status),
                        attempts,
                        ..Default::default()
                    },
                )
                .await?;
            info!(url = %url_str, from_status = "fetching", to_status = "broken",
                  reason = %format!("HTTP {status}"), attempt = attempts, "page transition");
        }
        FetchOutcome::Failed { error, attempts } => {
            context
                .registry
                .complete(
                    &url_str,
                    PageStatus::FetchError,
                    &CompletedPage {
                        attempts,
                        ..Default::default()
                    },
                )
                .await?;
            info!(url = %url_str, from_status = "fetching", to_status = "fetch_error",
                  reason = %error, attempt = attempts, "page transition");
        }
    }

    Ok(())
}

/// Extract outbound links, classify them, and feed the frontier behind the
/// depth gate. Runs after `complete`, so every recorded edge originates
/// from a terminal page.
async fn feed_frontier(
    context: &CrawlContext,
    entry: &FrontierEntry,
    page_url: &str,
    final_url: &Url,
    body: &str,
) -> Result<()> {
    let mut edges: Vec<EdgeRecord> = Vec::new();

    for link in extract_links(body, final_url) {
        let normalized = match normalize(
            link.url.as_str(),
            Some(final_url),
            context.scope.normalize_policy(),
        ) {
            Ok(url) => url,
            Err(_) => continue,
        };
        // Self-links after normalization carry no information.
        if normalized.as_str() == page_url {
            continue;
        }

        match context.scope.classify(&normalized) {
            ScopeDecision::External => {
                context.registry.record_external(&normalized, page_url).await?;
                edges.push(EdgeRecord {
                    to_url: normalized.to_string(),
                    anchor_text: link.anchor_text,
                    is_external: true,
                });
            }
            ScopeDecision::Excluded(reason) => {
                debug!(url = %normalized, reason, "link excluded by policy");
            }
            ScopeDecision::InScope => {
                let lineage = context.classifier.lineage_for(
                    entry.lineage,
                    &normalized,
                    link.anchor_text.as_deref(),
                );
                let depth = entry.depth + 1;
                edges.push(EdgeRecord {
                    to_url: normalized.to_string(),
                    anchor_text: link.anchor_text,
                    is_external: false,
                });

                if depth > context.depth_budget(lineage) {
                    context
                        .registry
                        .mark_skipped_depth(&normalized, Some(page_url), depth, lineage)
                        .await?;
                    debug!(url = %normalized, depth, lineage = lineage.as_str(),
                           "depth budget exceeded");
                } else {
                    context
                        .registry
                        .upsert_frontier(&normalized, Some(page_url), depth, lineage)
                        .await?;
                }
            }
        }
    }

    context.registry.record_edges(page_url, entry.depth, &edges).await?;
    Ok(())
}
