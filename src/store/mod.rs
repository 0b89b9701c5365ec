//! Durable crawl persistence over sqlite.
//!
//! Four tables keyed by crawl id: the crawl header (config snapshot,
//! aggregate stats and the resume checkpoint blob), URL rows, link rows and
//! issue rows. Nested record fields are stored as JSON text columns.
//!
//! Writes for a crawl serialize through this store's single connection;
//! resume opens its own store and reads independently.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

use crate::config::CrawlConfig;
use crate::crawl_engine::crawl_types::{CrawlError, CrawlStats, CrawlStatus, MemoryStats, QueueEntry};
use crate::page_extractor::schema::{
    IssueRecord, IssueSeverity, LinkPlacement, LinkRecord, PageRecord,
};

/// Queue snapshot sufficient to resume without losing work beyond the last
/// flush window. Pending entries keep their depth.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct QueueCheckpoint {
    pub discovered_urls: Vec<QueueEntry>,
    pub visited_urls: Vec<String>,
}

/// One row of the crawls table.
#[derive(Debug, Clone)]
pub struct CrawlHeader {
    pub id: i64,
    pub user_id: Option<i64>,
    pub session_id: String,
    pub base_url: String,
    pub base_domain: String,
    pub status: String,
    pub config_snapshot: Option<CrawlConfig>,
    pub urls_discovered: i64,
    pub urls_crawled: i64,
    pub max_depth_reached: i64,
    pub resume_checkpoint: Option<QueueCheckpoint>,
}

/// Sqlite-backed store for one database file.
pub struct CrawlStore {
    pool: SqlitePool,
}

impl CrawlStore {
    /// Open (creating if missing) the database and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, CrawlError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), CrawlError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS crawls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                session_id TEXT NOT NULL,
                base_url TEXT NOT NULL,
                base_domain TEXT,
                status TEXT DEFAULT 'running',
                config_snapshot TEXT,
                urls_discovered INTEGER DEFAULT 0,
                urls_crawled INTEGER DEFAULT 0,
                max_depth_reached INTEGER DEFAULT 0,
                started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                completed_at TIMESTAMP,
                last_saved_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                peak_memory_mb REAL,
                estimated_size_mb REAL,
                resume_checkpoint TEXT
            )",
            "CREATE TABLE IF NOT EXISTS crawled_urls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                status_code INTEGER,
                content_type TEXT,
                size INTEGER,
                is_internal BOOLEAN,
                depth INTEGER,
                title TEXT,
                meta_description TEXT,
                h1 TEXT,
                h2 TEXT,
                h3 TEXT,
                word_count INTEGER,
                canonical_url TEXT,
                lang TEXT,
                charset TEXT,
                viewport TEXT,
                robots TEXT,
                author TEXT,
                keywords TEXT,
                generator TEXT,
                theme_color TEXT,
                meta_tags TEXT,
                og_tags TEXT,
                twitter_tags TEXT,
                json_ld TEXT,
                analytics TEXT,
                images TEXT,
                hreflang TEXT,
                schema_org TEXT,
                redirects TEXT,
                linked_from TEXT,
                external_links INTEGER,
                internal_links INTEGER,
                response_time INTEGER,
                javascript_rendered BOOLEAN DEFAULT 0,
                fetch_error TEXT,
                crawled_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE TABLE IF NOT EXISTS crawl_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL,
                source_url TEXT NOT NULL,
                target_url TEXT NOT NULL,
                anchor_text TEXT,
                is_internal BOOLEAN,
                target_domain TEXT,
                target_status INTEGER,
                placement TEXT,
                discovered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE TABLE IF NOT EXISTS crawl_issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crawl_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                type TEXT,
                category TEXT,
                issue TEXT,
                details TEXT,
                detected_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE INDEX IF NOT EXISTS idx_crawls_session ON crawls(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_crawled_urls_crawl ON crawled_urls(crawl_id)",
            "CREATE INDEX IF NOT EXISTS idx_crawled_urls_url ON crawled_urls(crawl_id, url)",
            "CREATE INDEX IF NOT EXISTS idx_crawl_links_crawl ON crawl_links(crawl_id)",
            "CREATE INDEX IF NOT EXISTS idx_crawl_links_target ON crawl_links(crawl_id, target_url)",
            "CREATE INDEX IF NOT EXISTS idx_crawl_issues_crawl ON crawl_issues(crawl_id)",
            "CREATE INDEX IF NOT EXISTS idx_crawl_issues_url ON crawl_issues(crawl_id, url)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    /// Insert a new crawl header, returning its id.
    pub async fn create_crawl(
        &self,
        user_id: Option<i64>,
        session_id: &str,
        base_url: &str,
        base_domain: &str,
        config: &CrawlConfig,
    ) -> Result<i64, CrawlError> {
        let snapshot = serde_json::to_string(config).map_err(json_err)?;
        let result = sqlx::query(
            "INSERT INTO crawls (user_id, session_id, base_url, base_domain, config_snapshot, status)
             VALUES (?, ?, ?, ?, ?, 'running')",
        )
        .bind(user_id)
        .bind(session_id)
        .bind(base_url)
        .bind(base_domain)
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn save_url_batch(
        &self,
        crawl_id: i64,
        records: &[PageRecord],
    ) -> Result<(), CrawlError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for record in records {
            sqlx::query(
                "INSERT INTO crawled_urls (
                    crawl_id, url, status_code, content_type, size, is_internal, depth,
                    title, meta_description, h1, h2, h3, word_count,
                    canonical_url, lang, charset, viewport, robots,
                    author, keywords, generator, theme_color,
                    meta_tags, og_tags, twitter_tags, json_ld, analytics, images,
                    hreflang, schema_org, redirects, linked_from,
                    external_links, internal_links, response_time, javascript_rendered, fetch_error
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(crawl_id)
            .bind(&record.url)
            .bind(i64::from(record.status_code))
            .bind(&record.content_type)
            .bind(record.size as i64)
            .bind(record.is_internal)
            .bind(i64::from(record.depth))
            .bind(&record.title)
            .bind(&record.meta_description)
            .bind(&record.h1)
            .bind(serde_json::to_string(&record.h2).map_err(json_err)?)
            .bind(serde_json::to_string(&record.h3).map_err(json_err)?)
            .bind(record.word_count as i64)
            .bind(&record.canonical_url)
            .bind(&record.lang)
            .bind(&record.charset)
            .bind(&record.viewport)
            .bind(&record.robots)
            .bind(&record.author)
            .bind(&record.keywords)
            .bind(&record.generator)
            .bind(&record.theme_color)
            .bind(serde_json::to_string(&record.meta_tags).map_err(json_err)?)
            .bind(serde_json::to_string(&record.og_tags).map_err(json_err)?)
            .bind(serde_json::to_string(&record.twitter_tags).map_err(json_err)?)
            .bind(serde_json::to_string(&record.json_ld).map_err(json_err)?)
            .bind(serde_json::to_string(&record.analytics).map_err(json_err)?)
            .bind(serde_json::to_string(&record.images).map_err(json_err)?)
            .bind(serde_json::to_string(&record.hreflang).map_err(json_err)?)
            .bind(serde_json::to_string(&record.schema_org).map_err(json_err)?)
            .bind(serde_json::to_string(&record.redirects).map_err(json_err)?)
            .bind(serde_json::to_string(&record.linked_from).map_err(json_err)?)
            .bind(record.external_links as i64)
            .bind(record.internal_links as i64)
            .bind(record.response_time_ms as i64)
            .bind(record.javascript_rendered)
            .bind(&record.fetch_error)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;

        log::debug!("saved {} URL rows for crawl {crawl_id}", records.len());
        Ok(())
    }

    pub async fn save_links_batch(
        &self,
        crawl_id: i64,
        links: &[LinkRecord],
    ) -> Result<(), CrawlError> {
        if links.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for link in links {
            sqlx::query(
                "INSERT INTO crawl_links (
                    crawl_id, source_url, target_url, anchor_text,
                    is_internal, target_domain, target_status, placement
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(crawl_id)
            .bind(&link.source_url)
            .bind(&link.target_url)
            .bind(&link.anchor_text)
            .bind(link.is_internal)
            .bind(&link.target_domain)
            .bind(link.target_status.map(i64::from))
            .bind(link.placement.as_str())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    pub async fn save_issues_batch(
        &self,
        crawl_id: i64,
        issues: &[IssueRecord],
    ) -> Result<(), CrawlError> {
        if issues.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for issue in issues {
            sqlx::query(
                "INSERT INTO crawl_issues (crawl_id, url, type, category, issue, details)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(crawl_id)
            .bind(&issue.url)
            .bind(issue.severity.as_str())
            .bind(&issue.category)
            .bind(&issue.issue)
            .bind(&issue.details)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    pub async fn update_stats(
        &self,
        crawl_id: i64,
        stats: &CrawlStats,
        memory: MemoryStats,
    ) -> Result<(), CrawlError> {
        sqlx::query(
            "UPDATE crawls SET urls_discovered = ?, urls_crawled = ?, max_depth_reached = ?,
             peak_memory_mb = ?, estimated_size_mb = ?, last_saved_at = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(stats.discovered as i64)
        .bind(stats.crawled as i64)
        .bind(i64::from(stats.max_depth_reached))
        .bind(memory.peak_mb)
        .bind(memory.estimated_crawl_mb)
        .bind(crawl_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn save_checkpoint(
        &self,
        crawl_id: i64,
        checkpoint: &QueueCheckpoint,
    ) -> Result<(), CrawlError> {
        let blob = serde_json::to_string(checkpoint).map_err(json_err)?;
        sqlx::query(
            "UPDATE crawls SET resume_checkpoint = ?, last_saved_at = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(blob)
        .bind(crawl_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn set_status(&self, crawl_id: i64, status: CrawlStatus) -> Result<(), CrawlError> {
        let query = if status.is_terminal() {
            "UPDATE crawls SET status = ?, completed_at = CURRENT_TIMESTAMP WHERE id = ?"
        } else {
            "UPDATE crawls SET status = ? WHERE id = ?"
        };
        sqlx::query(query)
            .bind(status.as_str())
            .bind(crawl_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Load a crawl header, or `None` if the id is unknown.
    pub async fn crawl_header(&self, crawl_id: i64) -> Result<Option<CrawlHeader>, CrawlError> {
        let row = sqlx::query("SELECT * FROM crawls WHERE id = ?")
            .bind(crawl_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(|row| header_from_row(&row)).transpose()
    }

    /// Crawls still marked running at process start, candidates for resume
    /// after a crash.
    pub async fn crashed_crawls(&self) -> Result<Vec<CrawlHeader>, CrawlError> {
        let rows = sqlx::query(
            "SELECT * FROM crawls WHERE status = 'running' ORDER BY started_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(header_from_row).collect()
    }

    pub async fn load_urls(&self, crawl_id: i64) -> Result<Vec<PageRecord>, CrawlError> {
        let rows = sqlx::query(
            "SELECT * FROM crawled_urls WHERE crawl_id = ? ORDER BY crawled_at, id",
        )
        .bind(crawl_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn load_links(&self, crawl_id: i64) -> Result<Vec<LinkRecord>, CrawlError> {
        let rows = sqlx::query("SELECT * FROM crawl_links WHERE crawl_id = ? ORDER BY id")
            .bind(crawl_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(rows
            .iter()
            .map(|row| LinkRecord {
                source_url: row.get("source_url"),
                target_url: row.get("target_url"),
                anchor_text: row.get::<Option<String>, _>("anchor_text").unwrap_or_default(),
                is_internal: row.get("is_internal"),
                target_domain: row.get::<Option<String>, _>("target_domain").unwrap_or_default(),
                target_status: row
                    .get::<Option<i64>, _>("target_status")
                    .map(|s| s as u16),
                placement: placement_from_str(
                    &row.get::<Option<String>, _>("placement").unwrap_or_default(),
                ),
            })
            .collect())
    }

    pub async fn load_issues(&self, crawl_id: i64) -> Result<Vec<IssueRecord>, CrawlError> {
        let rows = sqlx::query("SELECT * FROM crawl_issues WHERE crawl_id = ? ORDER BY id")
            .bind(crawl_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(rows
            .iter()
            .map(|row| IssueRecord {
                url: row.get("url"),
                severity: severity_from_str(
                    &row.get::<Option<String>, _>("type").unwrap_or_default(),
                ),
                category: row.get::<Option<String>, _>("category").unwrap_or_default(),
                issue: row.get::<Option<String>, _>("issue").unwrap_or_default(),
                details: row.get::<Option<String>, _>("details").unwrap_or_default(),
            })
            .collect())
    }
}

fn header_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CrawlHeader, CrawlError> {
    let config_snapshot = row
        .get::<Option<String>, _>("config_snapshot")
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let resume_checkpoint = row
        .get::<Option<String>, _>("resume_checkpoint")
        .and_then(|raw| serde_json::from_str(&raw).ok());

    Ok(CrawlHeader {
        id: row.get("id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        base_url: row.get("base_url"),
        base_domain: row.get::<Option<String>, _>("base_domain").unwrap_or_default(),
        status: row.get::<Option<String>, _>("status").unwrap_or_default(),
        config_snapshot,
        urls_discovered: row.get::<Option<i64>, _>("urls_discovered").unwrap_or(0),
        urls_crawled: row.get::<Option<i64>, _>("urls_crawled").unwrap_or(0),
        max_depth_reached: row.get::<Option<i64>, _>("max_depth_reached").unwrap_or(0),
        resume_checkpoint,
    })
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> PageRecord {
    fn json_field<T: serde::de::DeserializeOwned + Default>(
        row: &sqlx::sqlite::SqliteRow,
        column: &str,
    ) -> T {
        row.get::<Option<String>, _>(column)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn text(row: &sqlx::sqlite::SqliteRow, column: &str) -> String {
        row.get::<Option<String>, _>(column).unwrap_or_default()
    }

    PageRecord {
        url: row.get("url"),
        status_code: row.get::<Option<i64>, _>("status_code").unwrap_or(0) as u16,
        content_type: text(row, "content_type"),
        size: row.get::<Option<i64>, _>("size").unwrap_or(0) as u64,
        is_internal: row.get::<Option<bool>, _>("is_internal").unwrap_or(false),
        depth: row.get::<Option<i64>, _>("depth").unwrap_or(0) as u8,
        title: text(row, "title"),
        meta_description: text(row, "meta_description"),
        h1: text(row, "h1"),
        h2: json_field(row, "h2"),
        h3: json_field(row, "h3"),
        word_count: row.get::<Option<i64>, _>("word_count").unwrap_or(0) as usize,
        meta_tags: json_field(row, "meta_tags"),
        og_tags: json_field(row, "og_tags"),
        twitter_tags: json_field(row, "twitter_tags"),
        canonical_url: text(row, "canonical_url"),
        lang: text(row, "lang"),
        charset: text(row, "charset"),
        viewport: text(row, "viewport"),
        robots: text(row, "robots"),
        author: text(row, "author"),
        keywords: text(row, "keywords"),
        generator: text(row, "generator"),
        theme_color: text(row, "theme_color"),
        json_ld: json_field(row, "json_ld"),
        analytics: json_field(row, "analytics"),
        images: json_field(row, "images"),
        external_links: row.get::<Option<i64>, _>("external_links").unwrap_or(0) as usize,
        internal_links: row.get::<Option<i64>, _>("internal_links").unwrap_or(0) as usize,
        response_time_ms: row.get::<Option<i64>, _>("response_time").unwrap_or(0) as u64,
        redirects: json_field(row, "redirects"),
        hreflang: json_field(row, "hreflang"),
        schema_org: json_field(row, "schema_org"),
        linked_from: json_field(row, "linked_from"),
        javascript_rendered: row
            .get::<Option<bool>, _>("javascript_rendered")
            .unwrap_or(false),
        fetch_error: row.get("fetch_error"),
    }
}

fn placement_from_str(s: &str) -> LinkPlacement {
    match s {
        "head" => LinkPlacement::Head,
        "nav" => LinkPlacement::Nav,
        "footer" => LinkPlacement::Footer,
        _ => LinkPlacement::Body,
    }
}

fn severity_from_str(s: &str) -> IssueSeverity {
    match s {
        "error" => IssueSeverity::Error,
        "info" => IssueSeverity::Info,
        _ => IssueSeverity::Warning,
    }
}

fn store_err(e: sqlx::Error) -> CrawlError {
    CrawlError::Store(e.to_string())
}

fn json_err(e: serde_json::Error) -> CrawlError {
    CrawlError::Store(format!("serialization: {e}"))
}
