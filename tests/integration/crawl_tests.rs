//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end against an on-disk database.

use listing_atlas::config::{
    BlockResolverKind, Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig,
};
use listing_atlas::crawler::{crawl, CrawlMode, CrawlSummary, WalkPlan};
use listing_atlas::storage::{EntityStore, SqliteStore};
use listing_atlas::{CrawlStatus, Level, ScopeFilter};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/browse/homes/";
const MD: &str = "/browse/homes/md/";
const HOWARD: &str = "/browse/homes/md/howard-county/";
const ZIP: &str = "/browse/homes/md/howard-county/20777/";
const STREET: &str = "/browse/homes/md/howard-county/20777/main-st/";
const LISTING_1: &str = "/homedetails/1-main-st-highland-md/1_zpid/";
const LISTING_2: &str = "/homedetails/2-main-st-highland-md/2_zpid/";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &Path) -> Config {
    let mut detail_fields = BTreeMap::new();
    detail_fields.insert("price".to_string(), "span.price".to_string());

    Config {
        crawler: CrawlerConfig {
            cooldown_secs: 0,
            block_resolver: BlockResolverKind::Wait,
            block_wait_secs: 0,
            ..Default::default()
        },
        site: SiteConfig {
            base_url: base_url.to_string(),
            root_path: ROOT.to_string(),
            list_selector: "ul.browse-list".to_string(),
            item_selector: "li a".to_string(),
            block_signatures: vec!["www.google.com/recaptcha/api.js".to_string()],
            detail_fields,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string_lossy().into_owned(),
        },
    }
}

/// Renders a browse page listing `items`
fn list_page(items: &[(&str, &str)]) -> String {
    let entries: String = items
        .iter()
        .map(|(href, name)| format!(r#"<li><a href="{}">{}</a></li>"#, href, name))
        .collect();
    format!(
        r#"<html><body><h1>Browse</h1><ul class="browse-list">{}</ul></body></html>"#,
        entries
    )
}

const BLOCK_PAGE: &str = r#"<html><head><script src="https://www.google.com/recaptcha/api.js"></script></head>
<body>Please verify you are a human</body></html>"#;

async fn mount_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts every page of a one-region site except those in `skip`
async fn mount_site(server: &MockServer, skip: &[&str]) {
    let pages = [
        (ROOT, list_page(&[(MD, "Maryland")])),
        (MD, list_page(&[(HOWARD, "Howard County")])),
        (HOWARD, list_page(&[(ZIP, "20777")])),
        (ZIP, list_page(&[(STREET, "Main St")])),
        (
            STREET,
            list_page(&[(LISTING_1, "1 Main St"), (LISTING_2, "2 Main St")]),
        ),
    ];
    for (page, body) in pages {
        if !skip.contains(&page) {
            mount_page(server, page, body).await;
        }
    }
}

fn walk_report(summary: CrawlSummary) -> listing_atlas::crawler::WalkReport {
    match summary {
        CrawlSummary::Walk(report) => report,
        other => panic!("expected a walk summary, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_walk_single_region() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, &[]).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("atlas.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    let report = walk_report(
        crawl(&config, CrawlMode::Walk(WalkPlan::default()))
            .await
            .expect("Crawl failed"),
    );

    assert_eq!(report.seeded.map(|s| s.inserted), Some(1));
    assert!(report.levels.iter().all(|(_, r)| r.finished == 1));

    let store = SqliteStore::new(&db_path).unwrap();
    for level in Level::parent_levels() {
        assert_eq!(store.count(level).unwrap(), 1, "{} count", level);
        let counts = store.count_by_status(level).unwrap();
        assert_eq!(counts.get(&CrawlStatus::Finished), Some(&1), "{} status", level);
    }
    assert_eq!(
        store.listing_shard_counts().unwrap(),
        vec![("md".to_string(), 2)]
    );

    let listing = store.get(Level::Listing, LISTING_1).unwrap().unwrap();
    assert_eq!(listing.key, "1_zpid");
    assert_eq!(listing.name, "1 Main St");
    assert_eq!(
        listing.parents.chain(),
        vec!["md", "howard-county", "20777", "main-st"]
    );
}

#[tokio::test]
async fn test_block_page_is_waited_out() {
    let mock_server = MockServer::start().await;

    // The first request for the region page hits a challenge
    Mock::given(method("GET"))
        .and(path(MD))
        .respond_with(ResponseTemplate::new(200).set_body_string(BLOCK_PAGE))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    mount_site(&mock_server, &[]).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("atlas.db");
    let config = create_test_config(&mock_server.uri(), &db_path);
    let plan = WalkPlan {
        through: Level::Region,
        ..Default::default()
    };

    let report = walk_report(crawl(&config, CrawlMode::Walk(plan)).await.unwrap());

    let (_, regions) = &report.levels[0];
    assert_eq!(regions.finished, 1);
    assert_eq!(regions.parse_failed, 0);

    let store = SqliteStore::new(&db_path).unwrap();
    let md = store.get(Level::Region, MD).unwrap().unwrap();
    assert_eq!(md.status, CrawlStatus::Finished);
    assert_eq!(md.child_count, Some(1));
}

#[tokio::test]
async fn test_missing_page_is_failed_then_resumed() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("atlas.db");

    // First run: the county page answers 404
    {
        let mock_server = MockServer::start().await;
        mount_site(&mock_server, &[HOWARD]).await;
        let config = create_test_config(&mock_server.uri(), &db_path);

        let report = walk_report(
            crawl(&config, CrawlMode::Walk(WalkPlan::default()))
                .await
                .unwrap(),
        );
        let (level, sub_regions) = &report.levels[1];
        assert_eq!(*level, Level::SubRegion);
        assert_eq!(sub_regions.transport_failed, 1);

        let store = SqliteStore::new(&db_path).unwrap();
        let howard = store.get(Level::SubRegion, HOWARD).unwrap().unwrap();
        assert_eq!(howard.status, CrawlStatus::FailedToCrawl);
        assert_eq!(howard.child_count, None);
        assert_eq!(store.count(Level::PostalArea).unwrap(), 0);
    }

    // Second run: finished pages must not be requested again
    let mock_server = MockServer::start().await;
    for (page, body) in [
        (HOWARD, list_page(&[(ZIP, "20777")])),
        (ZIP, list_page(&[(STREET, "Main St")])),
        (STREET, list_page(&[(LISTING_1, "1 Main St")])),
    ] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;
    }
    for page in [ROOT, MD] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
    }
    let config = create_test_config(&mock_server.uri(), &db_path);

    let report = walk_report(
        crawl(&config, CrawlMode::Walk(WalkPlan::default()))
            .await
            .unwrap(),
    );
    assert!(report.seeded.is_none());

    let store = SqliteStore::new(&db_path).unwrap();
    let howard = store.get(Level::SubRegion, HOWARD).unwrap().unwrap();
    assert_eq!(howard.status, CrawlStatus::Finished);
    assert_eq!(store.count(Level::Listing).unwrap(), 1);
    assert_eq!(store.count(Level::Region).unwrap(), 1);
}

#[tokio::test]
async fn test_unparseable_page_is_crawled_but_empty() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        MD,
        "<html><body><p>Temporarily unavailable</p></body></html>".to_string(),
    )
    .await;
    mount_site(&mock_server, &[MD]).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("atlas.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    let report = walk_report(
        crawl(&config, CrawlMode::Walk(WalkPlan::default()))
            .await
            .unwrap(),
    );
    let (_, regions) = &report.levels[0];
    assert_eq!(regions.parse_failed, 1);

    let store = SqliteStore::new(&db_path).unwrap();
    let md = store.get(Level::Region, MD).unwrap().unwrap();
    assert_eq!(md.status, CrawlStatus::CrawledButEmpty);
    assert_eq!(store.count(Level::SubRegion).unwrap(), 0);
}

#[tokio::test]
async fn test_detail_pass_stores_listing_attributes() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, &[]).await;
    mount_page(
        &mock_server,
        LISTING_1,
        r#"<html><body><span class="price">$525,000</span></body></html>"#.to_string(),
    )
    .await;
    mount_page(
        &mock_server,
        LISTING_2,
        "<html><body>Off market</body></html>".to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("atlas.db");
    let config = create_test_config(&mock_server.uri(), &db_path);

    crawl(&config, CrawlMode::Walk(WalkPlan::default()))
        .await
        .unwrap();
    let summary = crawl(&config, CrawlMode::Details(ScopeFilter::region("md")))
        .await
        .unwrap();

    match summary {
        CrawlSummary::Details(report) => {
            assert_eq!(report.selected, 2);
            assert_eq!(report.finished, 1);
            assert_eq!(report.empty, 1);
        }
        other => panic!("expected a detail summary, got {:?}", other),
    }

    let store = SqliteStore::new(&db_path).unwrap();
    let listing = store.get(Level::Listing, LISTING_1).unwrap().unwrap();
    assert_eq!(listing.detail_status, Some(CrawlStatus::Finished));
    assert_eq!(listing.detail.unwrap()["price"], "$525,000");

    let remaining = store
        .select_incomplete_details(&ScopeFilter::region("md"))
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, LISTING_2);
}
