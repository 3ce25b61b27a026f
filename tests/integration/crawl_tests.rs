//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up a listing site and separate
//! "external" hosts, then drive topics and whole cycles end-to-end.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use topic_ripple::config::Config;
use topic_ripple::crawler::{
    CrawlScheduler, FetchSettings, Fetcher, HostThrottle, ListingParser, PageParser, Topic,
    TopicOutcome, TopicProcessor,
};
use topic_ripple::storage::{page_file_name, FileSink};
use topic_ripple::{host_key, ParseError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Settings that keep timeout tests fast
fn fast_settings() -> FetchSettings {
    FetchSettings {
        timeout: Duration::from_millis(300),
        reconnect_max_attempts: 2,
        reconnect_delay: Duration::from_millis(10),
    }
}

fn fetcher(capacity: usize, settings: FetchSettings) -> Arc<Fetcher> {
    let throttle = Arc::new(HostThrottle::new(capacity));
    Arc::new(Fetcher::with_client(
        reqwest::Client::new(),
        settings,
        throttle,
    ))
}

fn host_of(server: &MockServer) -> String {
    let url = url::Url::parse(&server.uri()).expect("Failed to parse mock server URI");
    host_key(&url).expect("Failed to extract host")
}

/// Creates a configuration pointing at the mock listing site
fn create_test_config(site: &MockServer, topics_dir: &Path) -> Config {
    let mut config = Config::default();
    config.site.base_url = format!("{}/", site.uri());
    config.site.comments_url_prefix = format!("{}/item?id=", site.uri());
    config.output.topics_dir = topics_dir.to_path_buf();
    config.crawler.max_connections = 2;
    config
}

fn scheduler(config: &Config, fetcher: Arc<Fetcher>) -> CrawlScheduler {
    let parser = Arc::new(ListingParser::new(&config.site.base_url).unwrap());
    CrawlScheduler::with_parts(config, fetcher, parser, Arc::new(FileSink::new()))
}

fn processor(config: &Config, fetcher: Arc<Fetcher>) -> TopicProcessor {
    let parser = Arc::new(ListingParser::new(&config.site.base_url).unwrap());
    TopicProcessor::new(
        fetcher,
        parser,
        Arc::new(FileSink::new()),
        config.output.topics_dir.clone(),
        config.site.comments_url_prefix.clone(),
    )
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    // `set_body_string` would force `text/plain`
    ResponseTemplate::new(200).set_body_raw(body.into().into_bytes(), "text/html; charset=utf-8")
}

fn listing_row(id: &str, link: &str) -> String {
    format!(
        r#"<tr class="athing" id="{}"><td><span class="titleline"><a href="{}">Story {}</a></span></td></tr>"#,
        id, link, id
    )
}

fn listing(rows: &[String]) -> String {
    format!("<html><body><table>{}</table></body></html>", rows.concat())
}

fn discussion(links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">link</a>"#, l))
        .collect();
    format!(
        r#"<html><body><a href="user?id=someone">someone</a>{}</body></html>"#,
        anchors
    )
}

async fn mount_discussion(site: &MockServer, id: &str, links: &[String]) {
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("id", id))
        .respond_with(html(discussion(links)))
        .mount(site)
        .await;
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read topic dir")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

#[tokio::test]
async fn test_cycle_with_two_topics_on_different_hosts() {
    let site = MockServer::start().await;
    let host_a = MockServer::start().await;
    let host_b = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story_a = format!("{}/story", host_a.uri());
    let story_b = format!("{}/story", host_b.uri());
    let ext_a = format!("{}/ext", host_a.uri());
    let ext_b = format!("{}/ext", host_b.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[
            listing_row("1001", &story_a),
            listing_row("1002", &story_b),
        ])))
        .mount(&site)
        .await;
    mount_discussion(&site, "1001", &[ext_a.clone(), ext_a.clone()]).await;
    mount_discussion(&site, "1002", &[ext_b.clone()]).await;

    for server in [&host_a, &host_b] {
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(html("<html>story</html>"))
            .expect(1)
            .mount(server)
            .await;
        // Linked twice from topic A's discussion, fetched once
        Mock::given(method("GET"))
            .and(path("/ext"))
            .respond_with(html("<html>external</html>"))
            .expect(1)
            .mount(server)
            .await;
    }

    let config = create_test_config(&site, topics_dir.path());
    let fetcher = fetcher(2, fast_settings());
    let throttle = Arc::clone(fetcher.throttle());
    let scheduler = scheduler(&config, fetcher);

    let report = scheduler.run_once().await.expect("Cycle failed");

    assert_eq!(report.topics_found, 2);
    assert_eq!(report.crawled, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.pages_saved, 4);

    let dir_a = topics_dir.path().join("1001");
    let dir_b = topics_dir.path().join("1002");
    let mut expected_a = vec![page_file_name(&story_a), page_file_name(&ext_a)];
    expected_a.sort();
    let mut expected_b = vec![page_file_name(&story_b), page_file_name(&ext_b)];
    expected_b.sort();
    assert_eq!(files_in(&dir_a), expected_a);
    assert_eq!(files_in(&dir_b), expected_b);

    // One gate per topic host, plus the listing site's own
    assert!(throttle.available_permits(&host_of(&host_a)).is_some());
    assert!(throttle.available_permits(&host_of(&host_b)).is_some());
    assert_eq!(throttle.len(), 3);
    assert_eq!(throttle.active(), 0);
}

#[tokio::test]
async fn test_second_cycle_skips_crawled_topic() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story = format!("{}/story", external.uri());
    let ext = format!("{}/ext", external.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[listing_row("2001", &story)])))
        .expect(2)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("id", "2001"))
        .respond_with(html(discussion(&[ext.clone()])))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(html("<html>story</html>"))
        .expect(1)
        .mount(&external)
        .await;
    Mock::given(method("GET"))
        .and(path("/ext"))
        .respond_with(html("<html>ext</html>"))
        .expect(1)
        .mount(&external)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let scheduler = scheduler(&config, fetcher(2, fast_settings()));

    let first = scheduler.run_once().await.expect("First cycle failed");
    assert_eq!(first.crawled, 1);
    assert_eq!(files_in(&topics_dir.path().join("2001")).len(), 2);

    let external_requests = request_count(&external).await;

    let second = scheduler.run_once().await.expect("Second cycle failed");
    assert_eq!(second.topics_found, 1);
    assert_eq!(second.already_crawled, 1);
    assert_eq!(second.crawled, 0);
    assert_eq!(second.pages_saved, 0);
    assert_eq!(request_count(&external).await, external_requests);
}

#[tokio::test]
async fn test_discussion_timeout_keeps_primary_only() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story = format!("{}/story", external.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[listing_row("3001", &story)])))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(html(discussion(&[])).set_delay(Duration::from_secs(2)))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(html("<html>story</html>"))
        .mount(&external)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let scheduler = scheduler(&config, fetcher(2, fast_settings()));

    let report = scheduler.run_once().await.expect("Cycle failed");
    assert_eq!(report.crawled, 1);
    assert_eq!(report.pages_saved, 1);

    let dir = topics_dir.path().join("3001");
    assert_eq!(files_in(&dir), vec![page_file_name(&story)]);

    // Seed fetch plus 1 + reconnect_max_attempts discussion attempts
    assert_eq!(request_count(&site).await, 1 + 3);
}

#[tokio::test]
async fn test_timeout_retried_exactly_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html>late</html>").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let settings = FetchSettings {
        reconnect_max_attempts: 3,
        ..fast_settings()
    };
    let fetcher = fetcher(1, settings);

    let result = fetcher
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .expect("Timeouts must not be errors");

    assert!(result.is_none());
    assert_eq!(request_count(&server).await, 1 + 3);
    // Permit returned after retries are exhausted
    assert_eq!(
        fetcher.throttle().available_permits(&host_of(&server)),
        Some(1)
    );
}

#[tokio::test]
async fn test_json_response_is_not_saved() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story = format!("{}/story", external.uri());
    let api = format!("{}/api", external.uri());
    let missing = format!("{}/missing.json", external.uri());

    mount_discussion(&site, "4001", &[api.clone(), missing.clone()]).await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(html("<html>story</html>"))
        .mount(&external)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"),
        )
        .mount(&external)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.json"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw(r#"{"error":"not found"}"#, "application/json"),
        )
        .mount(&external)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let processor = processor(&config, fetcher(2, fast_settings()));

    let topic = Topic::new(story.clone(), "4001").unwrap();
    let outcome = processor.process(&topic).await.expect("Topic failed");

    assert_eq!(outcome, TopicOutcome::Crawled { pages_saved: 1 });
    assert_eq!(
        files_in(&topics_dir.path().join("4001")),
        vec![page_file_name(&story)]
    );
}

#[tokio::test]
async fn test_missing_content_type_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bare"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html></html>".to_vec()))
        .mount(&server)
        .await;

    let fetcher = fetcher(1, fast_settings());
    let result = fetcher
        .fetch(&format!("{}/bare", server.uri()))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_html_error_page_is_still_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(
            ResponseTemplate::new(404).set_body_raw("<html>gone</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher(1, fast_settings());
    let url = format!("{}/gone", server.uri());
    let page = fetcher.fetch(&url).await.unwrap().expect("HTML is kept");
    assert_eq!(page.url, url);
    assert_eq!(page.body, b"<html>gone</html>");
}

#[tokio::test]
async fn test_processing_twice_makes_no_requests_the_second_time() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story = format!("{}/story", external.uri());
    mount_discussion(&site, "5001", &[]).await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(html("<html>story</html>"))
        .mount(&external)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let processor = processor(&config, fetcher(2, fast_settings()));
    let topic = Topic::new(story, "5001").unwrap();

    let first = processor.process(&topic).await.unwrap();
    assert_eq!(first, TopicOutcome::Crawled { pages_saved: 1 });

    let before = request_count(&site).await + request_count(&external).await;
    let second = processor.process(&topic).await.unwrap();
    let after = request_count(&site).await + request_count(&external).await;

    assert_eq!(second, TopicOutcome::AlreadyCrawled);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_outbound_pages_saved_as_they_complete() {
    let site = MockServer::start().await;
    let fast = MockServer::start().await;
    let slow = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story = format!("{}/story", fast.uri());
    let fast_link = format!("{}/fast", fast.uri());
    let slow_link = format!("{}/slow", slow.uri());
    mount_discussion(&site, "5101", &[fast_link.clone(), slow_link.clone()]).await;
    Mock::given(method("GET"))
        .respond_with(html("<html>fast</html>"))
        .mount(&fast)
        .await;
    Mock::given(method("GET"))
        .respond_with(html("<html>slow</html>").set_delay(Duration::from_millis(1500)))
        .mount(&slow)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let settings = FetchSettings {
        timeout: Duration::from_secs(5),
        ..fast_settings()
    };
    let processor = Arc::new(processor(&config, fetcher(2, settings)));

    let task = {
        let processor = Arc::clone(&processor);
        let story = story.clone();
        tokio::spawn(async move {
            let topic = Topic::new(story, "5101").unwrap();
            processor.process(&topic).await
        })
    };

    tokio::time::sleep(Duration::from_millis(700)).await;

    // The fast page is on disk while the slow fetch is still pending
    let dir = topics_dir.path().join("5101");
    let mut expected = vec![page_file_name(&story), page_file_name(&fast_link)];
    expected.sort();
    assert_eq!(files_in(&dir), expected);
    assert!(!task.is_finished());

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, TopicOutcome::Crawled { pages_saved: 3 });
    assert!(dir.join(page_file_name(&slow_link)).exists());
}

#[tokio::test]
async fn test_per_host_bound_holds_across_topics() {
    let site = MockServer::start().await;
    let slow = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(html("<html>slow</html>").set_delay(Duration::from_millis(200)))
        .mount(&slow)
        .await;

    let links_a: Vec<String> = (0..3).map(|i| format!("{}/a{}", slow.uri(), i)).collect();
    let links_b: Vec<String> = (0..3).map(|i| format!("{}/b{}", slow.uri(), i)).collect();
    mount_discussion(&site, "6001", &links_a).await;
    mount_discussion(&site, "6002", &links_b).await;

    let config = create_test_config(&site, topics_dir.path());
    let settings = FetchSettings {
        timeout: Duration::from_secs(5),
        ..fast_settings()
    };
    let fetcher = fetcher(2, settings);
    let throttle = Arc::clone(fetcher.throttle());
    let processor = processor(&config, fetcher);

    let topic_a = Topic::new(format!("{}/story-a", slow.uri()), "6001").unwrap();
    let topic_b = Topic::new(format!("{}/story-b", slow.uri()), "6002").unwrap();

    let started = Instant::now();
    let (a, b) = tokio::join!(processor.process(&topic_a), processor.process(&topic_b));
    let elapsed = started.elapsed();

    assert_eq!(a.unwrap(), TopicOutcome::Crawled { pages_saved: 4 });
    assert_eq!(b.unwrap(), TopicOutcome::Crawled { pages_saved: 4 });

    // 8 requests of 200ms through 2 permits need at least 4 rounds
    assert!(
        elapsed >= Duration::from_millis(750),
        "Per-host bound not enforced: finished in {:?}",
        elapsed
    );
    assert_eq!(throttle.available_permits(&host_of(&slow)), Some(2));
}

/// Parser that reports a link the fetcher cannot use
struct BrokenLinkParser;

impl PageParser for BrokenLinkParser {
    fn extract_topics(&self, _html: &str) -> Result<Vec<Topic>, ParseError> {
        Ok(Vec::new())
    }

    fn extract_links(&self, _html: &str) -> Result<Vec<String>, ParseError> {
        Ok(vec!["http://".to_string()])
    }
}

#[tokio::test]
async fn test_error_after_directory_creation_leaves_partial_topic() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let story = format!("{}/story", external.uri());
    mount_discussion(&site, "7001", &[]).await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(html("<html>story</html>"))
        .expect(1)
        .mount(&external)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let processor = TopicProcessor::new(
        fetcher(2, fast_settings()),
        Arc::new(BrokenLinkParser),
        Arc::new(FileSink::new()),
        config.output.topics_dir.clone(),
        config.site.comments_url_prefix.clone(),
    );
    let topic = Topic::new(story.clone(), "7001").unwrap();

    assert!(processor.process(&topic).await.is_err());
    assert_eq!(
        files_in(&topics_dir.path().join("7001")),
        vec![page_file_name(&story)]
    );

    // The partial directory now marks the topic as done
    assert_eq!(
        processor.process(&topic).await.unwrap(),
        TopicOutcome::AlreadyCrawled
    );
}

#[tokio::test]
async fn test_failing_topic_does_not_affect_siblings() {
    let site = MockServer::start().await;
    let external = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    let good = format!("{}/good", external.uri());
    let unreachable = "http://127.0.0.1:1/story".to_string();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[
            listing_row("8001", &good),
            listing_row("8002", &unreachable),
        ])))
        .mount(&site)
        .await;
    mount_discussion(&site, "8001", &[]).await;
    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(html("<html>good</html>"))
        .mount(&external)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let scheduler = scheduler(&config, fetcher(2, fast_settings()));
    let report = scheduler.run_once().await.unwrap();

    assert_eq!(report.topics_found, 2);
    assert_eq!(report.crawled, 1);
    assert_eq!(report.unavailable, 1);
    assert!(topics_dir.path().join("8001").is_dir());
    assert!(!topics_dir.path().join("8002").exists());
}

#[tokio::test]
async fn test_non_html_seed_ends_cycle() {
    let site = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("[]", "application/json"),
        )
        .mount(&site)
        .await;

    let config = create_test_config(&site, topics_dir.path());
    let scheduler = scheduler(&config, fetcher(2, fast_settings()));
    let report = scheduler.run_once().await.unwrap();

    assert!(report.seed_unavailable);
    assert_eq!(report.topics_found, 0);
    assert_eq!(std::fs::read_dir(topics_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_registry_reset_between_idle_cycles() {
    let site = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[])))
        .mount(&site)
        .await;

    let mut config = create_test_config(&site, topics_dir.path());
    config.crawler.sleep_interval = 1;
    let fetcher = fetcher(2, fast_settings());
    let throttle = Arc::clone(fetcher.throttle());
    let scheduler = scheduler(&config, fetcher);

    // Two ticks: each empty cycle drains well within the interval
    scheduler
        .run(tokio::time::sleep(Duration::from_millis(2500)))
        .await
        .unwrap();

    assert!(throttle.generation() >= 2);
    assert!(request_count(&site).await >= 2);
}

#[tokio::test]
async fn test_registry_kept_while_cycle_in_flight() {
    let site = MockServer::start().await;
    let topics_dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(listing(&[])).set_delay(Duration::from_millis(1500)))
        .mount(&site)
        .await;

    let mut config = create_test_config(&site, topics_dir.path());
    config.crawler.sleep_interval = 1;
    let settings = FetchSettings {
        timeout: Duration::from_secs(5),
        ..fast_settings()
    };
    let fetcher = fetcher(2, settings);
    let throttle = Arc::clone(fetcher.throttle());
    let scheduler = scheduler(&config, fetcher);

    // Stops just after the first tick, while the first seed fetch is pending
    scheduler
        .run(tokio::time::sleep(Duration::from_millis(1200)))
        .await
        .unwrap();

    assert_eq!(throttle.generation(), 0);
    assert_eq!(throttle.len(), 1);
}
