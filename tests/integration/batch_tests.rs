use sitemap_harvester::config::{BatchConfig, FileConfigProvider, StaticConfigProvider, UserAgentConfig};
use sitemap_harvester::crawler::{
    BatchSummary, HttpTransport, Orchestrator, RunOutcome, SharedStorage,
};
use sitemap_harvester::events::{ChannelSink, HarvestEvent};
use sitemap_harvester::storage::{SqliteStorage, Storage};
use sitemap_harvester::{BatchStatus, Classification, ItemStatus};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestHarvester".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn batch_config(base_url: &str, window_size: usize, max_retries: u32) -> BatchConfig {
    BatchConfig {
        window_size,
        sitemap_url: format!("{}/sitemap.xml", base_url),
        primary_selector: "table-responsive ipo-table".to_string(),
        secondary_selector: "card-body".to_string(),
        max_retries,
        base_delay_ms: 5,
        fetch_timeout_ms: 2000,
    }
}

fn record_path(id: i64) -> String {
    format!("/view/ipo/{}/record-{}/", id, id)
}

fn sitemap_body(base_url: &str, ids: &[i64]) -> String {
    let entries: String = ids
        .iter()
        .map(|id| format!("<url><loc>{}{}</loc></url>", base_url, record_path(*id)))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<url><loc>{}/about/</loc></url>
{}
</urlset>"#,
        base_url, entries
    )
}

fn sme_page(id: i64) -> String {
    format!(
        r#"<html><head><title>Record {} Ltd IPO | Listings</title></head><body>
        <table class="table-responsive ipo-table"><tr><td>Issue type</td><td>SME</td></tr></table>
        </body></html>"#,
        id
    )
}

fn mainboard_page(id: i64) -> String {
    format!(
        r#"<html><head><title>Record {} IPO - Listings</title></head><body>
        <div class="card-body">Listed on the mainboard of the exchange.</div>
        </body></html>"#,
        id
    )
}

async fn mount_sitemap(server: &MockServer, ids: &[i64]) {
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sitemap_body(&server.uri(), ids))
                .insert_header("content-type", "application/xml"),
        )
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, id: i64, body: String) {
    Mock::given(method("GET"))
        .and(path(record_path(id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn orchestrator(
    storage: &Arc<Mutex<SqliteStorage>>,
    config: BatchConfig,
) -> Orchestrator {
    let shared: SharedStorage = storage.clone();
    Orchestrator::new(
        shared,
        Arc::new(StaticConfigProvider::new(config).expect("valid config")),
        Arc::new(HttpTransport::new(&user_agent()).expect("client")),
    )
}

fn finished(outcome: RunOutcome) -> BatchSummary {
    match outcome {
        RunOutcome::Finished(summary) => summary,
        RunOutcome::AlreadyRunning => panic!("expected the batch to run"),
    }
}

#[tokio::test]
async fn test_window_batch_end_to_end() {
    let server = MockServer::start().await;
    mount_sitemap(&server, &[5, 1, 4, 2, 3]).await;
    for id in [3, 4] {
        mount_page(&server, id, mainboard_page(id)).await;
    }
    mount_page(&server, 5, sme_page(5)).await;

    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Mutex::new(
        SqliteStorage::new(&dir.path().join("harvest.db")).unwrap(),
    ));
    let orchestrator = orchestrator(&storage, batch_config(&server.uri(), 3, 0));

    let summary = finished(orchestrator.run().await);

    assert_eq!(summary.status, BatchStatus::Completed, "{}", summary.message);
    assert_eq!((summary.completed, summary.failed, summary.skipped), (3, 0, 0));
    let ids: Vec<i64> = summary
        .run
        .items
        .iter()
        .map(|item| item.reference.source_id)
        .collect();
    assert_eq!(ids, vec![3, 4, 5]);

    let storage = storage.lock().unwrap();
    let sme = storage.get_record_by_source(5).unwrap().unwrap();
    assert_eq!(sme.name, "Record 5 Ltd");
    assert_eq!(sme.classification, Classification::TypeA);
    assert!(sme.fragment_primary.unwrap().contains("ipo-table"));

    let mainboard = storage.get_record_by_source(3).unwrap().unwrap();
    assert_eq!(mainboard.name, "Record 3");
    assert_eq!(mainboard.classification, Classification::TypeB);
    assert!(mainboard.fragment_primary.is_none());
    assert!(mainboard.fragment_secondary.is_some());

    assert!(!storage.record_exists(2).unwrap());
    let batch = storage.get_latest_batch().unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
}

#[tokio::test]
async fn test_failing_page_stops_batch() {
    let server = MockServer::start().await;
    mount_sitemap(&server, &[10, 11, 12, 13]).await;
    mount_page(&server, 10, mainboard_page(10)).await;
    Mock::given(method("GET"))
        .and(path(record_path(11)))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(record_path(12)))
        .respond_with(ResponseTemplate::new(200).set_body_string(mainboard_page(12)))
        .expect(0)
        .mount(&server)
        .await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let orchestrator = orchestrator(&storage, batch_config(&server.uri(), 10, 2));

    let summary = finished(orchestrator.run().await);

    assert_eq!(summary.status, BatchStatus::Failed);
    let statuses: Vec<ItemStatus> = summary.run.items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Completed,
            ItemStatus::Failed,
            ItemStatus::Pending,
            ItemStatus::Pending
        ]
    );
    assert!(summary.message.contains("stopped at record-11"));
    assert!(summary.message.contains("HTTP 500"));

    let storage = storage.lock().unwrap();
    let batch = storage.get_batch(summary.batch_id.unwrap()).unwrap();
    assert_eq!(batch.status, BatchStatus::Failed);
    assert_eq!(batch.summary.as_deref(), Some(summary.message.as_str()));
}

#[tokio::test]
async fn test_missing_sitemap_fails_before_storage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let orchestrator = orchestrator(&storage, batch_config(&server.uri(), 10, 3));

    let summary = finished(orchestrator.run().await);

    assert_eq!(summary.status, BatchStatus::Failed);
    assert!(summary.batch_id.is_none());
    assert!(summary.message.contains("HTTP 404"));
    assert!(storage.lock().unwrap().get_latest_batch().unwrap().is_none());
}

#[tokio::test]
async fn test_file_config_rerun_skips_stored_records() {
    let server = MockServer::start().await;
    mount_sitemap(&server, &[1, 2]).await;
    Mock::given(method("GET"))
        .and(path(record_path(1)))
        .respond_with(ResponseTemplate::new(200).set_body_string(mainboard_page(1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(record_path(2)))
        .respond_with(ResponseTemplate::new(200).set_body_string(sme_page(2)))
        .expect(1)
        .mount(&server)
        .await;

    let config_file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        config_file.path(),
        format!(
            r#"
[batch]
window-size = 10
sitemap-url = "{}/sitemap.xml"
primary-selector = "table-responsive ipo-table"
secondary-selector = "card-body"
max-retries = 0
base-delay-ms = 5
fetch-timeout-ms = 2000

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./unused.db"
"#,
            server.uri()
        ),
    )
    .unwrap();

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let shared: SharedStorage = storage.clone();
    let orchestrator = Orchestrator::new(
        shared,
        Arc::new(FileConfigProvider::new(config_file.path())),
        Arc::new(HttpTransport::new(&user_agent()).unwrap()),
    );

    let first = finished(orchestrator.run().await);
    let second = finished(orchestrator.run().await);

    assert_eq!(first.completed, 2);
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!((second.completed, second.skipped), (0, 2));
    assert_ne!(first.batch_id, second.batch_id);
    assert_eq!(storage.lock().unwrap().count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_channel_sink_sees_events_in_order() {
    let server = MockServer::start().await;
    mount_sitemap(&server, &[7, 8]).await;
    mount_page(&server, 7, mainboard_page(7)).await;
    mount_page(&server, 8, mainboard_page(8)).await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let orchestrator = orchestrator(&storage, batch_config(&server.uri(), 10, 0));
    let sink = ChannelSink::new();
    let mut rx = sink.subscribe();
    orchestrator.subscribe(Arc::new(sink));

    let summary = finished(orchestrator.run().await);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len(), 6);
    assert!(matches!(&events[0], HarvestEvent::Status(s) if s.status == BatchStatus::Running));
    let progress: Vec<(i64, ItemStatus)> = events
        .iter()
        .filter_map(|event| match event {
            HarvestEvent::Progress(p) => Some((p.item.source_id, p.status)),
            HarvestEvent::Status(_) => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![
            (7, ItemStatus::InProgress),
            (7, ItemStatus::Completed),
            (8, ItemStatus::InProgress),
            (8, ItemStatus::Completed),
        ]
    );
    match &events[5] {
        HarvestEvent::Status(status) => {
            assert_eq!(status.status, BatchStatus::Completed);
            assert_eq!(status.batch_id, summary.batch_id);
            assert_eq!(status.message, summary.message);
        }
        other => panic!("expected final status event, got {:?}", other),
    }
}
