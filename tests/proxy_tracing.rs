//! Proxy behaviour seen from the client, the upstream and the stats sink.

use std::time::Duration;

use trace_proxy::observability::trace::IncomingTrace;

mod common;

const TRACE: &str = "105445aa7843bc8bf206b12000100000";

#[tokio::test]
async fn continues_incoming_trace_upstream() {
    let backend = common::start_backend(|head| {
        let header = common::header_value(head, "x-cloud-trace-context").unwrap_or_default();
        (200, header)
    })
    .await;
    let (reporter, _rx) = common::channel_reporter(Duration::from_secs(3600));
    let proxy = common::start_proxy(backend, reporter).await;

    let res = common::client()
        .get(format!("http://{}/work", proxy.addr))
        .header("X-Cloud-Trace-Context", format!("{TRACE}/1;o=1"))
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), 200);

    let seen: IncomingTrace = res.text().await.unwrap().parse().unwrap();
    assert_eq!(seen.trace_id, TRACE);
    assert_ne!(seen.parent_span_id, Some(1), "proxy must send its own span");
    assert_eq!(seen.sampled, Some(true));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn starts_trace_when_header_missing() {
    let backend = common::start_backend(|head| {
        let header = common::header_value(head, "x-cloud-trace-context").unwrap_or_default();
        let forwarded = common::header_value(head, "x-forwarded-for").unwrap_or_default();
        (200, format!("{header}|{forwarded}"))
    })
    .await;
    let (reporter, _rx) = common::channel_reporter(Duration::from_secs(3600));
    let proxy = common::start_proxy(backend, reporter).await;

    let body = common::client()
        .get(format!("http://{}/", proxy.addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let (header, forwarded) = body.split_once('|').unwrap();
    let seen: IncomingTrace = header.parse().unwrap();
    assert_eq!(seen.trace_id.len(), 32);
    assert!(seen.parent_span_id.is_some());
    assert_eq!(forwarded, "127.0.0.1");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn reports_requests_and_statuses() {
    let backend = common::start_backend(|head| {
        if head.starts_with("GET /missing") {
            (404, "Not Found".into())
        } else {
            (200, "OK".into())
        }
    })
    .await;
    let (reporter, mut rx) = common::channel_reporter(Duration::from_millis(50));
    let proxy = common::start_proxy(backend, reporter.clone()).await;

    let client = common::client();
    for path in ["/a", "/b", "/missing"] {
        let res = client
            .get(format!("http://{}{}", proxy.addr, path))
            .send()
            .await
            .unwrap();
        assert!(res.status() == 200 || res.status() == 404);
    }

    // Timer starts after the traffic so the first window holds all of it.
    let runner = common::spawn_reporter(&reporter);
    let stats = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stats.window_index, 1);
    assert_eq!(stats.request_count, 3);
    assert_eq!(stats.trace_ids.len(), 6);
    assert!((stats.status_class_rate_percent[&2] - 200.0 / 3.0).abs() < 1e-9);
    assert!((stats.status_class_rate_percent[&4] - 100.0 / 3.0).abs() < 1e-9);
    for id in &stats.trace_ids {
        assert_eq!(stats.trace_ids.iter().filter(|t| *t == id).count(), 2);
    }

    reporter.close().unwrap();
    runner.await.unwrap();
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_reports_failure() {
    let target = format!("127.0.0.1:{}", common::closed_port()).parse().unwrap();
    let (reporter, mut rx) = common::channel_reporter(Duration::from_millis(50));
    let proxy = common::start_proxy(target, reporter.clone()).await;

    let res = common::client()
        .get(format!("http://{}/", proxy.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);

    let runner = common::spawn_reporter(&reporter);
    let stats = rx.recv().await.unwrap();
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.status_class_rate_percent.get(&5), Some(&100.0));

    reporter.close().unwrap();
    runner.await.unwrap();
    proxy.shutdown.trigger();
}

#[tokio::test]
async fn server_stops_on_shutdown() {
    let backend = common::start_backend(|_| (200, "OK".into())).await;
    let (reporter, _rx) = common::channel_reporter(Duration::from_secs(3600));
    let proxy = common::start_proxy(backend, reporter).await;

    assert!(proxy.shutdown.trigger());
    tokio::time::timeout(Duration::from_secs(5), proxy.server)
        .await
        .expect("server did not stop")
        .unwrap();
}
