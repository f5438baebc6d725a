// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Reporting pipeline over loopback HTTP: ordered delivery, filtering,
//! periodic aggregation, renewal, expiry, waveform coalescing.

mod common;

use common::{seed_store, set_metric_value};
use rsdc::biceps::pm::{ComponentActivation, SampleArrayValue, Validity};
use rsdc::biceps::StateBody;
use rsdc::reporting::SubscriptionManager;
use rsdc::soap::{action, body_element, decode_envelope};
use rsdc::transport::{HttpClientPool, HttpRequest, HttpResponse, HttpServer};
use rsdc::{ReportAction, RuntimeConfig, TxKind};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

struct Sink {
    _server: HttpServer,
    url: String,
    rx: mpsc::Receiver<(String, String)>,
}

/// Loopback notification sink recording (action, raw envelope) pairs.
fn sink() -> Sink {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("literal addr");
    let server = HttpServer::bind(addr, None).expect("sink binds");
    let (tx, rx) = mpsc::channel();
    server.register(
        "/sink",
        Arc::new(move |req: &HttpRequest| {
            let text = String::from_utf8_lossy(&req.body).to_string();
            if let Ok(msg) = decode_envelope(&text) {
                let _ = tx.send((msg.headers.action.clone(), text));
            }
            HttpResponse::status(202, "Accepted")
        }),
    );
    let url = format!("http://127.0.0.1:{}/sink", server.local_addr().port());
    Sink { _server: server, url, rx }
}

fn pipeline(config: Arc<RuntimeConfig>) -> (Arc<rsdc::MdibStore>, SubscriptionManager) {
    let store = seed_store();
    let http = Arc::new(HttpClientPool::new(Arc::clone(&config)).expect("pool"));
    let mgr = SubscriptionManager::start(config, http);
    store.set_report_sink(mgr.report_sink());
    (store, mgr)
}

fn mdib_version_of(raw: &str) -> u64 {
    let msg = decode_envelope(raw).expect("notification decodes");
    let doc = msg.document().expect("re-parses");
    let body = body_element(&doc).expect("report body");
    body.attribute("MdibVersion")
        .and_then(|v| v.parse().ok())
        .expect("MdibVersion attribute")
}

#[test]
fn episodic_reports_arrive_in_version_order_without_gaps() {
    let config = Arc::new(RuntimeConfig::default());
    let (store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();

    mgr.subscribe(
        &[ReportAction::EpisodicMetricReport.uri().to_string()],
        &sink.url,
        None,
        None,
    )
    .expect("subscribe succeeds");

    for i in 0..5 {
        set_metric_value(&store, "nm0", 37.0 + f64::from(i));
    }

    let mut versions = Vec::new();
    for _ in 0..5 {
        let (action_uri, raw) =
            sink.rx.recv_timeout(Duration::from_secs(5)).expect("notification arrives");
        assert_eq!(action_uri, ReportAction::EpisodicMetricReport.uri());
        versions.push(mdib_version_of(&raw));
    }
    assert_eq!(versions, vec![2, 3, 4, 5, 6], "strictly increasing by one, no gaps");
}

#[test]
fn filter_selects_only_matching_actions() {
    let config = Arc::new(RuntimeConfig::default());
    let (store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();

    mgr.subscribe(
        &[ReportAction::EpisodicAlertReport.uri().to_string()],
        &sink.url,
        None,
        None,
    )
    .expect("subscribe succeeds");

    // A metric commit must not reach an alert-only subscription.
    set_metric_value(&store, "nm0", 38.0);
    assert!(
        sink.rx.recv_timeout(Duration::from_millis(500)).is_err(),
        "metric report must be filtered out"
    );

    // An alert commit must.
    let snap = store.read_snapshot();
    let mut ac0 = (**snap.state("ac0").expect("ac0 state")).clone();
    if let StateBody::AlertCondition { presence, .. } = &mut ac0.body {
        *presence = true;
    }
    let mut tx = store.begin_transaction(TxKind::AlertStates);
    tx.write_state(ac0).expect("stages");
    tx.commit().expect("commits");

    let (action_uri, _) =
        sink.rx.recv_timeout(Duration::from_secs(5)).expect("alert report arrives");
    assert_eq!(action_uri, ReportAction::EpisodicAlertReport.uri());
}

#[test]
fn unsupported_filter_is_rejected() {
    let config = Arc::new(RuntimeConfig::default());
    let (_store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();
    let err = mgr
        .subscribe(&["urn:not-a-report".to_string()], &sink.url, None, None)
        .expect_err("unknown action rejected");
    assert!(matches!(err, rsdc::SubscriptionError::FilterNotSupported(_)));
}

#[test]
fn periodic_reports_aggregate_once_per_interval() {
    let config = Arc::new(RuntimeConfig::default());
    // Longer than the ticker's poll step: the gate, not the poll, must
    // decide when buffers flush.
    config.update(|c| c.periodic_report_interval = Duration::from_millis(600));
    let (store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();

    mgr.subscribe(
        &[ReportAction::PeriodicMetricReport.uri().to_string()],
        &sink.url,
        None,
        None,
    )
    .expect("subscribe succeeds");

    set_metric_value(&store, "nm0", 37.0);
    set_metric_value(&store, "nm0", 38.0);
    set_metric_value(&store, "nm0", 39.0);

    // All three commits land inside one interval: exactly one aggregated
    // report, carrying only the latest value.
    let mut received = Vec::new();
    while let Ok((action_uri, raw)) = sink.rx.recv_timeout(Duration::from_millis(1500)) {
        assert_eq!(action_uri, ReportAction::PeriodicMetricReport.uri());
        received.push(raw);
    }
    assert_eq!(received.len(), 1, "one flush per interval, not one per poll step");
    let raw = &received[0];
    assert!(raw.contains("Value=\"39\""), "aggregated report carries the latest value");
    assert!(!raw.contains("Value=\"37\""), "superseded values are not re-sent");

    // A commit in the next interval produces exactly one further report.
    set_metric_value(&store, "nm0", 40.0);
    let (_, raw) = sink.rx.recv_timeout(Duration::from_secs(5)).expect("next-interval flush");
    assert!(raw.contains("Value=\"40\""));
    assert!(
        sink.rx.recv_timeout(Duration::from_millis(900)).is_err(),
        "empty buffers do not flush"
    );
}

#[test]
fn renewal_extends_and_expiry_terminates() {
    let config = Arc::new(RuntimeConfig::default());
    let (_store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();

    let grant = mgr
        .subscribe(
            &[ReportAction::EpisodicMetricReport.uri().to_string()],
            &sink.url,
            None,
            Some(Duration::from_secs(2)),
        )
        .expect("subscribe succeeds");
    assert_eq!(grant.expires, Duration::from_secs(2));

    let renewed = mgr.renew(&grant.id, Some(Duration::from_secs(600))).expect("renew succeeds");
    assert_eq!(renewed, Duration::from_secs(600));
    let remaining = mgr.status(&grant.id).expect("status succeeds");
    assert!(remaining > Duration::from_secs(500));

    // A requested TTL above the cap is clamped.
    let clamped = mgr.renew(&grant.id, Some(Duration::from_secs(1_000_000))).expect("renew");
    assert_eq!(clamped, config.get().subscription_max_ttl);

    // A zero TTL expires on the next ticker pass and announces the end.
    let doomed = mgr
        .subscribe(
            &[ReportAction::EpisodicMetricReport.uri().to_string()],
            &sink.url,
            None,
            Some(Duration::ZERO),
        )
        .expect("subscribe succeeds");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut ended = false;
    while std::time::Instant::now() < deadline {
        if let Ok((action_uri, _)) = sink.rx.recv_timeout(Duration::from_millis(200)) {
            if action_uri == action::WSE_SUBSCRIPTION_END {
                ended = true;
                break;
            }
        }
    }
    assert!(ended, "SubscriptionEnd must be attempted on expiry");
    assert!(matches!(mgr.status(&doomed.id), Err(rsdc::SubscriptionError::Expired)));
}

#[test]
fn unsubscribed_subscription_receives_nothing() {
    let config = Arc::new(RuntimeConfig::default());
    let (store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();

    let grant = mgr
        .subscribe(
            &[ReportAction::EpisodicMetricReport.uri().to_string()],
            &sink.url,
            None,
            None,
        )
        .expect("subscribe succeeds");
    mgr.unsubscribe(&grant.id).expect("unsubscribe succeeds");

    set_metric_value(&store, "nm0", 40.0);
    assert!(
        sink.rx.recv_timeout(Duration::from_millis(500)).is_err(),
        "no delivery after unsubscribe"
    );
}

#[test]
fn waveform_stream_preserves_sample_order() {
    let config = Arc::new(RuntimeConfig::default());
    let (store, mgr) = pipeline(Arc::clone(&config));
    let sink = sink();

    mgr.subscribe(&[ReportAction::WaveformStream.uri().to_string()], &sink.url, None, None)
        .expect("subscribe succeeds");

    for round in 0..3u32 {
        let snap = store.read_snapshot();
        let current = snap.state("rtsa0").cloned();
        let mut next = match current {
            Some(s) => (*s).clone(),
            None => rsdc::biceps::State::new(
                "rtsa0",
                StateBody::SampleArrayMetric {
                    activation: ComponentActivation::On,
                    samples: None,
                },
            ),
        };
        if let StateBody::SampleArrayMetric { samples, .. } = &mut next.body {
            *samples = Some(SampleArrayValue {
                samples: vec![f64::from(round), f64::from(round) + 0.5],
                determination_time: Some(1_700_000_000_000 + u64::from(round)),
                validity: Validity::Valid,
                generation_mode: rsdc::biceps::pm::GenerationMode::Real,
            });
        }
        let mut tx = store.begin_transaction(TxKind::RealTimeSamples);
        tx.write_state(next).expect("stages");
        tx.commit().expect("commits");
    }

    // Blocks may coalesce, but sample order is preserved end to end.
    let mut received = Vec::new();
    while let Ok((action_uri, raw)) = sink.rx.recv_timeout(Duration::from_millis(800)) {
        assert_eq!(action_uri, ReportAction::WaveformStream.uri());
        for chunk in raw.split("Samples=\"").skip(1) {
            let samples = chunk.split('"').next().expect("attribute closes");
            received.push(samples.to_string());
        }
    }
    assert_eq!(received, vec!["0 0.5", "1 1.5", "2 2.5"]);
}
