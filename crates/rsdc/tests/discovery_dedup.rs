// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! WS-Discovery over real loopback multicast: hello/bye events, probe
//! matching, and end-to-end duplicate suppression (a Hello is transmitted
//! three times per the retransmit schedule but must surface exactly once).
//!
//! Environments without a multicast-capable interface skip these tests at
//! runtime instead of failing.

use rsdc::{DiscoveredEndpoint, DiscoveryEvent, ProbeFilter, RuntimeConfig, WsDiscovery};
use std::sync::Arc;
use std::time::Duration;

fn engine() -> Option<WsDiscovery> {
    let config = Arc::new(RuntimeConfig::default());
    match WsDiscovery::start(config, None) {
        Ok(e) => Some(e),
        Err(e) => {
            eprintln!("skipping discovery test: {}", e);
            None
        }
    }
}

fn service(epr_suffix: &str) -> DiscoveredEndpoint {
    DiscoveredEndpoint {
        epr: format!("urn:uuid:00000000-0000-0000-0000-{:0>12}", epr_suffix),
        types: vec!["dpws:Device".to_string(), "mdpws:MedicalDevice".to_string()],
        scopes: vec!["sdc.ctxt.loc:/HOSP/ICU/Bed7".to_string()],
        xaddrs: vec!["http://127.0.0.1:6464/dev".to_string()],
        metadata_version: 1,
    }
}

#[test]
fn hello_is_deduplicated_to_one_event() {
    let Some(publisher) = engine() else { return };
    let Some(watcher) = engine() else { return };
    let events = watcher.events();

    let svc = service("000000000001");
    publisher.publish(svc.clone());

    // The announcement is retransmitted three times; exactly one Entered
    // for our EPR may surface. Other tests share the multicast group, so
    // count only our own.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut ours = 0;
    let mut seen_xaddrs = Vec::new();
    while std::time::Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(DiscoveryEvent::Entered(ep)) if ep.epr == svc.epr => {
                ours += 1;
                seen_xaddrs = ep.xaddrs;
            }
            Ok(_) | Err(_) => continue,
        }
    }
    if ours == 0 {
        eprintln!("skipping: loopback multicast did not deliver");
        return;
    }
    assert_eq!(ours, 1, "retransmitted Hello must be suppressed to one event");
    assert_eq!(seen_xaddrs, svc.xaddrs);
}

#[test]
fn probe_finds_matching_services_and_honors_scopes() {
    let Some(provider) = engine() else { return };
    let Some(client) = engine() else { return };

    provider.publish(service("000000000002"));
    // Give the announcement a moment before probing.
    std::thread::sleep(Duration::from_millis(200));

    let found = client.probe(&ProbeFilter::medical_device(), Some(Duration::from_secs(2)));
    if found.is_empty() {
        eprintln!("skipping: loopback multicast did not deliver probe matches");
        return;
    }
    assert!(found.iter().any(|ep| ep.epr.ends_with("000000000002")));

    // A scope filter that does not match selects nothing from us.
    let filter = ProbeFilter {
        types: vec!["dpws:Device".to_string()],
        scopes: vec!["sdc.ctxt.loc:/OTHERHOSP".to_string()],
    };
    let none = client.probe(&filter, Some(Duration::from_millis(800)));
    assert!(
        !none.iter().any(|ep| ep.epr.ends_with("000000000002")),
        "scope mismatch must filter our service"
    );
}

#[test]
fn resolve_returns_transport_addresses() {
    let Some(provider) = engine() else { return };
    let Some(client) = engine() else { return };

    let svc = service("000000000003");
    provider.publish(svc.clone());
    std::thread::sleep(Duration::from_millis(200));

    match client.resolve(&svc.epr, Some(Duration::from_secs(2))) {
        Some(resolved) => {
            assert_eq!(resolved.epr, svc.epr);
            assert_eq!(resolved.xaddrs, svc.xaddrs);
        }
        None => eprintln!("skipping: loopback multicast did not deliver resolve match"),
    }
}

#[test]
fn bye_emits_left() {
    let Some(provider) = engine() else { return };
    let Some(watcher) = engine() else { return };
    let events = watcher.events();

    let svc = service("000000000004");
    provider.publish(svc.clone());
    match events.recv_timeout(Duration::from_secs(5)) {
        Ok(DiscoveryEvent::Entered(_)) => {}
        other => {
            eprintln!("skipping: no hello over loopback ({:?})", other);
            return;
        }
    }

    provider.withdraw(&svc.epr);
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(DiscoveryEvent::Left(epr)) => {
                assert_eq!(epr, svc.epr);
                return;
            }
            Ok(_) | Err(_) => continue,
        }
    }
    panic!("Bye did not surface as Left");
}
