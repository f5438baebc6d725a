// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Canonical MDIB document round-trips: export -> import -> export is
//! byte-stable, and vendor extensions survive verbatim.

mod common;

use common::seed_store;
use rsdc::biceps::{Extensions, State, StateBody};
use rsdc::biceps::pm::{ComponentActivation, MetricValue};
use rsdc::mdib::{decode_mdib, encode_mdib};
use rsdc::{MdibStore, TxKind};

#[test]
fn export_import_export_is_stable() {
    let store = seed_store();
    let first = store.export_document();

    let mirror = MdibStore::new();
    mirror.reload_from_document(&first).expect("reimport succeeds");
    let second = mirror.export_document();

    assert_eq!(first, second, "canonical serialization must be byte-stable");
}

#[test]
fn reimport_preserves_versions_and_values() {
    let store = seed_store();
    common::set_metric_value(&store, "nm0", 37.2);
    common::set_metric_value(&store, "nm0", 37.4);

    let exported = store.export_document();
    let mirror = MdibStore::new();
    let version = mirror.reload_from_document(&exported).expect("reimport succeeds");
    assert_eq!(version.mdib_version, 3);
    assert_eq!(version.sequence_id, store.sequence_id());

    let snap = mirror.read_snapshot();
    let nm0 = snap.state("nm0").expect("nm0 mirrored");
    assert_eq!(nm0.state_version, 2);
    assert_eq!(nm0.numeric_value(), Some(37.4));
    assert_eq!(snap.descriptor_count(), store.read_snapshot().descriptor_count());
    assert_eq!(snap.children_of("ch0"), store.read_snapshot().children_of("ch0"));
}

#[test]
fn bare_mdib_document_decodes_too() {
    let store = seed_store();
    let xml = encode_mdib(&store.read_snapshot());
    let doc = decode_mdib(&xml).expect("bare msg:Mdib decodes");
    assert_eq!(doc.version.mdib_version, 1);
    assert_eq!(doc.descriptors.len(), store.read_snapshot().descriptor_count());
}

#[test]
fn extensions_survive_the_store_and_the_document() {
    let store = seed_store();
    let snap = store.read_snapshot();
    let mut with_ext = State {
        descriptor_handle: "nm0".to_string(),
        handle: None,
        state_version: 0,
        descriptor_version: 0,
        body: StateBody::NumericMetric {
            activation: ComponentActivation::On,
            value: Some(MetricValue::measured(36.8)),
            physiological_range: Vec::new(),
        },
        extensions: Extensions(vec![
            r#"<v:Calibration xmlns:v="urn:vendor-x" due="2026-09-01">factory</v:Calibration>"#
                .to_string(),
        ]),
    };
    with_ext.descriptor_version = snap.descriptor("nm0").expect("nm0").version;

    let mut tx = store.begin_transaction(TxKind::MetricStates);
    tx.write_state(with_ext).expect("stages");
    tx.commit().expect("commits");

    let exported = store.export_document();
    assert!(exported.contains("urn:vendor-x"), "extension emitted verbatim");

    let mirror = MdibStore::new();
    mirror.reload_from_document(&exported).expect("reimport succeeds");
    let mirrored = mirror.read_snapshot();
    let nm0 = mirrored.state("nm0").expect("nm0 mirrored");
    assert_eq!(nm0.extensions.0.len(), 1);
    assert!(nm0.extensions.0[0].contains("due=\"2026-09-01\""));

    // Second export keeps the bytes of the extension unchanged.
    assert_eq!(exported, mirror.export_document());
}
