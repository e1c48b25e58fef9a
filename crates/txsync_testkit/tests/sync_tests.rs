//! End-to-end publishing, transport and replay between a client and a server.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use txsync_core::{CoreError, Entity, FieldValue, NaturalKey, SaveOptions};
use txsync_engine::{IncomingQueue, LocalTransport, SyncError, Transport, PRODUCER_MODEL};
use txsync_protocol::Action;
use txsync_testkit::prelude::*;

fn by_key(db: &txsync_core::Database, model: &str, key: &str) -> Option<Entity> {
    db.get_by_natural_key(model, &NaturalKey::single(key)).unwrap()
}

fn create_fks(fixture: &SyncFixture) -> Vec<Entity> {
    "abcdefg"
        .chars()
        .map(|name| {
            fixture
                .client
                .create("Fk", [("name", name.to_string())])
                .unwrap()
        })
        .collect()
}

// ----------------------------------------------------------------------
// Capability contract
// ----------------------------------------------------------------------

#[test]
fn raises_on_missing_natural_key() {
    let fixture = SyncFixture::new();
    let err = fixture
        .client
        .create("BadTestModel", std::iter::empty::<(&str, FieldValue)>())
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration { .. }));
    assert!(err.to_string().contains("natural_key"));
    assert!(outgoing(&fixture.client).is_empty());
}

#[test]
fn raises_on_missing_get_by_natural_key() {
    let fixture = SyncFixture::new();
    let err = fixture
        .client
        .create("AnotherBadTestModel", std::iter::empty::<(&str, FieldValue)>())
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration { .. }));
    assert!(err.to_string().contains("get_by_natural_key"));
}

// ----------------------------------------------------------------------
// Publishing
// ----------------------------------------------------------------------

#[test]
fn creates_outgoing_on_add() {
    let fixture = SyncFixture::new();
    let erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();

    let rows = outgoing(&fixture.client);
    assert_eq!(
        rows.iter()
            .filter(|r| r.tx_name == "TestModel"
                && r.action == Action::Insert
                && r.tx_pk == erik.id().as_uuid())
            .count(),
        1
    );
    assert_eq!(
        rows.iter()
            .filter(|r| r.tx_name == "TestModelAudit" && r.action == Action::Insert)
            .count(),
        1
    );
}

#[test]
fn created_obj_serializes_to_correct_db() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();

    assert_eq!(
        outgoing_names(&fixture.client, None),
        ["TestModel", "Producer", "TestModelAudit"]
    );
    assert!(outgoing(&fixture.server).is_empty());
}

#[test]
fn creates_outgoing_on_change() {
    let fixture = SyncFixture::new();
    let erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.client.save(&erik).unwrap();

    let rows = outgoing(&fixture.client);
    let of = |name: &str, action: Action| {
        rows.iter()
            .filter(|r| r.tx_name == name && r.action == action)
            .count()
    };
    assert_eq!(of("TestModel", Action::Insert), 1);
    assert_eq!(of("TestModel", Action::Update), 1);
    assert_eq!(of("TestModelAudit", Action::Insert), 2);
}

#[test]
fn updated_obj_serializes_to_correct_db() {
    let fixture = SyncFixture::new();
    let erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    assert_eq!(
        outgoing_names(&fixture.client, Some(Action::Insert)),
        ["TestModel", "Producer", "TestModelAudit"]
    );
    assert!(outgoing_names(&fixture.client, Some(Action::Update)).is_empty());

    fixture.client.save(&erik).unwrap();
    assert_eq!(
        outgoing_names(&fixture.client, Some(Action::Update)),
        ["TestModel"]
    );
    assert_eq!(
        outgoing_names(&fixture.client, Some(Action::Insert)),
        ["TestModel", "Producer", "TestModelAudit", "TestModelAudit"]
    );
}

#[test]
fn timestamp_is_default_order() {
    let fixture = SyncFixture::new();
    let erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.client.save(&erik).unwrap();

    let rows = outgoing(&fixture.client);
    assert_eq!(rows.len(), 5);
    for pair in rows.windows(2) {
        assert!(pair[0].timestamp.as_number() < pair[1].timestamp.as_number());
        assert!(pair[0].timestamp.as_str() < pair[1].timestamp.as_str());
    }
}

#[test]
fn does_not_create_outgoing_when_disabled() {
    let fixture = SyncFixture::with_config(test_config().with_model_serialization(false));
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.server.create("TestModel", [("f1", "erik")]).unwrap();

    assert!(outgoing(&fixture.client).is_empty());
    assert!(outgoing(&fixture.server).is_empty());
    assert_eq!(fixture.client.count(PRODUCER_MODEL).unwrap(), 0);
}

#[test]
fn audit_trail_switch_only_drops_audit_rows() {
    let fixture = SyncFixture::with_config(test_config().with_audit_trail_serialization(false));
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();

    assert_eq!(
        outgoing_names(&fixture.client, None),
        ["TestModel", "Producer"]
    );
    assert_eq!(fixture.client.count("TestModelAudit").unwrap(), 1);
}

#[test]
fn call_override_wins_over_global_switch() {
    let fixture = SyncFixture::with_config(test_config().with_model_serialization(false));
    let erik = fixture
        .client
        .schema()
        .instantiate("TestModel", [("f1", "erik")])
        .unwrap();
    fixture
        .client
        .save_with(&erik, SaveOptions::publish(true))
        .unwrap();

    // The producer's own insert is an ordinary save and follows the switch.
    assert_eq!(
        outgoing_names(&fixture.client, None),
        ["TestModel", "TestModelAudit"]
    );
    assert_eq!(fixture.client.count(PRODUCER_MODEL).unwrap(), 1);

    let enabled = SyncFixture::new();
    let erik = enabled
        .client
        .schema()
        .instantiate("TestModel", [("f1", "erik")])
        .unwrap();
    enabled
        .client
        .save_with(&erik, SaveOptions::publish(false))
        .unwrap();
    assert!(outgoing(&enabled.client).is_empty());
    assert_eq!(enabled.client.count(PRODUCER_MODEL).unwrap(), 0);
}

#[test]
fn default_database_never_publishes() {
    let fixture = SyncFixture::new();
    fixture.default.create("TestModel", [("f1", "erik")]).unwrap();

    assert!(outgoing(&fixture.default).is_empty());
    assert_eq!(fixture.default.count(PRODUCER_MODEL).unwrap(), 0);
    assert_eq!(fixture.default.count("TestModelAudit").unwrap(), 1);
}

#[test]
fn skip_saving_predicate_opts_out() {
    let fixture = SyncFixture::new();
    fixture
        .client
        .create(
            "DraftModel",
            [("f1", FieldValue::from("d1")), ("draft", FieldValue::from(true))],
        )
        .unwrap();
    assert!(outgoing(&fixture.client).is_empty());

    fixture.client.create("DraftModel", [("f1", "d2")]).unwrap();
    assert_eq!(
        outgoing_names(&fixture.client, None),
        ["DraftModel", "Producer"]
    );
}

#[test]
fn rolled_back_write_publishes_nothing_but_keeps_producer() {
    let fixture = SyncFixture::new();
    let erik = fixture
        .client
        .schema()
        .instantiate("TestModel", [("f1", "erik")])
        .unwrap();
    let mut txn = fixture.client.begin();
    txn.save(&erik).unwrap();
    txn.rollback();

    assert_eq!(fixture.client.count("TestModel").unwrap(), 0);
    assert_eq!(outgoing_names(&fixture.client, None), ["Producer"]);
}

#[test]
fn creates_producer() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.client.create("TestModel", [("f1", "john")]).unwrap();

    assert_eq!(fixture.client.count(PRODUCER_MODEL).unwrap(), 1);
    let producer = by_key(
        &fixture.client,
        PRODUCER_MODEL,
        &format!("{TEST_HOST}-client"),
    )
    .unwrap();
    assert_eq!(producer.text("settings_key"), Some("client"));
    assert_eq!(producer.text("url"), Some("http://testhost/"));
    assert!(outgoing(&fixture.client)
        .iter()
        .all(|r| r.producer == "testhost-client"));
}

#[test]
fn concurrent_writers_share_one_producer() {
    let fixture = SyncFixture::new();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&fixture.client);
            std::thread::spawn(move || {
                client
                    .create("TestModel", [("f1", format!("t{i}"))])
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(fixture.client.count(PRODUCER_MODEL).unwrap(), 1);
    let names = outgoing_names(&fixture.client, None);
    assert_eq!(names.iter().filter(|n| *n == "Producer").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == "TestModel").count(), 8);
    assert_eq!(names.iter().filter(|n| *n == "TestModelAudit").count(), 8);
}

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

#[test]
fn copy_db_to_db() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    assert!(IncomingQueue::new(&fixture.server).all().unwrap().is_empty());

    let report = fixture.copy_to_server();
    assert_eq!(report.copied, 3);
    let incoming = IncomingQueue::new(&fixture.server).all().unwrap();
    let outgoing = outgoing(&fixture.client);
    assert_eq!(incoming.len(), outgoing.len());
    for (copy, source) in incoming.iter().zip(&outgoing) {
        assert_eq!(copy.id, source.id);
        assert_eq!(copy.tx_name, source.tx_name);
        assert_eq!(copy.tx_pk, source.tx_pk);
        assert_eq!(copy.tx, source.tx);
        assert_eq!(copy.timestamp, source.timestamp);
        assert_eq!(copy.producer, source.producer);
        assert_eq!(copy.action, source.action);
        assert!(!copy.is_consumed);
        assert!(source.is_consumed_by("server"));
    }
}

#[test]
fn recopy_is_a_counted_no_op() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    assert_eq!(fixture.copy_to_server().copied, 3);

    let again = fixture.copy_to_server();
    assert_eq!((again.copied, again.duplicates), (0, 0));

    let everything = outgoing(&fixture.client);
    let forced = LocalTransport
        .copy_to_incoming(&fixture.client, &everything, &fixture.server)
        .unwrap();
    assert_eq!((forced.copied, forced.duplicates), (0, 3));
    assert_eq!(IncomingQueue::new(&fixture.server).all().unwrap().len(), 3);
}

// ----------------------------------------------------------------------
// Replay
// ----------------------------------------------------------------------

#[test]
fn deserialize_fails_not_server() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.copy_to_server();

    let err = fixture
        .deserializer_as(SyncFixture::client_device())
        .deserialize(&fixture.server)
        .unwrap_err();
    assert!(matches!(err, SyncError::Authorization { ref device_id } if device_id == "10"));
    assert_eq!(fixture.server_pending(), 3);
    assert_eq!(fixture.server.count("TestModel").unwrap(), 0);
    assert!(IncomingQueue::new(&fixture.server)
        .all()
        .unwrap()
        .iter()
        .all(|row| row.last_error.is_none()));
}

#[test]
fn deserialize_succeeds_as_server() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    assert!(fixture.deserializer().deserialize(&fixture.server).is_ok());
}

#[test]
fn deserialize_insert() {
    let fixture = SyncFixture::new();
    let erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    let results = fixture.sync();

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.counts(), (1, 0, 0), "{}", result.tx_name);
        assert!(result.is_clean());
    }
    let replayed = by_key(&fixture.server, "TestModel", "erik").unwrap();
    assert_eq!(replayed.id(), erik.id());
    assert_eq!(replayed.get("f3"), erik.get("f3"));
    assert_eq!(fixture.server.count(PRODUCER_MODEL).unwrap(), 1);
    assert!(by_key(&fixture.server, PRODUCER_MODEL, "testhost-client").is_some());
    // Replays are raw, so the server publishes nothing back.
    assert!(outgoing(&fixture.server).is_empty());
}

#[test]
fn deserialize_update() {
    let fixture = SyncFixture::new();
    let mut erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.sync();
    assert_eq!(fixture.server_pending(), 0);

    erik.set("f2", "dinner");
    fixture.client.save(&erik).unwrap();
    let results = fixture.sync();

    assert_eq!(results.len(), 2);
    assert_eq!(result_for(&results, "TestModel").unwrap().counts(), (0, 1, 0));
    assert_eq!(
        result_for(&results, "TestModelAudit").unwrap().counts(),
        (1, 0, 0)
    );
    let replayed = by_key(&fixture.server, "TestModel", "erik").unwrap();
    assert_eq!(replayed.text("f2"), Some("dinner"));
    assert_eq!(fixture.server.count("TestModel").unwrap(), 1);
}

#[test]
fn reconsume_yields_empty_result() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.sync();

    assert!(fixture.consume().is_empty());
    assert!(fixture.sync().is_empty());
    assert_eq!(fixture.server.count("TestModel").unwrap(), 1);
}

#[test]
fn results_follow_first_appearance() {
    let fixture = SyncFixture::new();
    fixture.client.create("Fk", [("name", "a")]).unwrap();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.client.create("Fk", [("name", "b")]).unwrap();

    let results = fixture.sync();
    let names: Vec<&str> = results.iter().map(|r| r.tx_name.as_str()).collect();
    assert_eq!(names, ["Fk", "Producer", "TestModel", "TestModelAudit"]);
    assert_eq!(result_for(&results, "Fk").unwrap().inserted, 2);
}

#[test]
fn check_hostname_leaves_local_rows_pending() {
    let fixture = SyncFixture::new();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.copy_to_server();

    let results = fixture
        .deserializer()
        .check_hostname(TEST_HOST, ["client", "server"])
        .deserialize(&fixture.server)
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(fixture.server_pending(), 3);

    let results = fixture
        .deserializer()
        .check_hostname("elsewhere", ["client", "server"])
        .deserialize(&fixture.server)
        .unwrap();
    assert_eq!(totals(&results), (3, 0, 0));
}

#[test]
fn check_hostname_ignores_hosts_sharing_a_prefix() {
    let fixture = SyncFixture::with_config(test_config().with_hostname("mac-2"));
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    fixture.copy_to_server();
    assert!(outgoing(&fixture.client)
        .iter()
        .all(|row| row.producer == "mac-2-client"));

    let results = fixture
        .deserializer()
        .check_hostname("mac", ["client", "server"])
        .deserialize(&fixture.server)
        .unwrap();
    assert_eq!(totals(&results), (3, 0, 0));
    assert_eq!(fixture.server_pending(), 0);
}

#[test]
fn complex_model_works_for_fk() {
    let fixture = SyncFixture::new();
    let fks = create_fks(&fixture);
    let last = fks.last().unwrap();
    fixture
        .client
        .create(
            "ComplexTestModel",
            [("f1", FieldValue::from("1")), ("fk", FieldValue::from(last.to_ref()))],
        )
        .unwrap();

    fixture.sync();
    assert_eq!(fixture.server_pending(), 0);

    let complex = by_key(&fixture.server, "ComplexTestModel", "1").unwrap();
    let fk_ref = complex.get("fk").and_then(FieldValue::as_reference).unwrap();
    let fk = fixture.server.get("Fk", fk_ref.id).unwrap().unwrap();
    assert_eq!(fk.text("name"), Some("g"));
}

#[test]
fn deserialization_messages_inserted() {
    let fixture = SyncFixture::new();
    let fks = create_fks(&fixture);
    fixture
        .client
        .create(
            "ComplexTestModel",
            [("f1", FieldValue::from("1")), ("fk", FieldValue::from(fks[6].to_ref()))],
        )
        .unwrap();

    let results = fixture.sync();
    // Seven Fk rows, the producer, the complex row and its audit row.
    assert_eq!(totals(&results), (10, 0, 0));
}

#[test]
fn deserialization_messages_updated() {
    let fixture = SyncFixture::new();
    let fks = create_fks(&fixture);
    let complex = fixture
        .client
        .create(
            "ComplexTestModel",
            [("f1", FieldValue::from("1")), ("fk", FieldValue::from(fks[6].to_ref()))],
        )
        .unwrap();
    fixture.sync();

    fixture.client.save(&complex).unwrap();
    let results = fixture.sync();
    assert_eq!(totals(&results).1, 1);
    assert_eq!(fixture.server_pending(), 0);
}

#[test]
fn deserialize_with_m2m() {
    let fixture = SyncFixture::new();
    let fks = create_fks(&fixture);
    let tags: Vec<Entity> = "hijklmnop"
        .chars()
        .map(|name| {
            fixture
                .client
                .create("M2m", [("name", name.to_string())])
                .unwrap()
        })
        .collect();
    let mut complex = fixture
        .client
        .create(
            "ComplexTestModel",
            [("f1", FieldValue::from("1")), ("fk", FieldValue::from(fks[6].to_ref()))],
        )
        .unwrap();
    let first = tags.first().unwrap();
    let last = tags.last().unwrap();
    complex.set("m2m", vec![first.to_ref(), last.to_ref()]);
    fixture.client.save(&complex).unwrap();

    fixture.sync();
    assert_eq!(fixture.server_pending(), 0);

    let replayed = by_key(&fixture.server, "ComplexTestModel", "1").unwrap();
    let refs = replayed
        .get("m2m")
        .and_then(FieldValue::as_references)
        .unwrap();
    assert_eq!(refs.len(), 2);
    let names: Vec<String> = refs
        .iter()
        .map(|r| {
            fixture
                .server
                .get("M2m", r.id)
                .unwrap()
                .unwrap()
                .text("name")
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(names, ["h", "p"]);
}

#[test]
fn dates_survive_replay() {
    let fixture = SyncFixture::new();
    let day = NaiveDate::from_ymd_opt(2016, 2, 29).unwrap();
    let at = Utc::now();
    let dated = fixture
        .client
        .create(
            "TestModelDates",
            [
                ("f1", FieldValue::from("d")),
                ("f2", FieldValue::from(day)),
                ("f3", FieldValue::from(at)),
            ],
        )
        .unwrap();

    fixture.sync();
    let replayed = by_key(&fixture.server, "TestModelDates", "d").unwrap();
    assert_eq!(replayed.fields(), dated.fields());
}

#[test]
fn duplicate_insert_is_skipped_by_default() {
    let fixture = SyncFixture::new();
    fixture
        .server
        .create(
            "TestModel",
            [("f1", FieldValue::from("erik")), ("f2", FieldValue::from("server"))],
        )
        .unwrap();
    fixture.client.create("TestModel", [("f1", "erik")]).unwrap();

    let results = fixture.sync();
    let test_model = result_for(&results, "TestModel").unwrap();
    assert_eq!(test_model.counts(), (0, 0, 0));
    assert!(test_model.is_clean());
    assert_eq!(fixture.server_pending(), 0);

    let kept = by_key(&fixture.server, "TestModel", "erik").unwrap();
    assert_eq!(kept.text("f2"), Some("server"));
    assert_eq!(fixture.server.count("TestModel").unwrap(), 1);
}

#[test]
fn duplicate_policy_can_overwrite() {
    let fixture = SyncFixture::new();
    let local = fixture
        .server
        .create(
            "OverwriteModel",
            [("f1", FieldValue::from("x")), ("f2", FieldValue::from("old"))],
        )
        .unwrap();
    fixture
        .client
        .create(
            "OverwriteModel",
            [("f1", FieldValue::from("x")), ("f2", FieldValue::from("new"))],
        )
        .unwrap();

    let results = fixture.sync();
    assert_eq!(
        result_for(&results, "OverwriteModel").unwrap().counts(),
        (0, 1, 0)
    );
    let replayed = by_key(&fixture.server, "OverwriteModel", "x").unwrap();
    assert_eq!(replayed.id(), local.id());
    assert_eq!(replayed.text("f2"), Some("new"));
}

#[test]
fn deletes_replay_by_recorded_id() {
    let fixture = SyncFixture::new();
    let fk = fixture.client.create("Fk", [("name", "a")]).unwrap();
    fixture.sync();
    assert_eq!(fixture.server.count("Fk").unwrap(), 1);

    assert!(fixture.client.delete("Fk", fk.id()).unwrap());
    assert_eq!(outgoing_names(&fixture.client, Some(Action::Delete)), ["Fk"]);
    let results = fixture.sync();
    assert_eq!(result_for(&results, "Fk").unwrap().counts(), (0, 0, 1));
    assert_eq!(fixture.server.count("Fk").unwrap(), 0);
}

#[test]
fn delete_of_absent_entity_counts_nothing() {
    let fixture = SyncFixture::new();
    let fk = fixture.client.create("Fk", [("name", "a")]).unwrap();
    fixture.client.delete("Fk", fk.id()).unwrap();

    // Deliver only the delete.
    let deletes: Vec<_> = outgoing(&fixture.client)
        .into_iter()
        .filter(|r| r.action == Action::Delete)
        .collect();
    LocalTransport
        .copy_to_incoming(&fixture.client, &deletes, &fixture.server)
        .unwrap();
    let results = fixture.consume();
    assert_eq!(result_for(&results, "Fk").unwrap().counts(), (0, 0, 0));
    assert_eq!(fixture.server_pending(), 0);
}

#[test]
fn unresolved_reference_leaves_row_pending() {
    let fixture = SyncFixture::new();
    let fk = fixture.client.create("Fk", [("name", "a")]).unwrap();
    fixture
        .client
        .create(
            "ComplexTestModel",
            [("f1", FieldValue::from("1")), ("fk", FieldValue::from(fk.to_ref()))],
        )
        .unwrap();

    // Withhold the Fk row.
    let rows: Vec<_> = outgoing(&fixture.client)
        .into_iter()
        .filter(|r| r.tx_name != "Fk")
        .collect();
    LocalTransport
        .copy_to_incoming(&fixture.client, &rows, &fixture.server)
        .unwrap();
    let results = fixture.consume();

    assert_eq!(result_for(&results, PRODUCER_MODEL).unwrap().inserted, 1);
    let complex = result_for(&results, "ComplexTestModel").unwrap();
    assert_eq!(complex.counts(), (0, 0, 0));
    assert_eq!(complex.errors.len(), 1);
    assert!(complex.errors[0].message.contains("unresolved reference"));
    assert_eq!(
        result_for(&results, "ComplexTestModelAudit").unwrap().errors.len(),
        1
    );
    assert_eq!(fixture.server_pending(), 2);
    let stalled = IncomingQueue::new(&fixture.server)
        .get(complex.errors[0].tx_id)
        .unwrap()
        .unwrap();
    assert!(stalled.last_error.is_some());

    // Delivering the Fk row unblocks both.
    let results = fixture.sync();
    assert_eq!(totals(&results), (3, 0, 0));
    assert_eq!(fixture.server_pending(), 0);
    let replayed = IncomingQueue::new(&fixture.server)
        .get(stalled.id)
        .unwrap()
        .unwrap();
    assert!(replayed.is_consumed);
    assert!(replayed.last_error.is_none());
}

#[test]
fn failed_row_does_not_stop_later_rows() {
    let fixture = SyncFixture::new();
    let fk = fixture.client.create("Fk", [("name", "a")]).unwrap();
    fixture
        .client
        .create(
            "ComplexTestModel",
            [("f1", FieldValue::from("1")), ("fk", FieldValue::from(fk.to_ref()))],
        )
        .unwrap();
    fixture.client.create("TestModel", [("f1", "later")]).unwrap();

    let rows: Vec<_> = outgoing(&fixture.client)
        .into_iter()
        .filter(|r| r.tx_name != "Fk")
        .collect();
    LocalTransport
        .copy_to_incoming(&fixture.client, &rows, &fixture.server)
        .unwrap();
    let results = fixture.consume();

    let failed = result_for(&results, "ComplexTestModel").unwrap();
    assert_eq!(failed.errors.len(), 1);
    assert_eq!(result_for(&results, "TestModel").unwrap().counts(), (1, 0, 0));
    assert!(by_key(&fixture.server, "TestModel", "later").is_some());
    let stalled = IncomingQueue::new(&fixture.server)
        .get(failed.errors[0].tx_id)
        .unwrap()
        .unwrap();
    assert_eq!(stalled.last_error.as_deref(), Some(failed.errors[0].message.as_str()));
}

#[test]
fn missing_reference_resolver_supplies_target() {
    let fixture = SyncFixture::new();
    let fallback = fixture
        .server
        .create("Fk", [("name", FALLBACK_FK)])
        .unwrap();
    let real = fixture.client.create("Fk", [("name", "real")]).unwrap();
    fixture
        .client
        .create(
            "FallbackNote",
            [("title", FieldValue::from("n")), ("fk", FieldValue::from(real.to_ref()))],
        )
        .unwrap();

    let rows: Vec<_> = outgoing(&fixture.client)
        .into_iter()
        .filter(|r| r.tx_name != "Fk")
        .collect();
    LocalTransport
        .copy_to_incoming(&fixture.client, &rows, &fixture.server)
        .unwrap();
    let results = fixture.consume();

    assert_eq!(
        result_for(&results, "FallbackNote").unwrap().counts(),
        (1, 0, 0)
    );
    let note = by_key(&fixture.server, "FallbackNote", "n").unwrap();
    let target = note.get("fk").and_then(FieldValue::as_reference).unwrap();
    assert_eq!(target.id, fallback.id());
}

#[test]
fn update_before_insert_replays_as_insert() {
    let fixture = SyncFixture::new();
    let mut erik = fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
    erik.set("f2", "late");
    fixture.client.save(&erik).unwrap();

    let updates: Vec<_> = outgoing(&fixture.client)
        .into_iter()
        .filter(|r| r.action == Action::Update)
        .collect();
    LocalTransport
        .copy_to_incoming(&fixture.client, &updates, &fixture.server)
        .unwrap();
    let results = fixture.consume();

    assert_eq!(result_for(&results, "TestModel").unwrap().counts(), (1, 0, 0));
    let replayed = by_key(&fixture.server, "TestModel", "erik").unwrap();
    assert_eq!(replayed.text("f2"), Some("late"));
}
