//! Integration tests for the `/command` endpoint, driven through the
//! full production router.

mod common;

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use sqlx::SqlitePool;

use simdock_core::protocol::Envelope;
use simdock_core::state::SimState;
use simdock_db::repositories::QueueRepo;

use common::{body_json, multipart_parts, send_command, send_multipart, submit_config, test_app};

const CONFIG_BYTES: &[u8] = b"{ SimulationName: \"test run\", Generations: 10 }\n";

#[sqlx::test(migrations = "../db/migrations")]
async fn new_simulation_stages_config_and_inserts_row(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "alpha", 5, CONFIG_BYTES).await;

    let staged = app.staging().join(sid.to_string()).join("alpha.json5");
    assert_eq!(std::fs::read(&staged).unwrap(), CONFIG_BYTES);

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Queued.code());
    assert_eq!(item.username, "tester");
    assert_eq!(item.file, "alpha.json5");
    assert_eq!(item.machine_id, "");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn new_simulation_rejects_empty_upload(pool: SqlitePool) {
    let app = test_app(pool);
    let data = serde_json::json!({
        "Command": "NewSimulation",
        "Username": "tester",
        "Data": { "Name": "empty", "OriginalFilename": "empty.json5" },
    });
    let response = send_multipart(app.router(), &data.to_string(), Some(("empty.json5", b""))).await;
    let json = body_json(response).await;
    assert_eq!(json["Status"], "error");

    // Nothing was inserted.
    assert!(QueueRepo::highest_priority_queued(&app.state.pool)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn book_returns_config_and_commits_lease_after_send(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "bookme", 5, CONFIG_BYTES).await;

    let envelope = Envelope::with_data(
        "Book",
        "simd",
        &serde_json::json!({ "MachineID": "machine-a", "CPUs": 8, "Memory": "64GB" }),
    )
    .unwrap();
    let response = send_command(app.router(), &envelope).await;
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parts = multipart_parts(&content_type, &body);

    let reply: serde_json::Value = serde_json::from_slice(&parts["json"]).unwrap();
    assert_eq!(reply["Status"], "success");
    assert_eq!(reply["SID"].as_i64().unwrap(), sid);
    assert_eq!(reply["ConfigFilename"], "bookme.json5");
    assert_eq!(parts["file"], CONFIG_BYTES);

    // The body was fully consumed, so the lease must be committed.
    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Booked.code());
    assert_eq!(item.machine_id, "machine-a");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn book_with_empty_queue_reports_none_queued(pool: SqlitePool) {
    let app = test_app(pool);
    let envelope = Envelope::with_data(
        "Book",
        "simd",
        &serde_json::json!({ "MachineID": "machine-a" }),
    )
    .unwrap();
    let response = send_command(app.router(), &envelope).await;
    let json = body_json(response).await;
    assert_eq!(json["Status"], "success");
    assert_eq!(json["Message"], "no queued items need booking");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn dropped_book_response_leaves_item_queued(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "dropme", 5, CONFIG_BYTES).await;

    let envelope = Envelope::with_data(
        "Book",
        "simd",
        &serde_json::json!({ "MachineID": "machine-a" }),
    )
    .unwrap();
    let response = send_command(app.router(), &envelope).await;
    assert_eq!(response.status(), StatusCode::OK);
    // Simulate a connection that dies before the body flushes.
    drop(response);

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Queued.code());
    assert_eq!(item.machine_id, "");

    // The booking lock was released with the dropped stream, so the job
    // is immediately leasable by someone else.
    let response = send_command(app.router(), &envelope).await;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parts = multipart_parts(&content_type, &body);
    let reply: serde_json::Value = serde_json::from_slice(&parts["json"]).unwrap();
    assert_eq!(reply["SID"].as_i64().unwrap(), sid);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn interleaved_books_hand_out_distinct_leases(pool: SqlitePool) {
    let app = test_app(pool);
    let first = submit_config(&app, "one", 1, CONFIG_BYTES).await;
    let second = submit_config(&app, "two", 2, CONFIG_BYTES).await;

    let mut leased = Vec::new();
    for machine in ["m-1", "m-2", "m-3"] {
        let envelope = Envelope::with_data(
            "Book",
            "simd",
            &serde_json::json!({ "MachineID": machine }),
        )
        .unwrap();
        let response = send_command(app.router(), &envelope).await;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        if content_type.starts_with("multipart/form-data") {
            let parts = multipart_parts(&content_type, &body);
            let reply: serde_json::Value = serde_json::from_slice(&parts["json"]).unwrap();
            leased.push(reply["SID"].as_i64().unwrap());
        } else {
            let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(reply["Message"], "no queued items need booking");
        }
    }

    // min(N items, callers) succeed, with distinct SIDs, best priority first.
    assert_eq!(leased, vec![first, second]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn rebook_resends_the_same_config(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "again", 5, CONFIG_BYTES).await;

    // First lease.
    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();

    // Rebook from a different machine is allowed (and logged).
    let rebook = Envelope::with_data(
        "Rebook",
        "simd",
        &serde_json::json!({ "SID": sid, "MachineID": "m-2" }),
    )
    .unwrap();
    let response = send_command(app.router(), &rebook).await;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parts = multipart_parts(&content_type, &body);
    assert_eq!(parts["file"], CONFIG_BYTES);

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Booked.code());
    assert_eq!(item.machine_id, "m-2");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn update_item_patches_only_supplied_fields(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "patchy", 5, CONFIG_BYTES).await;

    let envelope = Envelope::with_data(
        "UpdateItem",
        "op",
        &serde_json::json!({ "SID": sid, "Priority": 10, "Description": "Updated" }),
    )
    .unwrap();
    let response = send_command(app.router(), &envelope).await;
    let json = body_json(response).await;
    assert_eq!(json["Status"], "success");
    assert_eq!(json["ID"].as_i64().unwrap(), sid);

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.priority, 10);
    assert_eq!(item.description, "Updated");
    // Untouched fields survive.
    assert_eq!(item.url, "http://localhost:8080");
    assert_eq!(item.name, "patchy");
    assert_eq!(item.state, SimState::Queued.code());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn update_item_dates_drive_state_transitions(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "stately", 5, CONFIG_BYTES).await;

    // Lease it so the Executing transition is legal.
    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();

    let estimate = Envelope::with_data(
        "UpdateItem",
        "simulator",
        &serde_json::json!({ "SID": sid, "DtEstimate": "2026-09-01T12:00:00Z" }),
    )
    .unwrap();
    let json = body_json(send_command(app.router(), &estimate).await).await;
    assert_eq!(json["Status"], "success");

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Executing.code());
    assert!(item.dt_estimate.is_some());

    let completed = Envelope::with_data(
        "UpdateItem",
        "simulator",
        &serde_json::json!({ "SID": sid, "DtCompleted": "2026-09-01T11:45:00Z" }),
    )
    .unwrap();
    let json = body_json(send_command(app.router(), &completed).await).await;
    assert_eq!(json["Status"], "success");

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Completed.code());
    assert!(item.dt_completed.is_some());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn update_item_empty_date_clears_to_null(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "nullify", 5, CONFIG_BYTES).await;

    let set = Envelope::with_data(
        "UpdateItem",
        "simulator",
        &serde_json::json!({ "SID": sid, "MachineID": "m-1", "DtEstimate": "2026-09-01T12:00:00Z" }),
    )
    .unwrap();
    // Queued -> Executing is not legal; lease first.
    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();
    let json = body_json(send_command(app.router(), &set).await).await;
    assert_eq!(json["Status"], "success");

    let clear = Envelope::with_data(
        "UpdateItem",
        "op",
        &serde_json::json!({ "SID": sid, "DtEstimate": "" }),
    )
    .unwrap();
    let json = body_json(send_command(app.router(), &clear).await).await;
    assert_eq!(json["Status"], "success");

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert!(item.dt_estimate.is_none());
    // Clearing does not change state.
    assert_eq!(item.state, SimState::Executing.code());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn update_item_bad_date_fails_whole_update(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "baddate", 5, CONFIG_BYTES).await;

    let envelope = Envelope::with_data(
        "UpdateItem",
        "op",
        &serde_json::json!({ "SID": sid, "Priority": 9, "DtEstimate": "banana" }),
    )
    .unwrap();
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "error");

    // The priority change did not slip through.
    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.priority, 5);
}

/// Build a gzipped tarball of the given files using the system tar, the
/// same way the agent does.
fn build_tarball(dir: &std::path::Path, files: &[(&str, &[u8])]) -> Vec<u8> {
    for (name, bytes) in files {
        std::fs::write(dir.join(name), bytes).unwrap();
    }
    let names: Vec<&str> = files.iter().map(|(name, _)| *name).collect();
    let status = std::process::Command::new("tar")
        .arg("czf")
        .arg("results.tar.gz")
        .args(&names)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success());
    std::fs::read(dir.join("results.tar.gz")).unwrap()
}

#[sqlx::test(migrations = "../db/migrations")]
async fn end_simulation_archives_results_and_clears_staging(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "finish", 5, CONFIG_BYTES).await;

    // Walk the item to Completed through the normal lifecycle.
    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();
    for (field, value) in [
        ("DtEstimate", "2026-09-01T12:00:00Z"),
        ("DtCompleted", "2026-09-01T11:00:00Z"),
    ] {
        let envelope = Envelope::with_data(
            "UpdateItem",
            "simulator",
            &serde_json::json!({ "SID": sid, field: value }),
        )
        .unwrap();
        let json = body_json(send_command(app.router(), &envelope).await).await;
        assert_eq!(json["Status"], "success");
    }

    let scratch = tempfile::tempdir().unwrap();
    let tarball = build_tarball(
        scratch.path(),
        &[
            ("finish.json5", CONFIG_BYTES),
            ("finrep.csv", b"gen,score\n1,0.5\n"),
            ("sim.log", b"done\n"),
        ],
    );

    let data = serde_json::json!({
        "Command": "EndSimulation",
        "Username": "simd",
        "SID": sid,
        "Filename": "results.tar.gz",
    });
    let response = send_multipart(
        app.router(),
        &data.to_string(),
        Some(("results.tar.gz", &tarball)),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["Status"], "success", "end failed: {json}");

    // Results extracted into the date-partitioned tree, tarball gone.
    let now = chrono::Utc::now();
    use chrono::Datelike;
    let results_dir = app
        .results()
        .join(now.year().to_string())
        .join(now.month().to_string())
        .join(now.day().to_string())
        .join(sid.to_string());
    assert!(results_dir.join("finrep.csv").is_file());
    assert!(results_dir.join("finish.json5").is_file());
    assert!(!results_dir.join("results.tar.gz").exists());

    // Staging directory is gone; state advanced.
    assert!(!app.staging().join(sid.to_string()).exists());
    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::ResultsSaved.code());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn end_simulation_with_corrupt_tarball_leaves_item_completed(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "corrupt", 5, CONFIG_BYTES).await;

    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();
    for (field, value) in [
        ("DtEstimate", "2026-09-01T12:00:00Z"),
        ("DtCompleted", "2026-09-01T11:00:00Z"),
    ] {
        let envelope = Envelope::with_data(
            "UpdateItem",
            "simulator",
            &serde_json::json!({ "SID": sid, field: value }),
        )
        .unwrap();
        let _ = body_json(send_command(app.router(), &envelope).await).await;
    }

    let data = serde_json::json!({
        "Command": "EndSimulation",
        "Username": "simd",
        "SID": sid,
        "Filename": "results.tar.gz",
    });
    let response = send_multipart(
        app.router(),
        &data.to_string(),
        Some(("results.tar.gz", b"this is not a tarball")),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["Status"], "error");

    // Eligible for another EndSimulation attempt.
    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Completed.code());
    assert!(app.staging().join(sid.to_string()).exists());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn delete_item_removes_staging_and_row(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "doomed", 5, CONFIG_BYTES).await;
    assert!(app.staging().join(sid.to_string()).exists());

    let envelope =
        Envelope::with_data("DeleteItem", "op", &serde_json::json!({ "SID": sid })).unwrap();
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "success");

    assert!(!app.staging().join(sid.to_string()).exists());
    assert!(QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .is_none());

    // Deleting again still succeeds.
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "success");

    // And the active queue no longer lists it.
    let envelope = Envelope::new("GetActiveQueue", "op");
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Data"].as_array().unwrap().len(), 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn redo_requeues_a_finished_simulation(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "redome", 5, CONFIG_BYTES).await;

    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();
    for (field, value) in [
        ("DtEstimate", "2026-09-01T12:00:00Z"),
        ("DtCompleted", "2026-09-01T11:00:00Z"),
    ] {
        let envelope = Envelope::with_data(
            "UpdateItem",
            "simulator",
            &serde_json::json!({ "SID": sid, field: value }),
        )
        .unwrap();
        let _ = body_json(send_command(app.router(), &envelope).await).await;
    }

    let scratch = tempfile::tempdir().unwrap();
    let tarball = build_tarball(
        scratch.path(),
        &[("redome.json5", CONFIG_BYTES), ("finrep.csv", b"ok\n")],
    );
    let data = serde_json::json!({
        "Command": "EndSimulation",
        "Username": "simd",
        "SID": sid,
        "Filename": "results.tar.gz",
    });
    let response = send_multipart(
        app.router(),
        &data.to_string(),
        Some(("results.tar.gz", &tarball)),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["Status"], "success");

    let envelope = Envelope::with_data(
        "Redo",
        "op",
        &serde_json::json!({ "SID": sid, "MachineID": "m-1" }),
    )
    .unwrap();
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "success", "redo failed: {json}");

    // Config is staged again; the results directory is gone.
    assert!(app
        .staging()
        .join(sid.to_string())
        .join("redome.json5")
        .is_file());
    use chrono::Datelike;
    let now = chrono::Utc::now();
    let results_dir = app
        .results()
        .join(now.year().to_string())
        .join(now.month().to_string())
        .join(now.day().to_string())
        .join(sid.to_string());
    assert!(!results_dir.exists());

    let item = QueueRepo::find_by_id(&app.state.pool, sid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.state, SimState::Queued.code());
    assert_eq!(item.machine_id, "");
    assert!(item.dt_estimate.is_none());
    assert!(item.dt_completed.is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn get_machine_queue_lists_a_machines_leases(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "mine", 5, CONFIG_BYTES).await;
    submit_config(&app, "unleased", 5, CONFIG_BYTES).await;

    let book = Envelope::with_data("Book", "simd", &serde_json::json!({ "MachineID": "m-1" }))
        .unwrap();
    let response = send_command(app.router(), &book).await;
    let _ = response.into_body().collect().await.unwrap();

    let envelope = Envelope::with_data(
        "GetMachineQueue",
        "simd",
        &serde_json::json!({ "MachineID": "m-1" }),
    )
    .unwrap();
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "success");
    let data = json["Data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["SID"].as_i64().unwrap(), sid);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn get_sid_returns_item_or_error(pool: SqlitePool) {
    let app = test_app(pool);
    let sid = submit_config(&app, "lookup", 5, CONFIG_BYTES).await;

    let envelope = Envelope::with_data("GetSID", "op", &serde_json::json!({ "SID": sid })).unwrap();
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "success");
    assert_eq!(json["Data"][0]["Name"], "lookup");

    let envelope =
        Envelope::with_data("GetSID", "op", &serde_json::json!({ "SID": 424242 })).unwrap();
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "error");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_command_is_a_structured_error(pool: SqlitePool) {
    let app = test_app(pool);
    let envelope = Envelope::new("MakeCoffee", "op");
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "error");
    assert!(json["Message"]
        .as_str()
        .unwrap()
        .contains("unknown command"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_content_type_is_rejected(pool: SqlitePool) {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    let app = test_app(pool);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/command")
        .body(Body::from(r#"{"Command": "GetActiveQueue"}"#))
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["Status"], "error");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn shutdown_replies_then_trips_the_token(pool: SqlitePool) {
    let app = test_app(pool);
    let envelope = Envelope::new("Shutdown", "op");
    let json = body_json(send_command(app.router(), &envelope).await).await;
    assert_eq!(json["Status"], "success");

    // The token trips after the 1 s flush delay.
    assert!(!app.state.shutdown.is_cancelled());
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(app.state.shutdown.is_cancelled());
}
