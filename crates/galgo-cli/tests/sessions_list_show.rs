//! Integration tests for `galgo sessions list` / `show` and the
//! rename/delete commands, against a wiremock store.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMAIL: &str = "alumno@tectijuana.edu.mx";

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Creates a temp GALGO_HOME directory for test isolation.
fn temp_galgo_home() -> TempDir {
    TempDir::new().expect("create temp galgo home")
}

fn galgo_cmd(home: &TempDir, server: &MockServer) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("galgo");
    cmd.env("GALGO_HOME", home.path())
        .env("GALGO_EMAIL", EMAIL)
        .env("GALGO_API_URL", server.uri())
        .env("GALGO_ASSISTANT_URL", server.uri())
        .env("GALGO_BLOCK_REAL_API", "1");
    cmd
}

async fn mount_store(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/historial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "session_id": "s1",
                "user_email": EMAIL,
                "mensaje_usuario": "hola",
                "respuesta_asistente": "buenas, ¿en qué ayudo?",
            },
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/titulos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "session_id": "s1",
                "titulo": "Tarea de Redes",
                "user_email": EMAIL,
                "creado_en": "2025-05-16T08:00:00Z",
            },
            {
                "session_id": "s2",
                "titulo": "Horarios",
                "user_email": EMAIL,
                "creado_en": "2025-05-20T08:00:00Z",
            },
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sessions_list_newest_first() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;

    let output = galgo_cmd(&home, &server)
        .args(["sessions", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let output_str = String::from_utf8_lossy(&output);
    assert!(output_str.contains("Tarea de Redes"));
    assert!(output_str.contains("Horarios"));

    // s2 is newer and must come first.
    let s1_pos = output_str.find("Tarea de Redes").unwrap();
    let s2_pos = output_str.find("Horarios").unwrap();
    assert!(s2_pos < s1_pos, "sessions should be listed newest first");
}

#[tokio::test]
async fn test_sessions_list_empty() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/historial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/titulos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    galgo_cmd(&home, &server)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions found."));
}

#[tokio::test]
async fn test_sessions_list_search_filters_titles() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;

    galgo_cmd(&home, &server)
        .args(["sessions", "list", "--search", "redes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tarea de Redes"))
        .stdout(predicate::str::contains("Horarios").not());
}

#[tokio::test]
async fn test_sessions_show_prints_transcript() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;

    galgo_cmd(&home, &server)
        .args(["sessions", "show", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("user: hola"))
        .stdout(predicate::str::contains("assistant: buenas, ¿en qué ayudo?"));
}

#[tokio::test]
async fn test_sessions_show_unknown_id_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;

    galgo_cmd(&home, &server)
        .args(["sessions", "show", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[tokio::test]
async fn test_rename_prints_new_title() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;
    Mock::given(method("PUT"))
        .and(path("/titulos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    galgo_cmd(&home, &server)
        .args(["rename", "s1", "Nuevo título"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nuevo título"));
}

#[tokio::test]
async fn test_rename_fails_when_store_rejects() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;
    Mock::given(method("PUT"))
        .and(path("/titulos"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    galgo_cmd(&home, &server)
        .args(["rename", "s1", "Nuevo título"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not acknowledged"));
}

#[tokio::test]
async fn test_delete_removes_mirror_entry() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/titulos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/conversaciones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    // Pre-seed a mirrored transcript for the session being deleted.
    let mirror_dir = home.path().join("mirror");
    fs::create_dir_all(&mirror_dir).unwrap();
    let entry = mirror_dir.join("s1.json");
    fs::write(&entry, "[]").unwrap();

    galgo_cmd(&home, &server)
        .args(["delete", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted session s1"));

    assert!(!entry.exists(), "mirror entry should be removed on delete");
}

#[tokio::test]
async fn test_delete_unknown_id_fails_without_remote_calls() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_galgo_home();
    let server = MockServer::start().await;
    mount_store(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/titulos"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/conversaciones"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    galgo_cmd(&home, &server)
        .args(["delete", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
