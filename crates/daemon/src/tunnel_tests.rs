// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;

#[test]
fn extracts_trycloudflare_url_from_line() {
    let line = "2026-01-01 INFO your quick tunnel has been created! https://foo-bar.trycloudflare.com";
    assert_eq!(
        extract_quick_tunnel_url(line),
        Some("https://foo-bar.trycloudflare.com".to_string())
    );
}

#[test]
fn ignores_lines_without_a_tunnel_url() {
    assert_eq!(extract_quick_tunnel_url("starting tunnel"), None);
}

#[test]
fn detects_named_tunnel_registration_phrase() {
    assert!(detects_named_tunnel_registration(
        "2026-01-01 INF Registered tunnel connection connIndex=0"
    ));
    assert!(!detects_named_tunnel_registration("2026-01-01 INF connecting to edge"));
}

fn fake_binary(dir: &std::path::Path, script: &str) -> std::path::PathBuf {
    let path = dir.join("fake-cloudflared");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\n{script}").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn start_resolves_on_first_matching_url_and_stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_binary(
        dir.path(),
        "echo 'https://quick-test.trycloudflare.com'; sleep 30",
    );
    let supervisor =
        Arc::new(TunnelSupervisor::with_binary(script.to_string_lossy().to_string(), dir.path().to_path_buf()));

    let (url, id) = supervisor.start(9876).await.unwrap();
    assert_eq!(url, "https://quick-test.trycloudflare.com");
    assert!(!id.is_empty());
    assert_eq!(supervisor.get_tunnel_url().as_deref(), Some(url.as_str()));

    supervisor.stop();
    supervisor.stop();
    assert!(supervisor.get_tunnel_url().is_none());
}

#[tokio::test]
async fn start_fails_fast_when_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_binary(dir.path(), "echo 'https://a.trycloudflare.com'; sleep 30");
    let supervisor =
        Arc::new(TunnelSupervisor::with_binary(script.to_string_lossy().to_string(), dir.path().to_path_buf()));

    supervisor.start(1).await.unwrap();
    let err = supervisor.start(1).await.unwrap_err();
    assert!(matches!(err, DaemonError::TunnelAlreadyRunning));
    supervisor.stop();
}

#[tokio::test]
async fn start_with_token_detects_registration_phrase() {
    let dir = tempfile::tempdir().unwrap();
    let script =
        fake_binary(dir.path(), "echo 'INF Registered tunnel connection' 1>&2; sleep 30");
    let supervisor =
        Arc::new(TunnelSupervisor::with_binary(script.to_string_lossy().to_string(), dir.path().to_path_buf()));

    supervisor.start_with_token("tok").await.unwrap();
    assert_eq!(supervisor.get_tunnel_url().as_deref(), Some(NAMED_TUNNEL_MARKER));
    supervisor.stop();
}

#[tokio::test]
async fn reconnect_waits_the_fixed_delay_before_respawning() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_binary(dir.path(), "echo 'https://reconnect.trycloudflare.com'; exit 1");
    let supervisor =
        Arc::new(TunnelSupervisor::with_binary(script.to_string_lossy().to_string(), dir.path().to_path_buf()));
    let mut events = supervisor.subscribe();

    let started = std::time::Instant::now();
    supervisor.start(1).await.unwrap();

    assert!(matches!(events.recv().await.unwrap(), TunnelEvent::Connected { .. }));
    assert!(matches!(events.recv().await.unwrap(), TunnelEvent::Error(_)));
    let reconnected = events.recv().await.unwrap();
    assert!(matches!(reconnected, TunnelEvent::Connected { .. }));
    assert!(
        started.elapsed() >= RECONNECT_DELAY,
        "respawn happened before the fixed delay elapsed: {:?}",
        started.elapsed()
    );

    supervisor.stop();
}

#[tokio::test]
async fn reconnect_gives_up_after_five_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_binary(dir.path(), "echo 'https://cap-test.trycloudflare.com'; exit 1");
    let supervisor =
        Arc::new(TunnelSupervisor::with_binary(script.to_string_lossy().to_string(), dir.path().to_path_buf()));
    let mut events = supervisor.subscribe();

    supervisor.start(1).await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), TunnelEvent::Connected { .. }));

    // One initial failure plus MAX_RECONNECT_ATTEMPTS respawns, each preceded
    // by a successful Connected, then a final Error with no further respawn.
    for _ in 0..MAX_RECONNECT_ATTEMPTS {
        let err = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        assert!(matches!(err, TunnelEvent::Error(_)));
        let reconnected = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        assert!(matches!(reconnected, TunnelEvent::Connected { .. }));
    }
    let final_err = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    assert!(matches!(final_err, TunnelEvent::Error(_)));

    // No further respawn after the cap: nothing else arrives.
    let nothing = tokio::time::timeout(Duration::from_secs(3), events.recv()).await;
    assert!(nothing.is_err(), "expected no event after the reconnect cap was reached");

    supervisor.stop();
}
