//! Integration tests: FileHostSink multipart uploads against a local server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::http_server::{self, Route};
use mirror_core::http::HttpOptions;
use mirror_core::progress::{LimitPolicy, TracingObserver};
use mirror_core::sink::FileHostSink;
use mirror_core::{Artifact, CancelToken, Link, LocalArtifact, MirrorError, ProgressReporter, Sink};
use tempfile::tempdir;

fn reporter() -> ProgressReporter {
    ProgressReporter::new(1, LimitPolicy::Interval(Duration::from_secs(1)), Arc::new(TracingObserver))
}

fn local_file(dir: &std::path::Path, name: &str, contents: &[u8]) -> Artifact {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    Artifact::Local(LocalArtifact {
        path,
        name: name.to_string(),
        size_bytes: contents.len() as u64,
    })
}

#[test]
fn ok_reply_body_is_the_link() {
    let server = http_server::start(vec![("/", Route::ok("https://host.example/abc\n"))]);
    let dir = tempdir().unwrap();
    let sink = FileHostSink::new(server.url("/"), "file", HttpOptions::api());

    let links = sink
        .publish(&local_file(dir.path(), "f.bin", b"payload"), &reporter(), &CancelToken::new())
        .unwrap();
    assert_eq!(
        links,
        vec![Link {
            display_name: "f.bin".into(),
            url: "https://host.example/abc".into(),
            size_bytes: Some(7),
        }]
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    let body = requests[0].body_text();
    assert!(body.contains("name=\"file\""), "{body}");
    assert!(body.contains("filename=\"f.bin\""), "{body}");
    assert!(body.contains("payload"));
}

#[test]
fn other_status_is_upload_failed() {
    let server = http_server::start(vec![("/", Route::status(500, "boom"))]);
    let dir = tempdir().unwrap();
    let sink = FileHostSink::new(server.url("/"), "file", HttpOptions::api());
    let err = sink
        .publish(&local_file(dir.path(), "f.bin", b"x"), &reporter(), &CancelToken::new())
        .unwrap_err();
    assert_eq!(err, MirrorError::UploadFailed(500));
}

#[test]
fn directory_uploads_each_file_in_order() {
    let server = http_server::start(vec![("/", Route::ok("https://host.example/same"))]);
    let dir = tempdir().unwrap();
    let root = dir.path().join("season");
    std::fs::create_dir_all(root.join("extras")).unwrap();
    std::fs::write(root.join("b.mkv"), b"bb").unwrap();
    std::fs::write(root.join("a.mkv"), b"a").unwrap();
    std::fs::write(root.join("extras").join("c.srt"), b"ccc").unwrap();
    let artifact = Artifact::Local(LocalArtifact {
        path: root,
        name: "season".into(),
        size_bytes: 6,
    });

    let sink = FileHostSink::new(server.url("/"), "file", HttpOptions::api());
    let links = sink.publish(&artifact, &reporter(), &CancelToken::new()).unwrap();
    let names: Vec<&str> = links.iter().map(|l| l.display_name.as_str()).collect();
    assert_eq!(names, vec!["a.mkv", "b.mkv", "extras/c.srt"]);
    assert_eq!(links[2].size_bytes, Some(3));
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn unreachable_host_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let dir = tempdir().unwrap();
    let sink = FileHostSink::new(format!("http://127.0.0.1:{}/", port), "file", HttpOptions::api());
    let err = sink
        .publish(&local_file(dir.path(), "f.bin", b"x"), &reporter(), &CancelToken::new())
        .unwrap_err();
    assert_eq!(err.kind(), "transport_error");
}
