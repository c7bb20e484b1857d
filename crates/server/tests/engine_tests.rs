//! Blob engine tests under injected storage and metadata faults.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use common::{
    FaultyMetadata, FaultyStore, Part, TestServer, body_stream, multipart_body, seeded_bytes,
};
use futures::StreamExt;
use hoard_core::{FileId, UploadRequest};
use hoard_server::engine::{Backend, BlobError, ChunkStore, MetadataCatalog};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tower::ServiceExt;

struct Harness {
    server: TestServer,
    objects: Arc<FaultyStore>,
    metadata: Arc<FaultyMetadata>,
}

async fn harness() -> Harness {
    let objects = Arc::new(FaultyStore::new());
    let metadata = Arc::new(FaultyMetadata::new().await);
    let server = TestServer::with_faults(objects.clone(), metadata.clone(), |_| {}).await;
    Harness {
        server,
        objects,
        metadata,
    }
}

async fn upload_status(
    server: &TestServer,
    filename: &str,
    data: &[u8],
) -> (StatusCode, serde_json::Value) {
    let (content_type, body) = multipart_body(&[Part::file(filename, data)]);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn record_count(server: &TestServer) -> usize {
    server.engine().list().await.unwrap().len()
}

/// Poll until `check` holds or a few seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ============================================================================
// Ingest atomicity
// ============================================================================

#[tokio::test]
async fn test_failed_chunk_write_rolls_back() {
    let h = harness().await;
    h.objects.fail_puts_after(2);

    let (status, body) = upload_status(&h.server, "partial.bin", &seeded_bytes(1, 5000)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "backend_failure");

    assert_eq!(h.objects.object_count(), 0);
    assert_eq!(record_count(&h.server).await, 0);
}

#[tokio::test]
async fn test_failed_record_insert_rolls_back() {
    let h = harness().await;
    h.metadata.set_fail_inserts(true);

    let data = seeded_bytes(2, 3500);
    let (status, body) = upload_status(&h.server, "orphan.bin", &data).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "backend_failure");
    assert_eq!(h.objects.object_count(), 0);

    h.metadata.set_fail_inserts(false);
    let (status, body) = upload_status(&h.server, "orphan.bin", &data).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file"]["chunkCount"], 4);
    assert_eq!(h.objects.object_count(), 4);
    assert_eq!(record_count(&h.server).await, 1);
}

#[tokio::test]
async fn test_failed_body_stream_rolls_back() {
    let h = harness().await;

    let data = seeded_bytes(3, 4096);
    let body = body_stream(&data, 1024).chain(futures::stream::iter([Err(
        BlobError::InvalidInput("client went away".to_string()),
    )]));
    let err = h
        .server
        .engine()
        .ingest(UploadRequest::new("cut.bin", None), body)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");

    assert_eq!(h.objects.object_count(), 0);
    assert_eq!(record_count(&h.server).await, 0);
}

#[tokio::test]
async fn test_cancelled_upload_is_rolled_back() {
    let h = harness().await;

    let data = seeded_bytes(4, 3 * 1024);
    let body = body_stream(&data, 1024).chain(futures::stream::pending());
    let engine = h.server.engine().clone();
    let task = tokio::spawn(async move {
        engine
            .ingest(UploadRequest::new("stalled.bin", None), body)
            .await
    });

    let objects = h.objects.clone();
    assert!(
        eventually(|| objects.object_count() >= 2).await,
        "chunks were never written"
    );

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    let objects = h.objects.clone();
    assert!(
        eventually(|| objects.object_count() == 0).await,
        "{} chunks left after cancellation",
        h.objects.object_count()
    );
    assert_eq!(record_count(&h.server).await, 0);
}

#[tokio::test]
async fn test_disconnect_during_commit_keeps_file() {
    let h = harness().await;
    h.metadata.set_insert_ack_delay(Duration::from_millis(300));

    let data = seeded_bytes(10, 3000);
    let ingest = h
        .server
        .engine()
        .ingest(UploadRequest::new("acked-late.bin", None), body_stream(&data, 1000));
    // The caller gives up while the record insert is still unacknowledged.
    let result = tokio::time::timeout(Duration::from_millis(100), ingest).await;
    assert!(result.is_err(), "ingest finished before the insert was acknowledged");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while record_count(&h.server).await == 0 {
        assert!(tokio::time::Instant::now() < deadline, "record was never committed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Give a wrongly spawned rollback time to run.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(h.objects.object_count(), 3);
    let records = h.server.engine().list().await.unwrap();
    assert_eq!(records.len(), 1);
    let download = h.server.engine().open(records[0].id).await.unwrap();
    let mut stream = download.stream;
    let mut served = Vec::new();
    while let Some(piece) = stream.next().await {
        served.extend_from_slice(&piece.unwrap());
    }
    assert_eq!(served, data.to_vec());
}

#[tokio::test]
async fn test_disconnect_during_failed_commit_rolls_back() {
    let h = harness().await;
    h.metadata.set_fail_inserts(true);
    h.metadata.set_insert_ack_delay(Duration::from_millis(300));

    let ingest = h.server.engine().ingest(
        UploadRequest::new("never.bin", None),
        body_stream(&seeded_bytes(11, 3000), 1000),
    );
    let result = tokio::time::timeout(Duration::from_millis(100), ingest).await;
    assert!(result.is_err(), "ingest finished before the insert failed");
    assert_eq!(h.objects.object_count(), 3);

    let objects = h.objects.clone();
    assert!(
        eventually(|| objects.object_count() == 0).await,
        "{} chunks left after the failed commit",
        h.objects.object_count()
    );
    assert_eq!(record_count(&h.server).await, 0);
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_failed_chunk_delete_keeps_record() {
    let h = harness().await;
    let data = seeded_bytes(5, 2500);
    let record = h
        .server
        .engine()
        .ingest(UploadRequest::new("sticky.bin", None), body_stream(&data, 700))
        .await
        .unwrap();

    h.objects.set_fail_deletes(true);
    let err = h.server.engine().delete(record.id).await.unwrap_err();
    assert_eq!(err.code(), "backend_failure");

    // Still listed and still readable.
    assert_eq!(record_count(&h.server).await, 1);
    let download = h.server.engine().open(record.id).await.unwrap();
    let mut stream = download.stream;
    let mut served = Vec::new();
    while let Some(piece) = stream.next().await {
        served.extend_from_slice(&piece.unwrap());
    }
    assert_eq!(served, data.to_vec());

    h.objects.set_fail_deletes(false);
    h.server.engine().delete(record.id).await.unwrap();
    assert_eq!(h.objects.object_count(), 0);
    assert_eq!(record_count(&h.server).await, 0);
    assert!(matches!(
        h.server.engine().delete(record.id).await,
        Err(BlobError::NotFound(_))
    ));
}

// ============================================================================
// Orphan sweep
// ============================================================================

#[tokio::test]
async fn test_sweep_reclaims_abandoned_uploads() {
    let h = harness().await;
    let engine = h.server.engine();
    let chunks = h.server.chunks();

    let kept = engine
        .ingest(
            UploadRequest::new("kept.bin", None),
            body_stream(&seeded_bytes(6, 2048), 512),
        )
        .await
        .unwrap();

    let long_ago = OffsetDateTime::now_utc() - time::Duration::hours(3);
    let abandoned = FileId::new();
    for sequence in 0..3 {
        let key = chunks.key(&abandoned, sequence);
        chunks
            .put(&abandoned, sequence, seeded_bytes(7, 1024))
            .await
            .unwrap();
        h.objects.inner.set_last_modified(&key, long_ago).unwrap();
    }
    // Old chunks of the committed file must survive too.
    for sequence in 0..kept.chunk_count {
        let key = chunks.key(&kept.id, sequence);
        h.objects.inner.set_last_modified(&key, long_ago).unwrap();
    }
    let streaming = FileId::new();
    chunks
        .put(&streaming, 0, seeded_bytes(8, 1024))
        .await
        .unwrap();

    let stats = engine.sweep_orphans(time::Duration::hours(1)).await.unwrap();
    assert_eq!(stats.files_checked, 3);
    assert_eq!(stats.chunks_deleted, 3);
    assert_eq!(stats.errors, 0);

    assert!(chunks.file_keys(&abandoned).await.unwrap().is_empty());
    assert_eq!(chunks.file_keys(&streaming).await.unwrap().len(), 1);
    assert_eq!(chunks.file_keys(&kept.id).await.unwrap().len(), 2);
    assert!(engine.open(kept.id).await.is_ok());
}

#[tokio::test]
async fn test_sweep_counts_delete_failures() {
    let h = harness().await;
    let chunks = h.server.chunks();

    let abandoned = FileId::new();
    for sequence in 0..2 {
        chunks
            .put(&abandoned, sequence, seeded_bytes(9, 1024))
            .await
            .unwrap();
        let key = chunks.key(&abandoned, sequence);
        h.objects
            .inner
            .set_last_modified(&key, OffsetDateTime::UNIX_EPOCH)
            .unwrap();
    }

    h.objects.set_fail_deletes(true);
    let stats = h
        .server
        .engine()
        .sweep_orphans(time::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(stats.chunks_deleted, 0);
    assert_eq!(stats.errors, 2);
    assert_eq!(h.objects.object_count(), 2);

    // The next run picks the file up again.
    h.objects.set_fail_deletes(false);
    let stats = h
        .server
        .engine()
        .sweep_orphans(time::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(stats.chunks_deleted, 2);
    assert_eq!(h.objects.object_count(), 0);
}

// ============================================================================
// Readiness
// ============================================================================

#[tokio::test]
async fn test_gate_opened_late() {
    let objects = Arc::new(FaultyStore::new());
    let metadata = Arc::new(FaultyMetadata::new().await);
    let server = TestServer::not_ready();
    let engine = server.engine();

    let err = engine
        .ingest(UploadRequest::new("early.bin", None), body_stream(b"early", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::NotReady));
    assert!(matches!(engine.list().await, Err(BlobError::NotReady)));
    assert!(matches!(
        engine.sweep_orphans(time::Duration::hours(1)).await,
        Err(BlobError::NotReady)
    ));

    let bucket = engine.config().bucket.clone();
    let backend = Backend::new(
        ChunkStore::new(objects.clone(), &bucket),
        MetadataCatalog::new(metadata.clone(), &bucket),
    );
    assert!(engine.gate().open(backend).is_ok());
    assert_eq!((objects.calls(), metadata.calls()), (0, 0));

    let record = engine
        .ingest(UploadRequest::new("late.bin", None), body_stream(b"on time", 3))
        .await
        .unwrap();
    assert_eq!(record.length, 7);
    assert_eq!(objects.object_count(), 1);

    // The gate opens once.
    let again = Backend::new(
        ChunkStore::new(objects.clone(), &bucket),
        MetadataCatalog::new(metadata, &bucket),
    );
    assert!(engine.gate().open(again).is_err());
}
