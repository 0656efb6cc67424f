//! Ingestion integration tests.
//!
//! Run with: `cargo test -p stowage-pipeline --test filer_test`

mod helpers;

use bytes::Bytes;
use helpers::fixtures::{create_test_jpeg, create_test_pdf, create_test_png};
use helpers::{setup_test_app, setup_with_policies, setup_with_upload_cap, TestApp};
use std::sync::Arc;
use stowage_core::{content_hash, FileError, FileRecord, ProvedContext};
use stowage_pipeline::{
    Filter, InMemoryFile, LocalFile, Naming, Payload, PayloadSource, Pipeline, Policy,
    PolicyOptions, SignatureStrategy, StaticIngress, StaticPolicy, StreamFile, UploadErrorCode,
    UploadedFile,
};

fn avatar_policy(pipeline: Pipeline<ProvedContext>, naming: Naming) -> Arc<dyn Policy> {
    Arc::new(
        StaticPolicy::new("avatar")
            .with_media_type("image/*")
            .with_ingress(
                StaticIngress::new(SignatureStrategy::new())
                    .with_path("avatars")
                    .with_pipeline(pipeline)
                    .with_naming(naming),
            ),
    )
}

#[tokio::test]
async fn test_save_jpeg_from_memory() {
    let app = setup_test_app();
    let jpeg = create_test_jpeg(64, 48);

    let record = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("photo.jpg", jpeg).with_mime("image/jpeg"),
            PolicyOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(record.uri, "uploads://photo.jpg");
    assert_eq!(record.store, "uploads");
    assert_eq!(record.path, "photo.jpg");
    assert_eq!(record.mime, "image/jpeg");
    assert_eq!(record.extension.as_deref(), Some("jpg"));
    assert_eq!(record.name, "photo.jpg");

    let stored = app.storage.read(&record.file_uri().unwrap()).await.unwrap();
    assert_eq!(record.size, stored.len() as u64);
    assert_eq!(record.hash, content_hash(&stored));
    assert_eq!(app.stored_keys().await, vec!["photo.jpg"]);
}

#[tokio::test]
async fn test_mismatched_claim_writes_nothing() {
    let app = setup_test_app();

    let result = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("photo.jpg", create_test_png(8, 8)).with_mime("image/jpeg"),
            PolicyOptions::new(),
        )
        .await;

    match result {
        Err(FileError::Validation(message)) => {
            assert!(message.contains("image/jpeg"), "{}", message);
            assert!(message.contains("image/png"), "{}", message);
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert!(app.stored_keys().await.is_empty());
}

#[tokio::test]
async fn test_filter_message_is_returned_verbatim() {
    let pipeline = Pipeline::new().filter(Filter::new(
        "tiny",
        "Avatars must be under 100 bytes",
        |ctx: &ProvedContext| ctx.size() < 100,
    ));
    let app = setup_with_policies(vec![avatar_policy(pipeline, Naming::Original)]);

    let err = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("me.jpg", create_test_jpeg(32, 32)).with_mime("image/jpeg"),
            PolicyOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FileError::Validation(ref m) if m == "Avatars must be under 100 bytes"
    ));
    assert!(app.stored_keys().await.is_empty());
}

#[tokio::test]
async fn test_save_text_from_stream() {
    let app = setup_test_app();
    let reader = std::io::Cursor::new(b"line one\nline two\n".to_vec());

    let record = app
        .filer
        .save(
            "uploads",
            StreamFile::new("notes.txt", reader).with_mime("text/plain"),
            PolicyOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(record.uri, "uploads://documents/notes.txt");
    assert_eq!(record.mime, "text/plain");
    assert_eq!(record.size, 18);
}

#[tokio::test]
async fn test_save_local_file_claims_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Quarterly Report.pdf");
    std::fs::write(&path, create_test_pdf()).unwrap();

    let app = setup_test_app();
    let record = app
        .filer
        .save("uploads", LocalFile::new(&path), PolicyOptions::new())
        .await
        .unwrap();

    assert_eq!(record.uri, "uploads://documents/Quarterly_Report.pdf");
    assert_eq!(record.mime, "application/pdf");
    // The caller's file is left alone
    assert!(path.exists());
}

#[tokio::test]
async fn test_declared_size_must_match() {
    let app = setup_test_app();
    let pdf = create_test_pdf();
    let payload = Payload::new("report.pdf", PayloadSource::Buffer(Bytes::from(pdf.clone())))
        .with_mime("application/pdf")
        .with_size(pdf.len() as u64 + 1);

    let err = app
        .filer
        .save("uploads", payload, PolicyOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::Validation(ref m) if m.contains("declared size")));
    assert!(app.stored_keys().await.is_empty());
}

#[tokio::test]
async fn test_upload_error_is_rejected() {
    let app = setup_test_app();
    let payload = Payload::new("photo.jpg", PayloadSource::Buffer(Bytes::new()))
        .with_error(UploadErrorCode::Partial);

    let err = app
        .filer
        .save("uploads", payload, PolicyOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::Upload(_)));
}

#[tokio::test]
async fn test_name_option_renames_stored_file() {
    let app = setup_test_app();

    let record = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("IMG_0001.jpg", create_test_jpeg(16, 16)).with_mime("image/jpeg"),
            PolicyOptions::new().with("name", "holiday snap.png"),
        )
        .await
        .unwrap();

    // The proved extension wins over the one in the option
    assert_eq!(record.uri, "uploads://holiday_snap.jpg");
}

#[tokio::test]
async fn test_path_option_overrides_policy_path() {
    let app = setup_test_app();

    let record = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("photo.jpg", create_test_jpeg(16, 16)).with_mime("image/jpeg"),
            PolicyOptions::new().with("path", "albums/2024"),
        )
        .await
        .unwrap();

    assert_eq!(record.uri, "uploads://albums/2024/photo.jpg");
    assert_eq!(app.stored_keys().await, vec!["albums/2024/photo.jpg"]);
}

#[tokio::test]
async fn test_unique_naming() {
    let app = setup_with_policies(vec![avatar_policy(Pipeline::new(), Naming::Unique)]);

    let first = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("me.jpg", create_test_jpeg(16, 16)).with_mime("image/jpeg"),
            PolicyOptions::new(),
        )
        .await
        .unwrap();
    let second = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("me.jpg", create_test_jpeg(16, 16)).with_mime("image/jpeg"),
            PolicyOptions::new(),
        )
        .await
        .unwrap();

    assert_ne!(first.uri, second.uri);
    let uri = first.file_uri().unwrap();
    assert_eq!(uri.group(), Some("avatars"));
    assert_eq!(uri.extension(), Some("jpg"));
    assert!(uuid::Uuid::parse_str(uri.stem()).is_ok());
    assert_eq!(app.stored_keys().await.len(), 2);
}

#[tokio::test]
async fn test_unmounted_scheme() {
    let app = setup_test_app();
    let err = app
        .filer
        .save(
            "cdn",
            InMemoryFile::new("photo.jpg", create_test_jpeg(8, 8)),
            PolicyOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::Configuration(_)));
}

#[tokio::test]
async fn test_no_policy_for_media_type() {
    let app = setup_test_app();
    let err = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("blob.bin", vec![0u8, 1, 2, 3, 0xFF]),
            PolicyOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FileError::PolicyNotFound(ref selector) if selector.starts_with("uploads/")
    ));
}

#[tokio::test]
async fn test_extension_claim_is_proved() {
    let policy: Arc<dyn Policy> = Arc::new(
        StaticPolicy::new("avatar")
            .with_media_type("image/jpeg")
            .with_ingress(StaticIngress::default().with_path("avatars")),
    );
    let app = setup_with_policies(vec![policy]);

    // No declared type: `.jpg` picks the policy, the bytes say PDF
    let err = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("me.jpg", create_test_pdf()),
            PolicyOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, FileError::Validation(ref m) if m.contains("application/pdf")),
        "{:?}",
        err
    );
    assert!(app.stored_keys().await.is_empty());
}

#[tokio::test]
async fn test_proved_type_must_be_handled_by_policy() {
    let policy: Arc<dyn Policy> = Arc::new(
        StaticPolicy::new("raw")
            .with_media_type("application/octet-stream")
            .with_ingress(StaticIngress::default().with_path("raw")),
    );
    let app = setup_with_policies(vec![policy]);

    let err = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("blob", create_test_png(4, 4))
                .with_mime("application/octet-stream"),
            PolicyOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FileError::Validation(ref m) if m.contains("image/png") && m.contains("'raw'")
    ));
    assert!(app.stored_keys().await.is_empty());
}

async fn save_photo(
    app: &TestApp,
    width: u32,
    options: PolicyOptions,
) -> Result<FileRecord, FileError> {
    app.filer
        .save(
            "uploads",
            InMemoryFile::new("photo.jpg", create_test_jpeg(width, width)).with_mime("image/jpeg"),
            options,
        )
        .await
}

#[tokio::test]
async fn test_existing_key_needs_overwrite() {
    let app = setup_test_app();
    let first = save_photo(&app, 16, PolicyOptions::new()).await.unwrap();
    let err = save_photo(&app, 24, PolicyOptions::new()).await.unwrap_err();
    assert!(matches!(err, FileError::AlreadyExists(ref m) if m.contains("uploads://photo.jpg")));

    let stored = app.storage.read(&first.file_uri().unwrap()).await.unwrap();
    assert_eq!(content_hash(&stored), first.hash);

    let replaced = save_photo(&app, 24, PolicyOptions::new().with("overwrite", true))
        .await
        .unwrap();
    assert_eq!(replaced.uri, first.uri);
    assert_ne!(replaced.hash, first.hash);
    assert_eq!(app.stored_keys().await, vec!["photo.jpg"]);
}

#[tokio::test]
async fn test_path_option_dot_segments_are_dropped() {
    let app = setup_test_app();

    let record = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("photo.jpg", create_test_jpeg(16, 16)).with_mime("image/jpeg"),
            PolicyOptions::new().with("path", "./albums/."),
        )
        .await
        .unwrap();

    assert_eq!(record.uri, "uploads://albums/photo.jpg");
    assert_eq!(record.path, "albums/photo.jpg");
    assert_eq!(app.stored_keys().await, vec!["albums/photo.jpg"]);

    let err = app
        .filer
        .save(
            "uploads",
            InMemoryFile::new("photo.jpg", create_test_jpeg(16, 16)).with_mime("image/jpeg"),
            PolicyOptions::new().with("path", "albums/../.."),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::InvalidUri(_)));
}

#[tokio::test]
async fn test_upload_cap_stops_oversized_content() {
    let app = setup_with_upload_cap(1024);

    let reader = std::io::Cursor::new(vec![b'a'; 64 * 1024]);
    let err = app
        .filer
        .save(
            "uploads",
            StreamFile::new("huge.txt", reader).with_mime("text/plain"),
            PolicyOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::Validation(ref m) if m.contains("1024 byte upload limit")));

    // No declared size: the file on disk is measured before it is read
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload.tmp");
    let mut pdf = create_test_pdf();
    pdf.resize(4096, b' ');
    std::fs::write(&path, pdf).unwrap();
    let upload = UploadedFile {
        temp_path: path,
        client_name: "huge.pdf".to_string(),
        client_mime: Some("application/pdf".to_string()),
        client_size: None,
        error: None,
    };
    let err = app
        .filer
        .save("uploads", upload, PolicyOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FileError::Validation(ref m) if m.contains("huge.pdf")));

    assert!(app.stored_keys().await.is_empty());
}
