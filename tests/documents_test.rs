//! Document extraction end to end
//!
//! [`DocumentExtractor`] talks to a real proxy listener, which forwards to a
//! `wiremock` converter.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aihuman::documents::{DocumentExtractor, DocumentKind};
use aihuman::error::SessionError;
use aihuman::server::router;

mod common;

/// Serves the proxy on an ephemeral port and returns its base URL
async fn spawn_proxy(api_base: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = router(api_base).expect("router");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_docx_upload_becomes_clean_knowledge_base() {
    let converter = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/get-docx-content"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "data": "  Lesson 1\n\n  Fractions\tand   decimals  "
        })))
        .expect(1)
        .mount(&converter)
        .await;

    let proxy = spawn_proxy(&converter.uri()).await;
    let (_dir, file) = common::temp_file("lesson.docx", b"PK fake docx");

    let extractor = DocumentExtractor::new(&proxy, "user-token").unwrap();
    let text = extractor.extract_file(&file).await.unwrap();
    assert_eq!(text, "Lesson 1 Fractions and decimals");

    let config = common::session_config().with_knowledge_base(text.clone());
    assert_eq!(config.knowledge_base, text);
    assert_eq!(config.avatar_id, common::session_config().avatar_id);
}

#[tokio::test]
async fn test_pdf_content_field() {
    let converter = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/get-pdf-content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "Page one"})))
        .mount(&converter)
        .await;

    let proxy = spawn_proxy(&converter.uri()).await;
    let extractor = DocumentExtractor::new(&proxy, "user-token").unwrap();
    let text = extractor
        .extract(DocumentKind::Pdf, "page.pdf", b"%PDF".to_vec())
        .await
        .unwrap();
    assert_eq!(text, "Page one");
}

#[tokio::test]
async fn test_converter_failure_surfaces_status() {
    let converter = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/get-pdf-content"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "corrupt"})))
        .mount(&converter)
        .await;

    let proxy = spawn_proxy(&converter.uri()).await;
    let extractor = DocumentExtractor::new(&proxy, "user-token").unwrap();
    let err = extractor
        .extract(DocumentKind::Pdf, "broken.pdf", b"%PDF".to_vec())
        .await
        .unwrap_err();

    match err.downcast_ref::<SessionError>() {
        Some(SessionError::DocumentProcessing { status, details }) => {
            assert_eq!(*status, 500);
            assert!(details.contains("File processing failed"));
            assert!(details.contains("corrupt"));
        }
        other => panic!("expected DocumentProcessing, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_extension_is_rejected_locally() {
    let (_dir, file) = common::temp_file("sheet.xlsx", b"binary");
    let extractor = DocumentExtractor::new("http://127.0.0.1:9", "user-token").unwrap();

    let err = extractor.extract_file(&file).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::DocumentProcessing { status: 400, .. })
    ));
}
