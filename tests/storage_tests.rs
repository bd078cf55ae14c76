use axum::body::Bytes;
use wanderlust::storage::{MockStorageService, S3StorageClient, StorageService, sanitize_key};

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_upload_records_key() {
        let mock = MockStorageService::new();
        let image = mock
            .upload_object("wanderlust/abc.png", "image/png", Bytes::from_static(b"png"))
            .await
            .unwrap();

        assert_eq!(image.filename.as_deref(), Some("wanderlust/abc.png"));
        assert_eq!(image.url, mock.object_url("wanderlust/abc.png"));
        assert_eq!(mock.uploaded_keys(), vec!["wanderlust/abc.png"]);
    }

    #[tokio::test]
    async fn test_mock_clones_share_uploads() {
        let mock = MockStorageService::new();
        let handle = mock.clone();
        handle
            .upload_object("wanderlust/a.jpg", "image/jpeg", Bytes::new())
            .await
            .unwrap();

        assert_eq!(mock.uploaded_keys().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        let result = mock
            .upload_object("wanderlust/a.png", "image/png", Bytes::new())
            .await;

        assert!(result.is_err());
        assert!(mock.uploaded_keys().is_empty());
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        let image = mock
            .upload_object("../../etc/passwd", "text/plain", Bytes::new())
            .await
            .unwrap();

        assert!(!image.url.contains(".."));
        assert_eq!(image.filename.as_deref(), Some("etc/passwd"));
    }
}

#[test]
fn test_sanitize_key_drops_navigation_and_empty_segments() {
    assert_eq!(sanitize_key("wanderlust//./a.png"), "wanderlust/a.png");
    assert_eq!(sanitize_key("/../wanderlust/../b.jpg"), "wanderlust/b.jpg");
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_object_url_uses_public_base() {
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "admin",
            "password",
            "wanderlust",
            "http://localhost:9000/wanderlust/",
        )
        .await;

        // No request is made; the URL is derived from configuration only.
        assert_eq!(
            client.object_url("wanderlust/abc.png"),
            "http://localhost:9000/wanderlust/wanderlust/abc.png"
        );
    }
}
