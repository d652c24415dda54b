//! Integration tests for the S3 site client against a mock S3 endpoint.
//!
//! These tests use wiremock to stand in for a MinIO site.

use bytes::Bytes;
use reversion_core::{
    Error, ListVersionsRequest, PurgeMode, SiteClient, SiteConfig, VersionBody, OCTET_STREAM,
};
use reversion_s3::S3SiteClient;
use wiremock::matchers::{
    body_string, header, header_regex, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a client pointed at the mock server.
fn client_for(server: &MockServer, purge_mode: PurgeMode) -> S3SiteClient {
    let config = SiteConfig {
        endpoint: server.uri(),
        access_key: "minio".to_string(),
        secret_key: "minio123".to_string(),
        purge_mode,
        ..Default::default()
    };
    S3SiteClient::new(&config).unwrap()
}

fn version_xml(key: &str, version_id: &str, last_modified: &str, size: u64) -> String {
    format!(
        "<Version><Key>{key}</Key><VersionId>{version_id}</VersionId>\
         <IsLatest>false</IsLatest><LastModified>{last_modified}</LastModified>\
         <ETag>&quot;{version_id}&quot;</ETag><Size>{size}</Size>\
         <StorageClass>STANDARD</StorageClass></Version>"
    )
}

fn listing(entries: &[String], next: Option<(&str, &str)>) -> String {
    let truncated = match next {
        Some((key, version)) => format!(
            "<IsTruncated>true</IsTruncated><NextKeyMarker>{key}</NextKeyMarker>\
             <NextVersionIdMarker>{version}</NextVersionIdMarker>"
        ),
        None => "<IsTruncated>false</IsTruncated>".to_string(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListVersionsResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>photos</Name><Prefix>cat.png</Prefix>{truncated}{}</ListVersionsResult>",
        entries.concat()
    )
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_list_versions_sends_versioned_recursive_query() {
    let server = MockServer::start().await;
    let body = listing(
        &[
            version_xml("cat.png", "v2", "2024-02-01T00:00:00.000Z", 20),
            version_xml("cat.png", "v1", "2024-01-01T00:00:00.000Z", 10),
        ],
        None,
    );

    Mock::given(method("GET"))
        .and(path("/photos"))
        .and(query_param("versions", ""))
        .and(query_param("prefix", "cat.png"))
        .and(query_param("metadata", "true"))
        .and(query_param_is_missing("delimiter"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let page = client
        .list_versions(&ListVersionsRequest::for_object("photos", "cat.png"), None)
        .await
        .unwrap();

    assert!(page.next.is_none());
    let ids: Vec<_> = page.entries.into_iter().map(|e| e.unwrap().version_id).collect();
    assert_eq!(ids, vec!["v2", "v1"]);
}

#[tokio::test]
async fn test_list_versions_follows_markers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/photos"))
        .and(query_param_is_missing("key-marker"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(
            &[version_xml("cat.png", "v3", "2024-03-01T00:00:00Z", 3)],
            Some(("cat.png", "v3")),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/photos"))
        .and(query_param("key-marker", "cat.png"))
        .and(query_param("version-id-marker", "v3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(
            &[version_xml("cat.png", "v2", "2024-02-01T00:00:00Z", 2)],
            None,
        )))
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let request = ListVersionsRequest::for_object("photos", "cat.png");

    let first = client.list_versions(&request, None).await.unwrap();
    let next = first.next.expect("first page is truncated");
    assert_eq!(next.key_marker, "cat.png");
    assert_eq!(next.version_id_marker.as_deref(), Some("v3"));

    let second = client.list_versions(&request, Some(&next)).await.unwrap();
    assert!(second.next.is_none());
    assert_eq!(second.entries[0].as_ref().unwrap().version_id, "v2");
}

#[tokio::test]
async fn test_truncated_listing_without_marker_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListVersionsResult><IsTruncated>true</IsTruncated></ListVersionsResult>",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let err = client
        .list_versions(&ListVersionsRequest::for_object("photos", "cat.png"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
}

#[tokio::test]
async fn test_requests_are_signed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos"))
        .and(header_regex(
            "authorization",
            r"^AWS4-HMAC-SHA256 Credential=minio/\d{8}/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature=[0-9a-f]{64}$",
        ))
        .and(header_regex("x-amz-date", r"^\d{8}T\d{6}Z$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[], None)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let page = client
        .list_versions(&ListVersionsRequest::for_object("photos", "cat.png"), None)
        .await
        .unwrap();
    assert!(page.entries.is_empty());
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_error_document_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>NoSuchBucket</Code>\
             <Message>The specified bucket does not exist</Message>\
             <Resource>/photos</Resource></Error>",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let err = client
        .list_versions(&ListVersionsRequest::for_object("photos", "cat.png"), None)
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(404));
    assert_eq!(err.s3_error_code(), Some("NoSuchBucket"));
    assert_eq!(err.to_string(), "NoSuchBucket: The specified bucket does not exist");
}

#[tokio::test]
async fn test_error_without_document_uses_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let err = client.delete_object_force("photos", "cat.png").await.unwrap_err();
    assert_eq!(err.http_status(), Some(500));
    assert_eq!(err.s3_error_code(), Some("InternalServerError"));
}

// =============================================================================
// Object transfer
// =============================================================================

#[tokio::test]
async fn test_get_version_streams_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/albums/cat%20one.png"))
        .and(query_param("versionId", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"meow meow".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let body = client.get_version("photos", "albums/cat one.png", "v1").await.unwrap();
    assert_eq!(body.size(), 9);
    assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"meow meow"));
}

#[tokio::test]
async fn test_put_version_streams_with_length() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/photos/cat.png"))
        .and(header("content-type", OCTET_STREAM))
        .and(header("content-length", "5"))
        .and(header("x-amz-content-sha256", "UNSIGNED-PAYLOAD"))
        .and(body_string("hello"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"5d41402abc4b2a76b9719d911017c592\"")
                .insert_header("x-amz-version-id", "v-new"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    let output = client
        .put_version(
            "photos",
            "cat.png",
            VersionBody::from_bytes(Bytes::from_static(b"hello")),
            OCTET_STREAM,
        )
        .await
        .unwrap();

    assert_eq!(output.etag.as_deref(), Some("\"5d41402abc4b2a76b9719d911017c592\""));
    assert_eq!(output.version_id.as_deref(), Some("v-new"));
}

// =============================================================================
// Purge
// =============================================================================

#[tokio::test]
async fn test_minio_purge_sends_force_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/photos/cat.png"))
        .and(header("x-minio-force-delete", "true"))
        .and(query_param_is_missing("versionId"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    client.delete_object_force("photos", "cat.png").await.unwrap();
}

#[tokio::test]
async fn test_versions_purge_deletes_each_version_of_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos"))
        .and(query_param("versions", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(
            &[
                version_xml("cat.png", "v2", "2024-02-01T00:00:00Z", 2),
                version_xml("cat.png", "v1", "2024-01-01T00:00:00Z", 1),
                version_xml("cat.png.bak", "other", "2024-01-01T00:00:00Z", 1),
            ],
            None,
        )))
        .mount(&server)
        .await;
    for version_id in ["v1", "v2"] {
        Mock::given(method("DELETE"))
            .and(path("/photos/cat.png"))
            .and(query_param("versionId", version_id))
            .and(header("x-amz-bypass-governance-retention", "true"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("DELETE"))
        .and(path("/photos/cat.png.bak"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Versions);
    client.delete_object_force("photos", "cat.png").await.unwrap();
}

#[tokio::test]
async fn test_dot_segment_keys_are_never_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos"))
        .and(query_param("versions", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(
            &[version_xml("logs/../cat.png", "v1", "2024-01-01T00:00:00Z", 1)],
            None,
        )))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    for mode in [PurgeMode::Minio, PurgeMode::Versions] {
        let client = client_for(&server, mode);
        let err = client.delete_object_force("photos", "logs/../cat.png").await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)), "{mode:?}: {err}");
    }
}

#[tokio::test]
async fn test_dots_inside_a_segment_keep_their_path() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/photos/logs/..cat.png"))
        .and(header("x-minio-force-delete", "true"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, PurgeMode::Minio);
    client.delete_object_force("photos", "logs/..cat.png").await.unwrap();
}
