use bytes::Bytes;
use gcs_share::ShareError;
use gcs_share::auth::{ADC_LOGIN_COMMAND, LOGIN_COMMAND};
use gcs_share::models::{AuthStatus, PublishRequest};
use gcs_share::storage::{ALL_USERS, Bucket, DEFAULT_LOCATION, DEFAULT_STORAGE_CLASS, PUBLIC_READ_ROLE};
use predicates::prelude::*;

use crate::memory_store::FOREIGN_BUCKET_MESSAGE;

#[tokio::test]
async fn publish_to_new_bucket_creates_it() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "region,total\neast,42\n");

    let request = PublishRequest::new(&path).bucket("demo-bucket");
    let result = env.manager().share_file_public(&request).await.unwrap();

    assert!(result.created_bucket);
    assert_eq!(result.bucket_name, "demo-bucket");
    assert_eq!(result.object_name, "report.csv");
    assert_eq!(
        result.public_url,
        "https://storage.googleapis.com/demo-bucket/report.csv"
    );
    assert_eq!(result.content_type, "text/csv");

    let bucket = env.store.bucket("demo-bucket").expect("bucket should exist");
    assert_eq!(bucket.location, DEFAULT_LOCATION);
    assert_eq!(bucket.storage_class, DEFAULT_STORAGE_CLASS);
    assert!(bucket.uniform_access_enabled());

    let policy = env.store.policy("demo-bucket").unwrap();
    assert!(policy.grants(PUBLIC_READ_ROLE, ALL_USERS));

    let object = env.store.object("demo-bucket", "report.csv").unwrap();
    assert_eq!(object.body, Bytes::from_static(b"region,total\neast,42\n"));
}

#[tokio::test]
async fn publish_twice_is_idempotent() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n1,2\n");
    let request = PublishRequest::new(&path).bucket("demo-bucket");

    let first = env.manager().share_file_public(&request).await.unwrap();
    let second = env.manager().share_file_public(&request).await.unwrap();

    assert!(first.created_bucket);
    assert!(!second.created_bucket);
    assert_eq!(first.public_url, second.public_url);
    assert_eq!(env.store.objects("demo-bucket"), vec!["report.csv"]);

    // The public grant is applied once, not duplicated.
    let policy = env.store.policy("demo-bucket").unwrap();
    assert_eq!(policy.bindings.len(), 1);
    assert_eq!(policy.bindings[0].members, vec![ALL_USERS]);
}

#[tokio::test]
async fn nested_destination_is_kept_verbatim() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");

    let request = PublishRequest::new(&path)
        .bucket("demo-bucket")
        .destination("reports/2024.csv");
    let result = env.manager().share_file_public(&request).await.unwrap();

    assert_eq!(result.object_name, "reports/2024.csv");
    assert_eq!(
        result.public_url,
        "https://storage.googleapis.com/demo-bucket/reports/2024.csv"
    );
    assert!(env.store.object("demo-bucket", "reports/2024.csv").is_some());
    assert!(env.store.object("demo-bucket", "2024.csv").is_none());
}

#[tokio::test]
async fn second_upload_overwrites_object() {
    let env = test_setup!();
    let path = env.write_file("notes.txt", "first draft");
    let request = PublishRequest::new(&path).bucket("demo-bucket");

    let first = env.manager().share_file_public(&request).await.unwrap();
    env.write_file("notes.txt", "final version");
    let second = env.manager().share_file_public(&request).await.unwrap();

    assert_eq!(first.public_url, second.public_url);
    let object = env.store.object("demo-bucket", "notes.txt").unwrap();
    assert_eq!(object.body, Bytes::from_static(b"final version"));
    assert_eq!(object.content_type, "text/plain");
}

#[tokio::test]
async fn upload_failure_leaves_created_bucket_behind() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");
    env.store.fail_uploads(true);

    let request = PublishRequest::new(&path).bucket("fresh-bucket");
    let err = env.manager().share_file_public(&request).await.unwrap_err();

    assert_eq!(err.kind(), "remote");
    assert_eq!(err.status(), Some(503));
    // No compensating delete.
    assert!(env.store.has_bucket("fresh-bucket"));
    assert!(env.store.objects("fresh-bucket").is_empty());
    assert!(!env.store.policy("fresh-bucket").unwrap().grants(PUBLIC_READ_ROLE, ALL_USERS));
}

#[tokio::test]
async fn missing_file_makes_no_remote_call() {
    let env = test_setup!();
    let missing = env.temp_dir.path().join("absent.csv");

    let request = PublishRequest::new(missing.to_string_lossy()).bucket("demo-bucket");
    let err = env.manager().share_file_public(&request).await.unwrap_err();

    assert!(matches!(err, ShareError::LocalFile { .. }), "{err:?}");
    assert_eq!(env.connector.connects(), 0);
    assert_eq!(env.store.calls(), 0);
    assert!(!env.store.has_bucket("demo-bucket"));
}

#[tokio::test]
async fn bucket_owned_elsewhere_is_a_remote_conflict() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");
    env.store.insert_foreign_bucket("taken-bucket");

    let request = PublishRequest::new(&path).bucket("taken-bucket");
    let err = env.manager().share_file_public(&request).await.unwrap_err();

    assert_eq!(err.kind(), "remote");
    assert_eq!(err.status(), Some(409));
    assert!(predicate::str::contains("is not available").eval(&err.to_string()));
    assert!(err.to_string().ends_with(FOREIGN_BUCKET_MESSAGE));
    assert!(env.store.objects("taken-bucket").is_empty());
}

#[tokio::test]
async fn bucket_created_concurrently_counts_as_existing() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");
    env.store.race_bucket_creation("racing-bucket");

    let request = PublishRequest::new(&path).bucket("racing-bucket");
    let result = env.manager().share_file_public(&request).await.unwrap();

    assert!(!result.created_bucket);
    assert!(env.store.object("racing-bucket", "report.csv").is_some());
    assert!(env.store.policy("racing-bucket").unwrap().grants(PUBLIC_READ_ROLE, ALL_USERS));
}

#[tokio::test]
async fn relative_segments_are_resolved_before_naming() {
    let env = test_setup!();
    env.write_file("data/report.csv", "a,b\n");
    env.write_file("data/nested/keep.txt", "x");
    let dotted = env
        .temp_dir
        .path()
        .join("data")
        .join("nested")
        .join("..")
        .join("report.csv");

    let request = PublishRequest::new(dotted.to_string_lossy()).bucket("demo-bucket");
    let result = env.manager().share_file_public(&request).await.unwrap();

    assert_eq!(result.object_name, "report.csv");
    assert_eq!(env.store.objects("demo-bucket"), vec!["report.csv"]);
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_error() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");
    env.store.reject_credentials(true);

    let request = PublishRequest::new(&path).bucket("demo-bucket");
    let err = env.manager().share_file_public(&request).await.unwrap_err();

    match err {
        ShareError::Auth { remediation, .. } => {
            assert!(remediation.iter().any(|s| s == LOGIN_COMMAND));
            assert!(remediation.iter().any(|s| s == ADC_LOGIN_COMMAND));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_listing_is_not_an_auth_failure() {
    let env = test_setup!();

    let buckets = env.manager().list_buckets().await.unwrap();
    assert!(buckets.is_empty());

    env.store.reject_credentials(true);
    let err = env.manager().list_buckets().await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn listing_follows_remote_order() {
    let env = test_setup!();
    for name in ["zulu-bucket", "alpha-bucket", "mike-bucket"] {
        env.store.insert_bucket(Bucket {
            name: name.to_string(),
            location: "EU".to_string(),
            storage_class: "NEARLINE".to_string(),
            iam_configuration: None,
        });
    }

    let first = env.manager().list_buckets().await.unwrap();
    let second = env.manager().list_buckets().await.unwrap();

    let names: Vec<_> = first.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["zulu-bucket", "alpha-bucket", "mike-bucket"]);
    assert_eq!(first, second);
    assert_eq!(first[0].storage_class, "NEARLINE");
}

#[tokio::test]
async fn check_auth_without_credentials_reports_remediation() {
    let env = test_setup!();

    let status = env
        .manager_with_status(AuthStatus::logged_out())
        .check_auth()
        .await
        .unwrap();

    assert!(!status.authenticated);
    assert!(status.remediation_steps.iter().any(|s| s == LOGIN_COMMAND));
    assert!(status.remediation_steps.iter().any(|s| s == ADC_LOGIN_COMMAND));
}
