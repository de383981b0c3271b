mod common;

use common::{TestApp, seed_user, spawn_app, spawn_app_with};
use evidence_tracker::{
    AppConfig, MemoryStorage,
    models::{MessageResponse, NewEvidence, NewTask, Role},
    repository::NewProject,
};
use reqwest::multipart::{Form, Part};

/// Seeds a project owned by `owner_id` with one task, straight through the repository.
async fn seed_task(app: &TestApp, owner_id: i64) -> i64 {
    let project = app
        .repo
        .create_project(NewProject {
            name: "Storage".into(),
            description: None,
            status: "active".into(),
            priority: Some("Medium".into()),
            project_type: None,
            start_date: None,
            end_date: None,
            owner_id,
        })
        .await
        .unwrap();
    app.repo
        .create_task(NewTask {
            project_id: project.id,
            title: "Collect".into(),
            status: "pending".into(),
            ..NewTask::default()
        })
        .await
        .unwrap()
        .id
}

fn file_form() -> Form {
    Form::new().part(
        "file",
        Part::bytes(b"PCAP".to_vec())
            .file_name("capture.pcap")
            .mime_str("application/vnd.tcpdump.pcap")
            .unwrap(),
    )
}

#[tokio::test]
async fn test_upload_storage_failure_returns_500_without_record() {
    let app = spawn_app_with(AppConfig::default(), MemoryStorage::new_failing()).await;
    let owner = seed_user(&app, "owner", Role::Consultant).await;
    let task_id = seed_task(&app, owner.id).await;

    let response = reqwest::Client::new()
        .post(app.api(&format!("/tasks/{task_id}/evidence")))
        .header("x-user-id", owner.id.to_string())
        .multipart(file_form())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let err: MessageResponse = response.json().await.unwrap();
    assert_eq!(err.msg, "Storage backend failure");
    assert!(app.repo.list_evidence(task_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_of_missing_object_is_404() {
    let app = spawn_app().await;
    let owner = seed_user(&app, "owner", Role::Consultant).await;
    let task_id = seed_task(&app, owner.id).await;
    let evidence = app
        .repo
        .create_evidence(NewEvidence {
            project_task_id: task_id,
            uploaded_by_id: owner.id,
            file_name: "gone.txt".into(),
            storage_key: "evidence/task-1/missing.txt".into(),
            tool_type: None,
            notes: None,
            mime_type: None,
        })
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .get(app.api(&format!("/evidence/{}/download", evidence.id)))
        .header("x-user-id", owner.id.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let err: MessageResponse = response.json().await.unwrap();
    assert_eq!(err.msg, "Evidence file not found in storage");
}

#[tokio::test]
async fn test_delete_survives_storage_failure() {
    let app = spawn_app_with(AppConfig::default(), MemoryStorage::new_failing()).await;
    let owner = seed_user(&app, "owner", Role::Consultant).await;
    let task_id = seed_task(&app, owner.id).await;
    let evidence = app
        .repo
        .create_evidence(NewEvidence {
            project_task_id: task_id,
            uploaded_by_id: owner.id,
            file_name: "notes.txt".into(),
            storage_key: "evidence/task-1/notes.txt".into(),
            tool_type: None,
            notes: None,
            mime_type: Some("text/plain".into()),
        })
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .delete(app.api(&format!("/evidence/{}", evidence.id)))
        .header("x-user-id", owner.id.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: MessageResponse = response.json().await.unwrap();
    assert_eq!(body.msg, "Evidence deleted successfully");
    assert!(app.repo.get_evidence(evidence.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_upload_over_the_size_limit_is_rejected() {
    let config = AppConfig {
        max_upload_bytes: 1024,
        ..AppConfig::default()
    };
    let app = spawn_app_with(config, MemoryStorage::new()).await;
    let owner = seed_user(&app, "owner", Role::Consultant).await;
    let task_id = seed_task(&app, owner.id).await;

    let form = Form::new().part(
        "file",
        Part::bytes(vec![b'x'; 64 * 1024]).file_name("big.bin"),
    );
    let response = reqwest::Client::new()
        .post(app.api(&format!("/tasks/{task_id}/evidence")))
        .header("x-user-id", owner.id.to_string())
        .multipart(form)
        .send()
        .await;

    // The server may answer before the body is fully sent; either way nothing is stored.
    if let Ok(response) = response {
        assert!(response.status().is_client_error());
    }
    assert!(app.storage.is_empty());
    assert!(app.repo.list_evidence(task_id).await.unwrap().is_empty());
}
