//! End-to-end flows of the client layer against a live in-process server.

mod common;

use common::{PASSWORD, seed_login_user, seed_user, spawn_app};
use evidence_tracker::{
    auth::issue_token,
    client::{
        ApiClient, ClientError, CredentialStore, EvidenceActions, EvidenceUpload,
        FileCredentialStore, GuardDecision, ProjectActions, RequestTracker, RouteGuard,
        SessionProvider, ShowForRole, TaskActions, has_role,
    },
    models::{
        CreateProjectRequest, CreateTaskRequest, RegisterUserRequest, Role, UpdateEvidenceRequest,
    },
    policy,
};
use std::sync::Arc;

fn provider(api: &ApiClient, store: &Arc<FileCredentialStore>) -> SessionProvider {
    SessionProvider::new(Arc::new(api.clone()), store.clone())
}

#[tokio::test]
async fn test_login_populates_session_and_unlocks_guard() {
    let app = spawn_app().await;
    seed_login_user(&app, "testuser", Role::Consultant).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    let api = ApiClient::new(app.api_base());
    let sessions = provider(&api, &store);
    let guard = RouteGuard::default();

    // Nothing stored: no request, settles anonymous, protected views redirect.
    let session = sessions.initialize().await;
    assert!(!session.is_loading());
    assert!(!session.is_authenticated());
    let GuardDecision::Redirect(redirect) = guard.evaluate(&session, "/projects/7") else {
        panic!("expected a redirect to login");
    };

    let profile = sessions.login("testuser", PASSWORD).await.unwrap();
    assert_eq!(profile.username, "testuser");
    assert_eq!(profile.role, Some(Role::Consultant));

    let session = sessions.session();
    assert!(session.is_authenticated());
    assert!(has_role(&session, &[Role::Consultant]));
    assert!(!has_role(&session, &[Role::Admin]));
    assert_eq!(guard.evaluate(&session, "/projects/7"), GuardDecision::Authorized);
    assert_eq!(redirect.continue_to(), "/projects/7");

    // Persisted for the next start.
    assert!(store.load_token().unwrap().is_some());
    assert_eq!(store.load_user().unwrap(), Some(profile));
}

#[tokio::test]
async fn test_stored_session_is_restored_by_a_new_provider() {
    let app = spawn_app().await;
    seed_login_user(&app, "testuser", Role::ReadOnly).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let api = ApiClient::new(app.api_base());

    let first = provider(&api, &Arc::new(FileCredentialStore::new(&path)));
    first.login("testuser", PASSWORD).await.unwrap();

    let second = provider(&api, &Arc::new(FileCredentialStore::new(&path)));
    let mut updates = second.subscribe();
    assert!(updates.borrow().is_loading());

    let restored = second.initialize().await;
    assert!(restored.is_authenticated());
    assert_eq!(restored.role(), Some(Role::ReadOnly));
    assert_eq!(
        RouteGuard::default().resolve(&mut updates, "/projects").await,
        GuardDecision::Authorized
    );
}

#[tokio::test]
async fn test_stale_token_is_cleared_on_startup() {
    let app = spawn_app().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    // Signed correctly, but for an account that does not exist.
    store.save_token(&issue_token(&app.config, 4242).unwrap()).unwrap();

    let sessions = provider(&ApiClient::new(app.api_base()), &store);
    let session = sessions.initialize().await;

    assert!(!session.is_loading());
    assert!(!session.is_authenticated());
    assert_eq!(store.load_token().unwrap(), None);
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_failed_login_reports_server_message() {
    let app = spawn_app().await;
    seed_login_user(&app, "testuser", Role::Consultant).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    let sessions = provider(&ApiClient::new(app.api_base()), &store);
    sessions.initialize().await;

    let err = sessions.login("testuser", "wrong").await.unwrap_err();
    match &err {
        ClientError::Api { status, msg } => {
            assert_eq!(*status, 401);
            assert_eq!(msg, "Bad username or password");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!sessions.session().is_authenticated());
    assert_eq!(store.load_token().unwrap(), None);

    let err = sessions.login("", "x").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { field: "username" }));
}

#[tokio::test]
async fn test_logout_then_guard_redirects() {
    let app = spawn_app().await;
    seed_login_user(&app, "testuser", Role::Admin).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    let sessions = provider(&ApiClient::new(app.api_base()), &store);
    sessions.initialize().await;
    sessions.login("testuser", PASSWORD).await.unwrap();

    sessions.logout().unwrap();
    let session = sessions.session();
    assert!(!session.is_authenticated());
    assert!(matches!(
        RouteGuard::default().evaluate(&session, "/admin/users"),
        GuardDecision::Redirect(_)
    ));
    assert_eq!(store.load_token().unwrap(), None);
}

#[tokio::test]
async fn test_register_then_login_as_read_only() {
    let app = spawn_app().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    let api = ApiClient::new(app.api_base());

    let registered = api
        .register(&RegisterUserRequest {
            username: "fresh".into(),
            email: "fresh@example.com".into(),
            password: "hunter22".into(),
        })
        .await
        .unwrap();
    assert_eq!(registered.user.username, "fresh");

    let sessions = provider(&api, &store);
    sessions.initialize().await;
    sessions.login("fresh", "hunter22").await.unwrap();
    let session = sessions.session();

    let create_project = ShowForRole::new(policy::CREATOR_ROLES);
    assert_eq!(create_project.render(&session, || "Create Project"), None);

    // The server agrees with the hidden button.
    let err = api
        .authorized(sessions.token().unwrap())
        .create_project(&CreateProjectRequest {
            name: "Sneaky".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_project_actions_follow_ownership() {
    let app = spawn_app().await;
    let owner = seed_login_user(&app, "owner", Role::Consultant).await;
    seed_login_user(&app, "other", Role::Consultant).await;
    let api = ApiClient::new(app.api_base());
    let dir = tempfile::tempdir().unwrap();

    let owner_store = Arc::new(FileCredentialStore::new(dir.path().join("owner.json")));
    let owner_sessions = provider(&api, &owner_store);
    owner_sessions.login("owner", PASSWORD).await.unwrap();
    let owner_api = api.authorized(owner_sessions.token().unwrap());
    let project = owner_api
        .create_project(&CreateProjectRequest {
            name: "Acme external".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(project.owner_id, owner.id);
    assert!(ProjectActions::for_project(&owner_sessions.session(), &project).create_task);

    let other_store = Arc::new(FileCredentialStore::new(dir.path().join("other.json")));
    let other_sessions = provider(&api, &other_store);
    other_sessions.login("other", PASSWORD).await.unwrap();
    assert_eq!(
        ProjectActions::for_project(&other_sessions.session(), &project),
        ProjectActions::default()
    );

    let err = api
        .authorized(other_sessions.token().unwrap())
        .create_task(project.id, &CreateTaskRequest {
            title: "Not mine".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_evidence_verification_round_trip() {
    let app = spawn_app().await;
    seed_login_user(&app, "owner", Role::Consultant).await;
    let worker = seed_user(&app, "worker", Role::Consultant).await;
    let api = ApiClient::new(app.api_base());
    let dir = tempfile::tempdir().unwrap();
    let sessions = provider(&api, &Arc::new(FileCredentialStore::new(dir.path().join("c.json"))));
    sessions.login("owner", PASSWORD).await.unwrap();
    let session = sessions.session();
    let owner_api = api.authorized(sessions.token().unwrap());

    let project = owner_api
        .create_project(&CreateProjectRequest {
            name: "Internal".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let task = owner_api
        .create_task(project.id, &CreateTaskRequest {
            title: "Port scan".into(),
            assigned_to_id: Some(worker.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let actions = TaskActions::for_task(&session, &project, &task);
    assert!(actions.edit_all_fields && actions.upload_evidence);

    let evidence = owner_api
        .add_evidence(task.id, EvidenceUpload {
            file_name: "nmap.xml".into(),
            bytes: b"<nmaprun/>".to_vec(),
            mime_type: Some("application/xml".into()),
            notes: Some("full TCP".into()),
            tool_type: Some("nmap".into()),
        })
        .await
        .unwrap();
    assert!(!evidence.verified);
    assert!(EvidenceActions::for_evidence(&session, &project, &evidence).verify);

    // A list load tracked per view; only the latest result applies.
    let tracker = RequestTracker::new();
    let submit = tracker.try_begin().unwrap();
    let updated = owner_api
        .update_evidence(evidence.id, &UpdateEvidenceRequest {
            verified: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    let updated = submit.finish(updated).expect("view still active");
    assert!(updated.verified);
    assert_eq!(updated.notes.as_deref(), Some("full TCP"));

    let load = tracker.begin();
    let listed = load.finish(owner_api.task_evidence(task.id).await.unwrap()).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].verified);

    assert_eq!(owner_api.download_evidence(evidence.id).await.unwrap(), b"<nmaprun/>");

    let err = owner_api
        .add_evidence(task.id, EvidenceUpload::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation { field: "file" }));
}

#[tokio::test]
async fn test_refresh_after_role_change() {
    let app = spawn_app().await;
    let user = seed_login_user(&app, "testuser", Role::ReadOnly).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    let sessions = provider(&ApiClient::new(app.api_base()), &store);
    sessions.login("testuser", PASSWORD).await.unwrap();
    assert!(!has_role(&sessions.session(), policy::CREATOR_ROLES));

    app.repo.set_user_role(user.id, Role::Consultant).await.unwrap();
    let profile = sessions.refresh_profile().await.unwrap();
    assert_eq!(profile.role, Some(Role::Consultant));
    assert!(has_role(&sessions.session(), policy::CREATOR_ROLES));
    assert_eq!(store.load_user().unwrap().and_then(|u| u.role), Some(Role::Consultant));
}

#[tokio::test]
async fn test_whitespace_password_is_sent_as_typed() {
    let app = spawn_app().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path().join("credentials.json")));
    let api = ApiClient::new(app.api_base());

    // The server only refuses an empty password, so the client must not trim either.
    api.register(&RegisterUserRequest {
        username: "spacey".into(),
        email: "spacey@example.com".into(),
        password: "   ".into(),
    })
    .await
    .unwrap();

    let sessions = provider(&api, &store);
    let profile = sessions.login("spacey", "   ").await.unwrap();
    assert_eq!(profile.username, "spacey");
    assert!(sessions.session().is_authenticated());
}
