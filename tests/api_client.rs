use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docflow_cli::api::{ApiClient, DownloadError, PollError, Submission, TaskApi};
use docflow_cli::controller::{Controller, Outcome};
use docflow_cli::progress::{ProgressInfo, TaskId};
use docflow_cli::selection::FileSelection;
use docflow_cli::ui::TerminalView;
use docflow_cli::workflow::Workflow;
use serde_json::json;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Debug, Clone, PartialEq)]
struct ReceivedPart {
    field: String,
    file_name: Option<String>,
    body: Vec<u8>,
}

#[derive(Default)]
struct ServerState {
    parts: Mutex<Vec<ReceivedPart>>,
    polls: Mutex<u32>,
}

async fn create_merge(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_owned);
        let body = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        state.parts.lock().unwrap().push(ReceivedPart {
            field: field_name,
            file_name,
            body,
        });
    }
    (StatusCode::ACCEPTED, Json(json!({ "task_id": "t-1" }))).into_response()
}

async fn create_extract() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn progress(State(state): State<Arc<ServerState>>, Path(task_id): Path<String>) -> Response {
    if task_id == "bare" {
        return Json(json!({ "pct": 5 })).into_response();
    }
    if task_id != "t-1" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "task not found" }))).into_response();
    }
    let mut polls = state.polls.lock().unwrap();
    *polls += 1;
    let body = if *polls == 1 {
        json!({ "status": "processing", "pct": 40 })
    } else {
        json!({ "status": "done", "pct": 100, "pdf": "/tmp/out.pdf", "unpaired": [] })
    };
    Json(body).into_response()
}

async fn download(Path(task_id): Path<String>) -> Response {
    match task_id.as_str() {
        "t-1" => (
            [(header::CONTENT_DISPOSITION, "attachment; filename=merged.pdf")],
            "%PDF-test",
        )
            .into_response(),
        "busy" => (StatusCode::CONFLICT, Json(json!({ "error": "not ready" }))).into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "task not found" }))).into_response(),
    }
}

fn spawn_server(state: Arc<ServerState>) -> (String, Runtime) {
    let app = Router::new()
        .route("/api/merge", post(create_merge))
        .route("/api/extract", post(create_extract))
        .route("/api/progress/:task_id", get(progress))
        .route("/api/download/:task_id", get(download))
        .with_state(state);

    let rt = Runtime::new().expect("runtime");
    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    rt.spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), rt)
}

fn invoice_folder(root: &std::path::Path) -> std::path::PathBuf {
    let folder = root.join("invoices");
    fs::create_dir_all(folder.join("march")).unwrap();
    fs::write(folder.join("a.pdf"), b"invoice-a").unwrap();
    fs::write(folder.join("march").join("a.png"), b"shot").unwrap();
    folder
}

#[test]
fn merge_run_uploads_polls_and_saves_the_result() {
    let state = Arc::new(ServerState::default());
    let (url, _rt) = spawn_server(state.clone());
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let selection = FileSelection::from_folder(&invoice_folder(input.path())).unwrap();

    let api = ApiClient::new(&url, output.path()).unwrap();
    let mut controller = Controller::new(Workflow::Merge, &api, TerminalView::new(Workflow::Merge))
        .with_poll_interval(Duration::from_millis(10))
        .with_inv_ratio(Some(0.5));
    let outcome = controller.run(&selection);

    let saved = output.path().join("merged.pdf");
    assert_eq!(
        outcome,
        Outcome::Completed {
            task_id: TaskId::new("t-1"),
            saved_to: saved.clone(),
        }
    );
    assert_eq!(fs::read(&saved).unwrap(), b"%PDF-test");
    assert_eq!(*state.polls.lock().unwrap(), 2);

    let parts = state.parts.lock().unwrap().clone();
    let files: Vec<(Option<String>, Vec<u8>)> = parts
        .iter()
        .filter(|p| p.field == "files")
        .map(|p| (p.file_name.clone(), p.body.clone()))
        .collect();
    assert_eq!(
        files,
        vec![
            (Some("invoices/a.pdf".to_string()), b"invoice-a".to_vec()),
            (Some("invoices/march/a.png".to_string()), b"shot".to_vec()),
        ]
    );
    let ratio = parts.iter().find(|p| p.field == "inv_ratio").unwrap();
    assert_eq!(ratio.body, b"0.5");
}

#[test]
fn rejected_submission_reports_the_status_text() {
    let state = Arc::new(ServerState::default());
    let (url, _rt) = spawn_server(state.clone());
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let selection = FileSelection::from_folder(&invoice_folder(input.path())).unwrap();

    let api = ApiClient::new(&url, output.path()).unwrap();
    let mut controller =
        Controller::new(Workflow::Extract, &api, TerminalView::new(Workflow::Extract));
    let outcome = controller.run(&selection);

    assert_eq!(outcome, Outcome::SubmitFailed("上传失败：Internal Server Error".into()));
    assert!(!controller.is_polling());
    assert_eq!(*state.polls.lock().unwrap(), 0);
}

#[test]
fn progress_and_download_errors() {
    let (url, _rt) = spawn_server(Arc::new(ServerState::default()));
    let output = tempfile::tempdir().unwrap();
    let api = ApiClient::new(&url, output.path()).unwrap();

    let err = api.progress(&TaskId::new("missing")).unwrap_err();
    assert!(matches!(err, PollError::Status(404)));

    let err = api
        .download(Workflow::Merge, &TaskId::new("busy"))
        .unwrap_err();
    match err {
        DownloadError::Status { code, message } => {
            assert_eq!(code, 409);
            assert_eq!(message, "not ready");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn first_poll_decodes_processing() {
    let (url, _rt) = spawn_server(Arc::new(ServerState::default()));
    let api = ApiClient::new(&url, ".").unwrap();
    let info = api.progress(&TaskId::new("t-1")).unwrap();
    assert_eq!(info, ProgressInfo::Processing { pct: Some(40) });
}

#[test]
fn unreachable_server_is_a_network_error() {
    let output = tempfile::tempdir().unwrap();
    let input = tempfile::tempdir().unwrap();
    let selection = FileSelection::from_folder(&invoice_folder(input.path())).unwrap();
    let api = ApiClient::new("http://127.0.0.1:9", output.path()).unwrap();

    let mut controller = Controller::new(Workflow::Merge, &api, TerminalView::new(Workflow::Merge));
    assert_eq!(
        controller.run(&selection),
        Outcome::SubmitFailed("网络错误，上传失败。".into())
    );
}

#[test]
fn large_folder_uploads_every_file() {
    let state = Arc::new(ServerState::default());
    let (url, _rt) = spawn_server(state.clone());
    let input = tempfile::tempdir().unwrap();
    let folder = input.path().join("invoices");
    fs::create_dir(&folder).unwrap();
    for i in 0..400 {
        fs::write(folder.join(format!("f{i:04}.pdf")), b"x").unwrap();
    }
    let selection = FileSelection::from_folder(&folder).unwrap();

    let api = ApiClient::new(&url, input.path()).unwrap();
    let submission = Submission {
        workflow: Workflow::Merge,
        selection: &selection,
        inv_ratio: None,
    };
    let task_id = api.submit(&submission, Arc::new(|_: u64, _: u64| {})).unwrap();

    assert_eq!(task_id, TaskId::new("t-1"));
    let parts = state.parts.lock().unwrap();
    assert_eq!(parts.len(), 400);
    assert_eq!(parts[0].file_name.as_deref(), Some("invoices/f0000.pdf"));
    assert_eq!(parts[399].file_name.as_deref(), Some("invoices/f0399.pdf"));
    assert!(parts.iter().all(|p| p.body == b"x"));
}

#[test]
fn progress_body_without_status_keeps_polling() {
    let (url, _rt) = spawn_server(Arc::new(ServerState::default()));
    let api = ApiClient::new(&url, ".").unwrap();
    let info = api.progress(&TaskId::new("bare")).unwrap();
    assert_eq!(info, ProgressInfo::Unknown);
}
