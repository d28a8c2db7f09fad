use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::admin;
use crate::files::{self, MAX_UPLOAD_BYTES};
use crate::marks;
use crate::questionnaire::handlers;
use crate::state::AppState;

/// GET /health (unauthenticated)
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "career-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn build_router(state: AppState) -> Router {
    let questionnaire_routes = Router::new()
        .route("/submit-answers", post(handlers::handle_submit_answers))
        .route("/report-status", get(handlers::handle_report_status))
        .route("/get-answers", get(handlers::handle_get_answers))
        .route("/save-progress", post(handlers::handle_save_progress))
        .route(
            "/poll-tasks/:task_id",
            delete(handlers::handle_revoke_poll),
        );

    let marks_routes = Router::new()
        .route("/marks", get(marks::handlers::handle_list_marks))
        .route("/bulk", post(marks::handlers::handle_bulk_marks));

    let files_routes = Router::new()
        .route(
            "/upload-report/:user_id",
            // Multipart framing on top of the file itself.
            post(files::handlers::handle_upload_report)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route(
            "/download/:file_path",
            get(files::handlers::handle_download),
        );

    let admin_routes = Router::new()
        .route("/students", get(admin::handlers::handle_list_students))
        .route(
            "/download-report/:report_path",
            get(admin::handlers::handle_download_report),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api/questionnaire", questionnaire_routes)
        .nest("/api/marks", marks_routes)
        .nest("/api/files", files_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::{sign_test_token, JwtVerifier};
    use crate::files::storage::DiskStorage;
    use crate::models::user::UserStatus;
    use crate::questionnaire::orchestrator::tests::{orchestrator, FakeService};
    use crate::store::memory::MemoryStore;
    use crate::store::AssessmentStore;

    const SECRET: &str = "test-secret";

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        _uploads: TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let uploads = tempfile::tempdir().unwrap();
            let state = AppState {
                store: store.clone(),
                orchestrator: orchestrator(store.clone(), Arc::new(FakeService::default())),
                reports: Arc::new(DiskStorage::new(uploads.path()).unwrap()),
                auth: JwtVerifier::new(SECRET),
            };
            Self {
                app: build_router(state),
                store,
                _uploads: uploads,
            }
        }

        async fn student(&self) -> (Uuid, String) {
            let id = self.store.add_user("Asha", "Rao").await;
            (id, sign_test_token(SECRET, id, 3600))
        }

        async fn send(&self, req: Request<Body>) -> Response {
            self.app.clone().oneshot(req).await.unwrap()
        }
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn multipart_request(uri: &str, token: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn submission() -> Value {
        json!({ "answers": [
            { "questionId": "q1", "answer": "Often" },
            { "questionId": "q2", "answer": 3 }
        ]})
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let h = Harness::new().await;
        let resp = h.send(get_request("/health", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_401_and_bad_token_is_403() {
        let h = Harness::new().await;
        let resp = h
            .send(get_request("/api/questionnaire/report-status", None))
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = h
            .send(get_request(
                "/api/questionnaire/report-status",
                Some("not-a-jwt"),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_report_status_defaults_to_pending() {
        let h = Harness::new().await;
        let (_, token) = h.student().await;
        let resp = h
            .send(get_request(
                "/api/questionnaire/report-status",
                Some(&token),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "status": "Pending", "reportPath": null })
        );
    }

    #[tokio::test]
    async fn test_submit_accepts_then_rejects_duplicate() {
        let h = Harness::new().await;
        let (user_id, token) = h.student().await;

        let resp = h
            .send(json_request(
                "POST",
                "/api/questionnaire/submit-answers",
                Some(&token),
                submission(),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(
            body_json(resp).await["message"],
            "Report generation started"
        );
        assert_eq!(h.store.user_status(user_id).await, UserStatus::Analyzing);

        let resp = h
            .send(get_request(
                "/api/questionnaire/report-status",
                Some(&token),
            ))
            .await;
        assert_eq!(body_json(resp).await["status"], "Analyzing");

        let resp = h
            .send(json_request(
                "POST",
                "/api/questionnaire/submit-answers",
                Some(&token),
                submission(),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_submit_without_answers_is_400() {
        let h = Harness::new().await;
        let (user_id, token) = h.student().await;
        let resp = h
            .send(json_request(
                "POST",
                "/api/questionnaire/submit-answers",
                Some(&token),
                json!({}),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.store.user_status(user_id).await, UserStatus::Pending);
    }

    #[tokio::test]
    async fn test_save_progress_then_get_answers() {
        let h = Harness::new().await;
        let (_, token) = h.student().await;

        let resp = h
            .send(get_request("/api/questionnaire/get-answers", Some(&token)))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = h
            .send(json_request(
                "POST",
                "/api/questionnaire/save-progress",
                Some(&token),
                json!({ "currentQuestion": 3, "answers": { "q1": "Often", "q2": 3 } }),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = h
            .send(get_request("/api/questionnaire/get-answers", Some(&token)))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["currentQuestion"], 3);
        assert_eq!(body["answers"], json!({ "q1": "Often", "q2": 3 }));
        assert_eq!(body["completed"], false);
    }

    #[tokio::test]
    async fn test_revoke_poll_task() {
        let h = Harness::new().await;
        let (user_id, token) = h.student().await;
        h.send(json_request(
            "POST",
            "/api/questionnaire/submit-answers",
            Some(&token),
            submission(),
        ))
        .await;

        let resp = h
            .send(json_request(
                "DELETE",
                "/api/questionnaire/poll-tasks/task-1",
                Some(&token),
                json!({}),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["revoked"], true);
        assert_eq!(h.store.user_status(user_id).await, UserStatus::Error);

        let resp = h
            .send(json_request(
                "DELETE",
                "/api/questionnaire/poll-tasks/unknown",
                Some(&token),
                json!({}),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_marks_bulk_upsert_replaces_subjects() {
        let h = Harness::new().await;
        let (_, token) = h.student().await;

        let first = json!([
            { "standard": 9, "subjects": [{ "name": "Maths", "marks": 81 }] },
            { "standard": 10, "subjects": [{ "name": "Maths", "marks": 77 }] }
        ]);
        let resp = h
            .send(json_request("POST", "/api/marks/bulk", Some(&token), first))
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let update = json!([{ "standard": 10, "subjects": [{ "name": "Maths", "marks": 90 }] }]);
        h.send(json_request("POST", "/api/marks/bulk", Some(&token), update))
            .await;

        let resp = h.send(get_request("/api/marks/marks", Some(&token))).await;
        let body = body_json(resp).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["standard"], 9);
        assert_eq!(rows[1]["subjects"][0]["marks"], 90);

        let bad = json!([{ "standard": 8, "subjects": "Maths" }]);
        let resp = h
            .send(json_request("POST", "/api/marks/bulk", Some(&token), bad))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_then_owner_only_download() {
        let h = Harness::new().await;
        let (student_id, student_token) = h.student().await;
        let (_, other_token) = h.student().await;

        let resp = h
            .send(multipart_request(
                &format!("/api/files/upload-report/{student_id}"),
                &other_token,
                "virus.exe",
                b"MZ",
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = h
            .send(multipart_request(
                "/api/files/upload-report/not-a-uuid",
                &other_token,
                "report.pdf",
                b"%PDF",
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = h
            .send(multipart_request(
                &format!("/api/files/upload-report/{student_id}"),
                &other_token,
                "Final Report.pdf",
                b"%PDF-1.7 body",
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["report"]["fileName"], "Final Report.pdf");
        let stored = body["report"]["filePath"].as_str().unwrap().to_string();
        assert!(stored.ends_with("-Final_Report.pdf"));

        let user = h.store.get_user(student_id).await.unwrap().unwrap();
        assert_eq!(user.status(), UserStatus::ReportGenerated);
        assert_eq!(user.report_path.as_deref(), Some(stored.as_str()));

        let uri = format!("/api/files/download/{stored}");
        let resp = h.send(get_request(&uri, Some(&other_token))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = h.send(get_request(&uri, Some(&student_token))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn test_upload_for_unknown_student_is_404() {
        let h = Harness::new().await;
        let (_, token) = h.student().await;
        let resp = h
            .send(multipart_request(
                &format!("/api/files/upload-report/{}", Uuid::new_v4()),
                &token,
                "report.pdf",
                b"%PDF",
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_uploads_are_413() {
        let h = Harness::new().await;
        let (student_id, token) = h.student().await;
        let uri = format!("/api/files/upload-report/{student_id}");

        for size in [MAX_UPLOAD_BYTES + 1, 11 * 1024 * 1024] {
            let data = vec![b'a'; size];
            let resp = h
                .send(multipart_request(&uri, &token, "big.pdf", &data))
                .await;
            assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE, "size {size}");
            assert_eq!(
                body_json(resp).await["error"]["code"],
                "PAYLOAD_TOO_LARGE"
            );
        }

        let user = h.store.get_user(student_id).await.unwrap().unwrap();
        assert!(user.report_path.is_none());
    }

    #[tokio::test]
    async fn test_admin_lists_students_with_status() {
        let h = Harness::new().await;
        let (student_id, token) = h.student().await;
        h.send(json_request(
            "POST",
            "/api/questionnaire/submit-answers",
            Some(&token),
            submission(),
        ))
        .await;
        let (other_id, _) = h.student().await;

        let resp = h.send(get_request("/api/admin/students", None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = h
            .send(get_request("/api/admin/students", Some(&token)))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);

        let find = |id: Uuid| {
            rows.iter()
                .find(|r| r["id"] == id.to_string())
                .unwrap()
                .clone()
        };
        let submitted = find(student_id);
        assert_eq!(submitted["status"], "Analyzing");
        assert_eq!(submitted["firstName"], "Asha");
        assert_eq!(submitted["standard"], "10");
        assert!(submitted["reportPath"].is_null());
        assert_eq!(find(other_id)["status"], "Pending");
    }

    #[tokio::test]
    async fn test_admin_downloads_any_known_report() {
        let h = Harness::new().await;
        let (student_id, _) = h.student().await;
        let (_, staff_token) = h.student().await;

        let resp = h
            .send(multipart_request(
                &format!("/api/files/upload-report/{student_id}"),
                &staff_token,
                "career.pdf",
                b"%PDF-report",
            ))
            .await;
        let stored = body_json(resp).await["report"]["filePath"]
            .as_str()
            .unwrap()
            .to_string();

        // Owner-only route refuses, the staff route serves it.
        let resp = h
            .send(get_request(
                &format!("/api/files/download/{stored}"),
                Some(&staff_token),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = h
            .send(get_request(
                &format!("/api/admin/download-report/{stored}"),
                Some(&staff_token),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment"));
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-report");

        let resp = h
            .send(get_request(
                "/api/admin/download-report/not-attached.pdf",
                Some(&staff_token),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
