use std::sync::Arc;

use crate::auth::JwtVerifier;
use crate::files::storage::ReportStorage;
use crate::questionnaire::orchestrator::Orchestrator;
use crate::store::AssessmentStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AssessmentStore>,
    /// Submission flow; owns the assessment client and the poll handle.
    pub orchestrator: Orchestrator,
    /// Uploaded report files. S3 when configured, local disk otherwise.
    pub reports: Arc<dyn ReportStorage>,
    pub auth: JwtVerifier,
}
