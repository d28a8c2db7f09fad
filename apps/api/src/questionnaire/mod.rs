// Questionnaire submission, progress saving and report status.
// The orchestrator owns the flow; handlers only translate HTTP.

pub mod handlers;
pub mod orchestrator;
