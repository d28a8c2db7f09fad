pub mod marks;
pub mod poll_task;
pub mod questionnaire;
pub mod user;
