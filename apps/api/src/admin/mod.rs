// Staff views across all students: progress overview and report retrieval.

pub mod handlers;
