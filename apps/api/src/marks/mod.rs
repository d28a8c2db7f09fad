// Per-standard subject marks recorded by students.

pub mod handlers;
