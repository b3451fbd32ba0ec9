pub mod attendance;
pub mod classes;
pub mod core;
pub mod drafts;
pub mod grades;
pub mod gradesheet;
pub mod setup;
pub mod students;
