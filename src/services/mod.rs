pub mod grading_service;
pub mod notification_service;
pub mod question_selector;
pub mod session_engine;
pub mod session_store;
