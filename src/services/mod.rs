pub mod auth_service;
pub mod chat_service;
pub mod doc_edit_service;
pub mod membership_service;
pub mod presence_service;
