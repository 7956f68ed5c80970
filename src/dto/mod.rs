pub mod quiz_dto;
pub mod webhook_dto;
