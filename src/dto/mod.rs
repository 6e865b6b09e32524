pub mod generation_dto;
pub mod question_dto;
