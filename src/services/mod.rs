pub mod ai_service;
pub mod buffer_service;
pub mod context_service;
pub mod duplicate_detector;
pub mod duplicate_log_service;
pub mod embed_service;
pub mod question_generator;
pub mod question_service;
pub mod settings_service;
pub mod slot_history_service;
pub mod slot_sampler;
pub mod vector_index;

#[cfg(test)]
pub(crate) mod testing;
