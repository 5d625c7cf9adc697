pub mod config;
pub mod decision;
pub mod llm;
pub mod normalize;
pub mod orchestrator;
pub mod summary;
