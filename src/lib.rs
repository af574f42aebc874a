pub mod analyzer;
pub mod config;
pub mod error;
pub mod events;
pub mod file_system;
pub mod generator;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod planner;
pub mod platform;
pub mod prompts;
pub mod session;
pub mod workspace;
