pub mod fragment;
pub mod llm;
