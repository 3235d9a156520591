//! Voxbridge Core Library
//!
//! Transport-free conversation logic shared by the voice services: streaming
//! sentence segmentation, the utterance-completeness heuristic that decides
//! when a speaker has finished talking, bounded summarized conversation
//! memory, and the LLM client abstraction.

pub mod completeness;
pub mod llm_client;
pub mod memory;
pub mod segmenter;
