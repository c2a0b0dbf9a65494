pub mod artifacts;
pub mod billing;
pub mod cta;
pub mod decay;
pub mod documents;
pub mod exercises;
pub mod llm_provider;
pub mod orbit;
