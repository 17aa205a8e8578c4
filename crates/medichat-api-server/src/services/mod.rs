pub mod clinic_locator;
pub mod conversation;
pub mod embedding_service;
pub mod geo_service;
pub mod knowledge_service;
pub mod llm_service;
pub mod query_classifier;
pub mod symptom_checker;

pub use clinic_locator::ClinicLocator;
pub use conversation::ConversationManager;
pub use embedding_service::EmbeddingService;
pub use geo_service::GeoService;
pub use knowledge_service::KnowledgeService;
pub use llm_service::LlmService;
pub use symptom_checker::SymptomChecker;
