pub mod effects;
pub mod memory;
pub mod mocks;
pub mod notices;
pub mod orchestrator;

pub use effects::EffectDispatcher;
pub use memory::InMemoryTripStore;
pub use orchestrator::LifecycleOrchestrator;
