pub(crate) mod catalog;
pub(crate) mod mock;
pub(crate) mod workers_ai;

pub use catalog::WorkersModelCatalog;
pub use mock::MockBackend;
pub use workers_ai::WorkersAiClient;
