pub mod catalog;
pub mod convert;
pub mod fetch;
pub mod publish;
pub mod staging;

pub use catalog::{ConfigResolver, ModelCatalog, ModelConfig, ModelSource};
pub use convert::{CommandConverter, Converter};
pub use fetch::{DirectFetcher, HttpTransport, SnapshotFetcher, Transport};
pub use publish::{is_model_downloaded, list_models, ModelStatus, Publisher};
pub use staging::StagingDir;
