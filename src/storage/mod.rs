pub mod collection;
pub mod engine;
pub mod filter;
pub mod index;
pub mod memory;
pub mod options;
pub mod update;

pub use collection::Collection;
pub use engine::{CollectionInfo, CollectionOptions, DocumentStore, Namespace};
pub use index::{IndexOptions, IndexSpec, PRIMARY_INDEX_NAME};
pub use memory::MemoryStore;
pub use options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, SortDirection};
