//! Seams to the outside world.
//!
//! Every external collaborator the pipeline talks to sits behind one of these
//! traits so that the resolver, cache and pipelines can be wired with real
//! network clients in the server and with in-memory doubles in tests.

pub mod fetch;
pub mod memory;
pub mod metadata;
pub mod storage;
pub mod tools;

pub use fetch::ModuleFetcher;
pub use metadata::{MetadataSource, ModuleFile, PackagePage, PackageVersionRecord, VersionPage};
pub use storage::{OriginStorage, StoredObject};
pub use tools::{Bundler, SourceSyntax, Transpiler};
