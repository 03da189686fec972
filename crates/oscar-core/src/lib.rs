pub mod autocomplete;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod fuzzy;
pub mod origin;
pub mod pipeline;
pub mod range;
pub mod resolver;
pub mod runtime;
pub mod specifier;

pub use autocomplete::{AutocompleteResolver, Completion};
pub use cache::{BuildCache, BuildStrategy, CacheKey, StorageLayout};
pub use dispatch::{ImportDispatcher, ImportRequest, Reply, ServeOptions};
pub use error::{FetchError, MetadataError, OscarError, ResolveError, StorageError, ToolError};
pub use origin::Origin;
pub use pipeline::{BundlePipeline, ExternalRule, ExternalizationPolicy, TranspilePipeline};
pub use range::VersionRange;
pub use resolver::{Resolution, VersionResolver};
pub use specifier::PackageSpecifier;
