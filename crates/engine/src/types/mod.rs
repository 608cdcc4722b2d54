//! Core data types.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Field`] | One schema column |
//! | [`Dataset`] | A published dataset and its lifecycle [`DatasetStatus`] |
//! | [`DatasetPatch`] | Changes requested by a caller |
//! | [`DatasetUpdate`] | The `$set`/`$unset` document a patch resolves to |
//! | [`TileRequest`] | A request for one map tile |
//! | [`SearchQuery`] / [`SearchResponse`] | Search engine input and output |
//! | [`PageCursor`] | Opaque stable pagination cursor |

mod dataset;
mod field;
mod pagination;
mod patch;
mod search;
mod tile;

pub use dataset::{
    Dataset, DatasetStatus, DraftReason, Extension, FileInfo, IndexedStorage, NO_RETRY_PREFIX,
    Owner, Projection, Publication, PublicationStatus, RemoteFile, RestConfig, StorageInfo,
    UserRef, VirtualConfig,
};
pub use field::{Capabilities, ConceptRef, Field, FieldType, ValidationRules};
pub use pagination::{CursorValue, PageCursor};
pub use patch::{DatasetPatch, DatasetUpdate, Uploads};
pub use search::{SearchHit, SearchQuery, SearchResponse, SortField, TIEBREAK_KEY};
pub use tile::{DEFAULT_TILE_SORT, SamplingMode, TileRequest};
