//! Synchronization engine for a creator profile editor.
//!
//! A profile is a set of scalar fields plus three ordered child
//! collections (wallet methods, social links, goals). Editors submit
//! partial updates; the engine applies them optimistically to a local
//! draft, persists each touched part with the strategy that part needs,
//! and reloads the canonical state afterwards.

pub mod config;
pub mod db_connection;
pub mod draft_store;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod media;
pub mod memory_gateway;
pub mod model;
pub mod postgres_gateway;
pub mod reconciler;
pub mod records;
pub mod refresh;
pub mod session;
pub mod strategy;
pub mod transform;
pub mod update;
pub mod yaml_parser;

pub use config::{SyncConfig, TableNames};
pub use draft_store::{DraftSnapshot, DraftStore};
pub use error::{FaultKind, SyncError, Target, ValidationFault};
pub use gateway::PersistenceGateway;
pub use identity::{normalize_platform, Platform};
pub use media::{ImageKind, ImageUploader, MemoryImageStore};
pub use memory_gateway::MemoryGateway;
pub use model::{
    Collection, CollectionItems, Goal, OwnerId, ProfileDraft, ProfileFields, ProfileFieldsPatch,
    SectionVisibility, SocialLink, WalletDetails, WalletKind, WalletMethod,
};
pub use postgres_gateway::PostgresGateway;
pub use reconciler::{CollectionResult, FieldsResult, Reconciler, SyncReport, UpdateOutcome};
pub use refresh::{CanonicalProfile, RefreshLoader};
pub use session::{ImageSlot, ProfileSession, SyncState};
pub use strategy::SyncStrategy;
pub use update::ProfileUpdate;
pub use yaml_parser::{parse_config_file, parse_config_string, parse_update_file, parse_update_string};
