//! # Folio
//!
//! Persistent data model for a workspace/document platform: a content tree
//! of workspaces, folders and files, a subscription billing catalog, and the
//! row-level access policies guarding user and billing data. Usable both as
//! a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! folio = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use folio::policy::Caller;
//! use folio::store::{SqliteStore, Store};
//! use folio::types::{Folder, Workspace};
//!
//! let store = SqliteStore::new("./data/folio.db")?;
//! store.initialize()?;
//!
//! let caller = Caller::User(owner_id);
//! let ws = Workspace::new(owner_id, "Notes", "📝");
//! store.create_workspace(&caller, &ws)?;
//! store.create_folder(&caller, &Folder::new(ws.id, "Drafts", "📁"))?;
//!
//! // Removes the workspace with every folder and file under it.
//! let report = store.delete_workspace(&caller, ws.id)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod store;
pub mod types;
