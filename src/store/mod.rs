mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use uuid::Uuid;

use crate::error::Result;
use crate::policy::Caller;
use crate::types::*;

/// Store defines the database interface. Every call names the caller it
/// runs as; row-level policies are checked inside the same transaction as
/// the read or write they guard.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Workspace operations
    fn create_workspace(&self, caller: &Caller, ws: &Workspace) -> Result<()>;
    fn get_workspace(&self, caller: &Caller, id: Uuid) -> Result<Option<Workspace>>;
    fn list_workspaces(&self, caller: &Caller, owner: Uuid) -> Result<Vec<Workspace>>;
    fn update_workspace(&self, caller: &Caller, ws: &Workspace) -> Result<()>;
    fn delete_workspace(&self, caller: &Caller, id: Uuid) -> Result<CascadeReport>;
    fn workspace_tree(&self, caller: &Caller, id: Uuid) -> Result<WorkspaceTree>;

    // Folder operations
    fn create_folder(&self, caller: &Caller, folder: &Folder) -> Result<()>;
    fn get_folder(&self, caller: &Caller, id: Uuid) -> Result<Option<Folder>>;
    fn list_folders(&self, caller: &Caller, workspace_id: Uuid) -> Result<Vec<Folder>>;
    fn update_folder(&self, caller: &Caller, folder: &Folder) -> Result<()>;
    fn delete_folder(&self, caller: &Caller, id: Uuid) -> Result<CascadeReport>;

    // File operations
    fn create_file(&self, caller: &Caller, file: &File) -> Result<()>;
    fn get_file(&self, caller: &Caller, id: Uuid) -> Result<Option<File>>;
    /// Lists a workspace's files. `folder_id` narrows to one folder.
    fn list_files(
        &self,
        caller: &Caller,
        workspace_id: Uuid,
        folder_id: Option<Uuid>,
    ) -> Result<Vec<File>>;
    fn update_file(&self, caller: &Caller, file: &File) -> Result<()>;
    fn delete_file(&self, caller: &Caller, id: Uuid) -> Result<CascadeReport>;

    // Trash (soft delete)
    fn set_trash(&self, caller: &Caller, node: ContentRef, marker: Option<&str>) -> Result<()>;
    /// Trashed folders and files of a workspace, plus the workspace itself
    /// when it is trashed.
    fn list_trash(&self, caller: &Caller, workspace_id: Uuid) -> Result<TrashListing>;

    // User operations
    fn create_user(&self, caller: &Caller, user: &User) -> Result<()>;
    fn get_user(&self, caller: &Caller, id: Uuid) -> Result<Option<User>>;
    fn list_users(&self, caller: &Caller) -> Result<Vec<User>>;
    fn update_user(&self, caller: &Caller, user: &User) -> Result<()>;

    // Customer operations
    fn upsert_customer(&self, caller: &Caller, customer: &Customer) -> Result<()>;
    fn get_customer(&self, caller: &Caller, id: Uuid) -> Result<Option<Customer>>;

    // Catalog operations
    fn upsert_product(&self, caller: &Caller, product: &Product) -> Result<()>;
    fn get_product(&self, caller: &Caller, id: &str) -> Result<Option<Product>>;
    fn list_products(&self, caller: &Caller, active_only: bool) -> Result<Vec<Product>>;
    fn delete_product(&self, caller: &Caller, id: &str) -> Result<bool>;
    fn upsert_price(&self, caller: &Caller, price: &Price) -> Result<()>;
    fn get_price(&self, caller: &Caller, id: &str) -> Result<Option<Price>>;
    fn list_prices(&self, caller: &Caller, product_id: &str) -> Result<Vec<Price>>;

    // Subscription operations
    fn upsert_subscription(&self, caller: &Caller, snapshot: &SubscriptionSnapshot) -> Result<Subscription>;
    fn get_subscription(&self, caller: &Caller, id: &str) -> Result<Option<Subscription>>;
    fn list_subscriptions(&self, caller: &Caller, user_id: Uuid) -> Result<Vec<Subscription>>;
    /// The user's newest subscription that is trialing or active.
    fn active_subscription(&self, caller: &Caller, user_id: Uuid) -> Result<Option<Subscription>>;

    fn close(&self) -> Result<()>;
}
