//! Integration tests for the store through the public API.

use folio::error::Error;
use folio::policy::{Caller, Operation, Table};
use folio::store::{SqliteStore, Store};
use folio::types::*;
use tempfile::TempDir;
use uuid::Uuid;

struct TestContext {
    _temp: TempDir,
    store: SqliteStore,
}

impl TestContext {
    fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        let store = SqliteStore::new(temp.path().join("folio.db")).expect("failed to open store");
        store.initialize().expect("failed to apply schema");
        Self { _temp: temp, store }
    }

    fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .create_user(&Caller::Service, &User::new(id))
            .expect("failed to create user");
        id
    }

    fn count(&self, table: &str) -> i64 {
        self.store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count failed")
    }
}

#[test]
fn deleting_workspace_removes_folders_and_files() {
    let ctx = TestContext::new();
    let owner = ctx.user();
    let caller = Caller::User(owner);

    let w1 = Workspace::new(owner, "W1", "📓");
    ctx.store.create_workspace(&caller, &w1).unwrap();
    let f1 = Folder::new(w1.id, "F1", "📁");
    ctx.store.create_folder(&caller, &f1).unwrap();
    let x1 = File::new(w1.id, Some(f1.id), "X1", "📄");
    ctx.store.create_file(&caller, &x1).unwrap();

    let report = ctx.store.delete_workspace(&caller, w1.id).unwrap();
    assert_eq!(report.total(), 3);

    assert!(ctx.store.get_workspace(&caller, w1.id).unwrap().is_none());
    assert!(ctx.store.get_folder(&caller, f1.id).unwrap().is_none());
    assert!(ctx.store.get_file(&caller, x1.id).unwrap().is_none());
    assert!(ctx.store.list_workspaces(&caller, owner).unwrap().is_empty());
}

#[test]
fn deleting_folder_keeps_workspace_and_sibling_files() {
    let ctx = TestContext::new();
    let caller = Caller::User(ctx.user());

    let ws = Workspace::new(Uuid::new_v4(), "W", "w");
    ctx.store.create_workspace(&caller, &ws).unwrap();
    let folder = Folder::new(ws.id, "F", "f");
    ctx.store.create_folder(&caller, &folder).unwrap();
    ctx.store
        .create_file(&caller, &File::new(ws.id, Some(folder.id), "in folder", "x"))
        .unwrap();
    let outside = File::new(ws.id, None, "outside", "x");
    ctx.store.create_file(&caller, &outside).unwrap();

    ctx.store.delete_folder(&caller, folder.id).unwrap();

    assert!(ctx.store.get_workspace(&caller, ws.id).unwrap().is_some());
    let remaining = ctx.store.list_files(&caller, ws.id, None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, outside.id);
}

#[test]
fn folder_with_unknown_workspace_is_rejected() {
    let ctx = TestContext::new();

    let err = ctx
        .store
        .create_folder(&Caller::Service, &Folder::new(Uuid::new_v4(), "F", "f"))
        .unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity { .. }));
    assert_eq!(ctx.count("folders"), 0);
}

#[test]
fn two_letter_currency_is_rejected() {
    let ctx = TestContext::new();

    let product = Product {
        id: "prod_team".to_string(),
        active: true,
        name: Some("Team".to_string()),
        description: None,
        image: None,
        metadata: None,
    };
    ctx.store.upsert_product(&Caller::Service, &product).unwrap();

    let price = Price {
        id: "price_team".to_string(),
        product_id: product.id.clone(),
        active: true,
        description: None,
        unit_amount: Some(900),
        currency: "US".to_string(),
        price_type: PricingType::OneTime,
        interval: None,
        interval_count: None,
        trial_period_days: None,
        metadata: None,
    };
    let err = ctx.store.upsert_price(&Caller::Service, &price).unwrap_err();
    assert!(matches!(err, Error::DomainConstraint(_)));
    assert_eq!(ctx.count("prices"), 0);
}

#[test]
fn users_update_only_their_own_profile() {
    let ctx = TestContext::new();
    let u1 = ctx.user();
    let u2 = ctx.user();

    let mut target = User::new(u2);
    target.full_name = Some("Not yours".to_string());
    let err = ctx.store.update_user(&Caller::User(u1), &target).unwrap_err();
    assert!(matches!(
        err,
        Error::AuthorizationDenied {
            table: Table::Users,
            operation: Operation::Update
        }
    ));

    // Everyone may read profiles.
    assert_eq!(ctx.store.list_users(&Caller::Anonymous).unwrap().len(), 2);
}

#[test]
fn subscriptions_are_visible_to_their_owner_only() {
    let ctx = TestContext::new();
    let u1 = ctx.user();
    let u2 = ctx.user();

    let snapshot = SubscriptionSnapshot::new("sub_u2", u2, SubscriptionStatus::Active);
    ctx.store
        .upsert_subscription(&Caller::Service, &snapshot)
        .unwrap();

    let err = ctx
        .store
        .get_subscription(&Caller::User(u1), "sub_u2")
        .unwrap_err();
    assert!(matches!(err, Error::AuthorizationDenied { .. }));

    let own = ctx
        .store
        .active_subscription(&Caller::User(u2), u2)
        .unwrap()
        .expect("subscription visible to owner");
    assert_eq!(own.id, "sub_u2");
    assert!(ctx.store.active_subscription(&Caller::User(u1), u2).unwrap().is_none());
}

#[test]
fn unknown_subscription_status_cannot_be_stored() {
    let ctx = TestContext::new();
    let user = ctx.user();

    let result = ctx.store.connection().execute(
        "INSERT INTO subscriptions (id, user_id, status) VALUES ('sub_bad', ?1, 'paused')",
        [user.to_string()],
    );
    assert!(result.is_err());
    assert_eq!(ctx.count("subscriptions"), 0);

    let parsed: Result<SubscriptionStatus, _> = "paused".parse();
    assert!(matches!(parsed, Err(Error::DomainConstraint(_))));
}

#[test]
fn store_reopens_with_existing_data() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("folio.db");
    let ws = Workspace::new(Uuid::new_v4(), "Persistent", "p");

    {
        let store = SqliteStore::new(&path).unwrap();
        store.initialize().unwrap();
        store.create_workspace(&Caller::Service, &ws).unwrap();
        store.close().unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    store.initialize().unwrap();
    let fetched = store.get_workspace(&Caller::Service, ws.id).unwrap().unwrap();
    assert_eq!(fetched.title, "Persistent");
    assert_eq!(fetched.created_at.timestamp(), ws.created_at.timestamp());
}

#[test]
fn failed_cascade_leaves_tree_untouched() {
    let ctx = TestContext::new();
    let caller = Caller::Service;

    let ws = Workspace::new(Uuid::new_v4(), "W", "w");
    ctx.store.create_workspace(&caller, &ws).unwrap();
    let folder = Folder::new(ws.id, "F", "f");
    ctx.store.create_folder(&caller, &folder).unwrap();
    ctx.store
        .create_file(&caller, &File::new(ws.id, Some(folder.id), "first", "x"))
        .unwrap();
    let pinned = File::new(ws.id, Some(folder.id), "pinned", "x");
    ctx.store.create_file(&caller, &pinned).unwrap();

    ctx.store
        .connection()
        .execute_batch(&format!(
            "CREATE TRIGGER keep_pinned BEFORE DELETE ON files
             WHEN OLD.id = '{}'
             BEGIN SELECT RAISE(ABORT, 'pinned file'); END;",
            pinned.id
        ))
        .unwrap();

    let err = ctx.store.delete_workspace(&caller, ws.id).unwrap_err();
    assert!(matches!(err, Error::CascadeFailure(_)));
    let err = ctx.store.delete_folder(&caller, folder.id).unwrap_err();
    assert!(matches!(err, Error::CascadeFailure(_)));

    assert_eq!(ctx.count("workspaces"), 1);
    assert_eq!(ctx.count("folders"), 1);
    assert_eq!(ctx.count("files"), 2);
    let tree = ctx.store.workspace_tree(&caller, ws.id).unwrap();
    assert_eq!(tree.folders[0].files.len(), 2);
}
