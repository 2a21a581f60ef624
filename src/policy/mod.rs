//! Row-level access policies.
//!
//! Policies are declared per table and operation and are permissive: an
//! operation on a row is allowed when any applicable policy holds for the
//! caller. With no applicable policy the answer is deny. Evaluation only
//! reads the caller and the row's own columns.

mod caller;

pub use caller::Caller;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Customer, Folder, File, Price, Product, Subscription, User, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Workspaces,
    Folders,
    Files,
    Users,
    Customers,
    Products,
    Prices,
    Subscriptions,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Workspaces => "workspaces",
            Self::Folders => "folders",
            Self::Files => "files",
            Self::Users => "users",
            Self::Customers => "customers",
            Self::Products => "products",
            Self::Prices => "prices",
            Self::Subscriptions => "subscriptions",
        }
    }

    /// Content tables carry no row-level security; their authorization
    /// belongs to the application layer above the store.
    pub const fn row_level_security(self) -> bool {
        match self {
            Self::Users | Self::Customers | Self::Products | Self::Prices | Self::Subscriptions => {
                true
            }
            Self::Workspaces | Self::Folders | Self::Files => false,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Identity-bearing columns a predicate may compare against the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Always,
    CallerMatches(Column),
}

impl Predicate {
    fn holds(self, caller: &Caller, row: &dyn PolicyRow) -> bool {
        match self {
            Self::Always => true,
            Self::CallerMatches(column) => match (caller.user_id(), row.column(column)) {
                (Some(uid), Some(value)) => uid == value,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Policy {
    pub name: &'static str,
    pub table: Table,
    pub operation: Operation,
    pub predicate: Predicate,
}

/// A row the policy engine can evaluate.
pub trait PolicyRow {
    fn table(&self) -> Table;

    /// Value of an identity column, if the row has one.
    fn column(&self, column: Column) -> Option<Uuid>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    /// The table has no row-level security; an outer layer decides.
    Delegated,
}

impl Decision {
    pub const fn is_permitted(self) -> bool {
        match self {
            Self::Allow | Self::Delegated => true,
            Self::Deny => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies }
    }

    /// The policies the platform ships with.
    pub fn standard() -> Self {
        Self::new(vec![
            Policy {
                name: "Everyone can view user data.",
                table: Table::Users,
                operation: Operation::Select,
                predicate: Predicate::Always,
            },
            Policy {
                name: "Can update own user data.",
                table: Table::Users,
                operation: Operation::Update,
                predicate: Predicate::CallerMatches(Column::Id),
            },
            Policy {
                name: "Allow public read-only access.",
                table: Table::Products,
                operation: Operation::Select,
                predicate: Predicate::Always,
            },
            Policy {
                name: "Allow public read-only access.",
                table: Table::Prices,
                operation: Operation::Select,
                predicate: Predicate::Always,
            },
            Policy {
                name: "Can only view own subs data.",
                table: Table::Subscriptions,
                operation: Operation::Select,
                predicate: Predicate::CallerMatches(Column::UserId),
            },
        ])
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn evaluate(&self, caller: &Caller, operation: Operation, row: &dyn PolicyRow) -> Decision {
        if caller.is_service() {
            return Decision::Allow;
        }

        let table = row.table();
        if !table.row_level_security() {
            return Decision::Delegated;
        }

        let granted = self
            .policies
            .iter()
            .filter(|p| p.table == table && p.operation == operation)
            .any(|p| p.predicate.holds(caller, row));

        if granted {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    /// Like [`PolicySet::evaluate`], but a deny becomes
    /// [`Error::AuthorizationDenied`].
    pub fn authorize(&self, caller: &Caller, operation: Operation, row: &dyn PolicyRow) -> Result<()> {
        let table = row.table();
        match self.evaluate(caller, operation, row) {
            Decision::Allow => Ok(()),
            Decision::Delegated => {
                tracing::trace!(%caller, %table, %operation, "access delegated to application layer");
                Ok(())
            }
            Decision::Deny => {
                tracing::debug!(%caller, %table, %operation, "access denied by row-level policy");
                Err(Error::denied(table, operation))
            }
        }
    }

    /// Keeps only the rows the caller may select.
    pub fn filter_visible<R: PolicyRow>(&self, caller: &Caller, rows: Vec<R>) -> Vec<R> {
        rows.into_iter()
            .filter(|row| self.evaluate(caller, Operation::Select, row).is_permitted())
            .collect()
    }
}

impl PolicyRow for Workspace {
    fn table(&self) -> Table {
        Table::Workspaces
    }

    fn column(&self, column: Column) -> Option<Uuid> {
        match column {
            Column::Id => Some(self.id),
            Column::UserId => Some(self.workspace_owner),
        }
    }
}

impl PolicyRow for Folder {
    fn table(&self) -> Table {
        Table::Folders
    }

    fn column(&self, column: Column) -> Option<Uuid> {
        match column {
            Column::Id => Some(self.id),
            Column::UserId => None,
        }
    }
}

impl PolicyRow for File {
    fn table(&self) -> Table {
        Table::Files
    }

    fn column(&self, column: Column) -> Option<Uuid> {
        match column {
            Column::Id => Some(self.id),
            Column::UserId => None,
        }
    }
}

impl PolicyRow for User {
    fn table(&self) -> Table {
        Table::Users
    }

    fn column(&self, column: Column) -> Option<Uuid> {
        match column {
            Column::Id => Some(self.id),
            Column::UserId => None,
        }
    }
}

impl PolicyRow for Customer {
    fn table(&self) -> Table {
        Table::Customers
    }

    fn column(&self, column: Column) -> Option<Uuid> {
        match column {
            Column::Id | Column::UserId => Some(self.id),
        }
    }
}

impl PolicyRow for Product {
    fn table(&self) -> Table {
        Table::Products
    }

    fn column(&self, _column: Column) -> Option<Uuid> {
        None
    }
}

impl PolicyRow for Price {
    fn table(&self) -> Table {
        Table::Prices
    }

    fn column(&self, _column: Column) -> Option<Uuid> {
        None
    }
}

impl PolicyRow for Subscription {
    fn table(&self) -> Table {
        Table::Subscriptions
    }

    fn column(&self, column: Column) -> Option<Uuid> {
        match column {
            Column::Id => None,
            Column::UserId => Some(self.user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{PricingType, SubscriptionStatus};

    fn subscription(user_id: Uuid) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: "sub_1".to_string(),
            user_id,
            status: SubscriptionStatus::Active,
            metadata: None,
            price_id: None,
            quantity: Some(1),
            cancel_at_period_end: false,
            created: now,
            current_period_start: now,
            current_period_end: now,
            ended_at: None,
            cancel_at: None,
            canceled_at: None,
            trial_start: None,
            trial_end: None,
        }
    }

    #[test]
    fn test_user_can_only_update_own_row() {
        let policies = PolicySet::standard();
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let other = User::new(u2);
        let own = User::new(u1);

        assert_eq!(
            policies.evaluate(&Caller::User(u1), Operation::Update, &other),
            Decision::Deny
        );
        assert_eq!(
            policies.evaluate(&Caller::User(u1), Operation::Update, &own),
            Decision::Allow
        );
    }

    #[test]
    fn test_user_profiles_are_publicly_readable() {
        let policies = PolicySet::standard();
        let row = User::new(Uuid::new_v4());

        assert!(policies.evaluate(&Caller::Anonymous, Operation::Select, &row).is_permitted());
        assert!(!policies.evaluate(&Caller::Anonymous, Operation::Update, &row).is_permitted());
    }

    #[test]
    fn test_subscription_select_requires_owner() {
        let policies = PolicySet::standard();
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let err = policies
            .authorize(&Caller::User(u1), Operation::Select, &subscription(u2))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::AuthorizationDenied {
                table: Table::Subscriptions,
                operation: Operation::Select
            }
        ));

        assert!(policies
            .authorize(&Caller::User(u1), Operation::Select, &subscription(u1))
            .is_ok());
    }

    #[test]
    fn test_subscription_writes_denied_to_owner() {
        let policies = PolicySet::standard();
        let u1 = Uuid::new_v4();
        let row = subscription(u1);

        for op in [Operation::Insert, Operation::Update, Operation::Delete] {
            assert_eq!(policies.evaluate(&Caller::User(u1), op, &row), Decision::Deny);
            assert_eq!(policies.evaluate(&Caller::Service, op, &row), Decision::Allow);
        }
    }

    #[test]
    fn test_catalog_is_public_and_read_only() {
        let policies = PolicySet::standard();
        let price = Price {
            id: "price_1".to_string(),
            product_id: "prod_1".to_string(),
            active: true,
            description: None,
            unit_amount: None,
            currency: "usd".to_string(),
            price_type: PricingType::OneTime,
            interval: None,
            interval_count: None,
            trial_period_days: None,
            metadata: None,
        };

        assert_eq!(
            policies.evaluate(&Caller::Anonymous, Operation::Select, &price),
            Decision::Allow
        );
        assert_eq!(
            policies.evaluate(&Caller::User(Uuid::new_v4()), Operation::Update, &price),
            Decision::Deny
        );
    }

    #[test]
    fn test_customers_have_no_public_policy() {
        let policies = PolicySet::standard();
        let id = Uuid::new_v4();
        let row = Customer {
            id,
            provider_customer_id: Some("cus_1".to_string()),
        };

        assert_eq!(policies.evaluate(&Caller::User(id), Operation::Select, &row), Decision::Deny);
    }

    #[test]
    fn test_content_tables_are_delegated() {
        let policies = PolicySet::standard();
        let ws = Workspace::new(Uuid::new_v4(), "Notes", "📝");

        assert_eq!(
            policies.evaluate(&Caller::Anonymous, Operation::Delete, &ws),
            Decision::Delegated
        );
        assert!(policies.authorize(&Caller::Anonymous, Operation::Delete, &ws).is_ok());
    }

    #[test]
    fn test_empty_policy_set_denies() {
        let policies = PolicySet::default();
        let row = User::new(Uuid::new_v4());
        assert_eq!(
            policies.evaluate(&Caller::User(row.id), Operation::Select, &row),
            Decision::Deny
        );
    }

    #[test]
    fn test_filter_visible_keeps_own_subscriptions() {
        let policies = PolicySet::standard();
        let u1 = Uuid::new_v4();
        let rows = vec![subscription(u1), subscription(Uuid::new_v4())];

        let visible = policies.filter_visible(&Caller::User(u1), rows);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].user_id, u1);
    }
}
