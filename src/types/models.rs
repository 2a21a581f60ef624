use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{PricingPlanInterval, PricingType, SubscriptionStatus};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub workspace_owner: Uuid,
    pub title: String,
    pub icon_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_trash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
}

impl Workspace {
    pub fn new(owner: Uuid, title: impl Into<String>, icon_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            workspace_owner: owner,
            title: title.into(),
            icon_id: icon_id.into(),
            data: None,
            in_trash: None,
            logo: None,
            banner_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub workspace_id: Uuid,
    pub title: String,
    pub icon_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_trash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
}

impl Folder {
    pub fn new(workspace_id: Uuid, title: impl Into<String>, icon_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            workspace_id,
            title: title.into(),
            icon_id: icon_id.into(),
            data: None,
            in_trash: None,
            banner_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub workspace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<Uuid>,
    pub title: String,
    pub icon_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_trash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
}

impl File {
    pub fn new(
        workspace_id: Uuid,
        folder_id: Option<Uuid>,
        title: impl Into<String>,
        icon_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            workspace_id,
            folder_id,
            title: title.into(),
            icon_id: icon_id.into(),
            data: None,
            in_trash: None,
            banner_url: None,
        }
    }
}

/// Addresses one node of a content tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContentRef {
    Workspace(Uuid),
    Folder(Uuid),
    File(Uuid),
}

/// Rows removed by a hard delete, including everything the cascade reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub workspaces: usize,
    pub folders: usize,
    pub files: usize,
}

impl CascadeReport {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.workspaces + self.folders + self.files
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: Folder,
    pub files: Vec<File>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceTree {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub folders: Vec<FolderNode>,
    /// Files placed directly in the workspace, outside any folder.
    pub files: Vec<File>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrashListing {
    /// The workspace itself, when it carries a trash marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
    pub folders: Vec<Folder>,
    pub files: Vec<File>,
}

/// Profile row keyed by the auth provider's subject id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            full_name: None,
            avatar_url: None,
            billing_address: None,
            updated_at: None,
            payment_method: None,
            email: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub product_id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<i64>,
    pub currency: String,
    #[serde(rename = "type")]
    pub price_type: PricingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<PricingPlanInterval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_period_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Price {
    /// Checks the invariants the schema enforces, so callers get a domain
    /// error before any SQL runs.
    pub fn validate(&self) -> Result<()> {
        if self.currency.chars().count() != 3 {
            return Err(Error::DomainConstraint(format!(
                "currency '{}' must be exactly 3 characters",
                self.currency
            )));
        }

        match self.price_type {
            PricingType::Recurring if self.interval.is_none() => {
                return Err(Error::DomainConstraint(format!(
                    "recurring price '{}' has no interval",
                    self.id
                )));
            }
            PricingType::Recurring | PricingType::OneTime => {}
        }

        if let Some(count) = self.interval_count {
            if count < 1 {
                return Err(Error::DomainConstraint(format!(
                    "interval_count must be at least 1, got {count}"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    pub cancel_at_period_end: bool,
    pub created: DateTime<Utc>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_end: Option<DateTime<Utc>>,
}

/// Subscription state as delivered by the payment provider. Period fields
/// left as `None` default to now on first insert and keep their stored value
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trial_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trial_end: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    pub fn new(id: impl Into<String>, user_id: Uuid, status: SubscriptionStatus) -> Self {
        Self {
            id: id.into(),
            user_id,
            status,
            metadata: None,
            price_id: None,
            quantity: None,
            cancel_at_period_end: false,
            created: None,
            current_period_start: None,
            current_period_end: None,
            ended_at: None,
            cancel_at: None,
            canceled_at: None,
            trial_start: None,
            trial_end: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(currency: &str, price_type: PricingType) -> Price {
        Price {
            id: "price_1".to_string(),
            product_id: "prod_1".to_string(),
            active: true,
            description: None,
            unit_amount: Some(1200),
            currency: currency.to_string(),
            price_type,
            interval: None,
            interval_count: None,
            trial_period_days: None,
            metadata: None,
        }
    }

    #[test]
    fn test_price_currency_must_be_three_chars() {
        assert!(price("usd", PricingType::OneTime).validate().is_ok());
        for bad in ["US", "usdt", ""] {
            let err = price(bad, PricingType::OneTime).validate().unwrap_err();
            assert!(matches!(err, Error::DomainConstraint(_)), "{bad}");
        }
    }

    #[test]
    fn test_recurring_price_needs_interval() {
        let mut p = price("eur", PricingType::Recurring);
        assert!(matches!(p.validate(), Err(Error::DomainConstraint(_))));

        p.interval = Some(PricingPlanInterval::Month);
        p.interval_count = Some(1);
        assert!(p.validate().is_ok());

        p.interval_count = Some(0);
        assert!(matches!(p.validate(), Err(Error::DomainConstraint(_))));
    }

    #[test]
    fn test_price_type_serializes_as_type() {
        let json = serde_json::to_value(price("gbp", PricingType::OneTime)).unwrap();
        assert_eq!(json["type"], "one_time");
        assert!(json.get("interval").is_none());
    }

    #[test]
    fn test_snapshot_deserializes_with_missing_periods() {
        let snapshot: SubscriptionSnapshot = serde_json::from_value(serde_json::json!({
            "id": "sub_123",
            "user_id": Uuid::nil(),
            "status": "past_due",
        }))
        .unwrap();
        assert_eq!(snapshot.status, SubscriptionStatus::PastDue);
        assert!(snapshot.current_period_start.is_none());
        assert!(!snapshot.cancel_at_period_end);
    }
}
