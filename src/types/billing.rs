use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stores an enum as its snake_case label and rejects unknown labels on the
/// way back in.
macro_rules! sql_label {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    OneTime,
    Recurring,
}

impl PricingType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Recurring => "recurring",
        }
    }
}

impl FromStr for PricingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time" => Ok(Self::OneTime),
            "recurring" => Ok(Self::Recurring),
            other => Err(Error::DomainConstraint(format!(
                "unknown pricing type '{other}'"
            ))),
        }
    }
}

sql_label!(PricingType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingPlanInterval {
    Day,
    Week,
    Month,
    Year,
}

impl PricingPlanInterval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl FromStr for PricingPlanInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(Error::DomainConstraint(format!(
                "unknown pricing plan interval '{other}'"
            ))),
        }
    }
}

sql_label!(PricingPlanInterval);

/// Subscription lifecycle state as last reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Unpaid,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 7] = [
        Self::Trialing,
        Self::Active,
        Self::Canceled,
        Self::Incomplete,
        Self::IncompleteExpired,
        Self::PastDue,
        Self::Unpaid,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
        }
    }

    /// Returns true while the subscriber is entitled to the plan.
    #[must_use]
    pub const fn is_live(self) -> bool {
        match self {
            Self::Trialing | Self::Active => true,
            Self::Canceled
            | Self::Incomplete
            | Self::IncompleteExpired
            | Self::PastDue
            | Self::Unpaid => false,
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::DomainConstraint(format!("unknown subscription status '{s}'")))
    }
}

sql_label!(SubscriptionStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_parse_back() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_domain_error() {
        let err = "paused".parse::<SubscriptionStatus>().unwrap_err();
        assert!(matches!(err, Error::DomainConstraint(_)));
    }

    #[test]
    fn test_live_statuses() {
        let live: Vec<_> = SubscriptionStatus::ALL
            .into_iter()
            .filter(|s| s.is_live())
            .collect();
        assert_eq!(live, vec![SubscriptionStatus::Trialing, SubscriptionStatus::Active]);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::IncompleteExpired).unwrap();
        assert_eq!(json, "\"incomplete_expired\"");
        assert_eq!(
            serde_json::from_str::<PricingType>("\"one_time\"").unwrap(),
            PricingType::OneTime
        );
        assert!(serde_json::from_str::<PricingPlanInterval>("\"fortnight\"").is_err());
    }
}
