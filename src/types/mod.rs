mod billing;
mod models;

pub use billing::{PricingPlanInterval, PricingType, SubscriptionStatus};
pub use models::*;
