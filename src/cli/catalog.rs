use serde::Serialize;

use super::init_store;
use crate::config::StoreConfig;
use crate::policy::Caller;
use crate::store::Store;
use crate::types::{Price, PricingType, Product};

#[derive(Serialize)]
struct CatalogEntry {
    #[serde(flatten)]
    product: Product,
    prices: Vec<Price>,
}

fn format_amount(price: &Price) -> String {
    let currency = price.currency.to_uppercase();
    match price.unit_amount {
        Some(amount) => {
            let sign = if amount < 0 { "-" } else { "" };
            let minor = amount.unsigned_abs();
            format!("{currency} {sign}{}.{:02}", minor / 100, minor % 100)
        }
        None => format!("{currency} (custom)"),
    }
}

fn format_price(price: &Price) -> String {
    let amount = format_amount(price);
    let cadence = match (price.price_type, price.interval) {
        (PricingType::OneTime, _) => "one time".to_string(),
        (PricingType::Recurring, Some(interval)) => match price.interval_count {
            Some(n) if n > 1 => format!("every {n} {interval}s"),
            _ => format!("per {interval}"),
        },
        (PricingType::Recurring, None) => "recurring".to_string(),
    };

    let mut line = format!("{amount} {cadence}");
    if let Some(days) = price.trial_period_days {
        line.push_str(&format!(", {days} day trial"));
    }
    if !price.active {
        line.push_str(" (inactive)");
    }
    line
}

/// Lists the billing catalog as a public caller sees it.
pub fn run_catalog(config: &StoreConfig, all: bool, json: bool) -> anyhow::Result<()> {
    let store = init_store(config)?;
    let caller = Caller::Anonymous;

    let mut entries = Vec::new();
    for product in store.list_products(&caller, !all)? {
        let mut prices = store.list_prices(&caller, &product.id)?;
        if !all {
            prices.retain(|p| p.active);
        }
        entries.push(CatalogEntry { product, prices });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No products found.");
        return Ok(());
    }

    for entry in &entries {
        let name = entry.product.name.as_deref().unwrap_or(&entry.product.id);
        println!("{name}  ({})", entry.product.id);
        if let Some(description) = &entry.product.description {
            println!("  {description}");
        }
        for price in &entry.prices {
            println!("  - {}  [{}]", format_price(price), price.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricingPlanInterval;

    fn price(unit_amount: Option<i64>) -> Price {
        Price {
            id: "price_1".to_string(),
            product_id: "prod_1".to_string(),
            active: true,
            description: None,
            unit_amount,
            currency: "usd".to_string(),
            price_type: PricingType::Recurring,
            interval: Some(PricingPlanInterval::Month),
            interval_count: Some(1),
            trial_period_days: None,
            metadata: None,
        }
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(&price(Some(1205))), "USD 12.05 per month");

        let mut quarterly = price(Some(3000));
        quarterly.interval_count = Some(3);
        quarterly.trial_period_days = Some(14);
        assert_eq!(format_price(&quarterly), "USD 30.00 every 3 months, 14 day trial");

        let mut once = price(None);
        once.price_type = PricingType::OneTime;
        once.interval = None;
        once.active = false;
        assert_eq!(format_price(&once), "USD (custom) one time (inactive)");
    }

    #[test]
    fn test_format_amount_keeps_sign() {
        assert_eq!(format_amount(&price(Some(-50))), "USD -0.50");
        assert_eq!(format_amount(&price(Some(-1205))), "USD -12.05");
        assert_eq!(format_amount(&price(Some(7))), "USD 0.07");
    }
}
