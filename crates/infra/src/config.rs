//! Manufacturing configuration: defaults applied by the service layer.

use std::env;
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;

/// Defaults and presentation choices of the manufacturing workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturingConfig {
    /// Category of new inventory items when none is given.
    pub default_category: String,
    /// Unit of measure of new inventory items when none is given.
    pub default_unit: String,
    /// Reorder threshold of new inventory items when none is given.
    pub default_min_stock_alert: Decimal,
    /// How many production orders the inventory detail view shows.
    pub recent_orders_limit: usize,
    /// Cash-book category of the expense booked on completion.
    pub production_expense_category: String,
    /// Expense description; `{product}` and `{quantity}` are substituted.
    pub production_expense_description: String,
}

impl Default for ManufacturingConfig {
    fn default() -> Self {
        Self {
            default_category: "RAW_MATERIAL".to_string(),
            default_unit: "pcs".to_string(),
            default_min_stock_alert: Decimal::TEN,
            recent_orders_limit: 10,
            production_expense_category: "Production Cost".to_string(),
            production_expense_description: "Production of {product} - {quantity} units"
                .to_string(),
        }
    }
}

impl ManufacturingConfig {
    /// Defaults overridden by `KASAKU_*` environment variables.
    ///
    /// Recognised: `KASAKU_DEFAULT_CATEGORY`, `KASAKU_DEFAULT_UNIT`,
    /// `KASAKU_DEFAULT_MIN_STOCK_ALERT`, `KASAKU_RECENT_ORDERS_LIMIT`,
    /// `KASAKU_PRODUCTION_EXPENSE_CATEGORY`, `KASAKU_PRODUCTION_EXPENSE_DESCRIPTION`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("KASAKU_DEFAULT_CATEGORY") {
            config.default_category = v;
        }
        if let Some(v) = lookup("KASAKU_DEFAULT_UNIT") {
            config.default_unit = v;
        }
        if let Some(v) = lookup("KASAKU_DEFAULT_MIN_STOCK_ALERT") {
            let alert = Decimal::from_str(v.trim())
                .with_context(|| format!("KASAKU_DEFAULT_MIN_STOCK_ALERT is not a number: {v}"))?;
            anyhow::ensure!(
                alert >= Decimal::ZERO,
                "KASAKU_DEFAULT_MIN_STOCK_ALERT cannot be negative"
            );
            config.default_min_stock_alert = alert;
        }
        if let Some(v) = lookup("KASAKU_RECENT_ORDERS_LIMIT") {
            config.recent_orders_limit = v
                .trim()
                .parse()
                .with_context(|| format!("KASAKU_RECENT_ORDERS_LIMIT is not a count: {v}"))?;
        }
        if let Some(v) = lookup("KASAKU_PRODUCTION_EXPENSE_CATEGORY") {
            config.production_expense_category = v;
        }
        if let Some(v) = lookup("KASAKU_PRODUCTION_EXPENSE_DESCRIPTION") {
            config.production_expense_description = v;
        }

        Ok(config)
    }

    pub fn expense_description(&self, product: &str, quantity: u32) -> String {
        self.production_expense_description
            .replace("{product}", product)
            .replace("{quantity}", &quantity.to_string())
    }
}
