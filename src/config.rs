// Application configuration
// Read from environment variables (optionally via a .env file)

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::checkout::{CheckoutSettings, ShippingPolicy};
use crate::payments::stripe::DEFAULT_API_BASE;

/// Configuration errors, reported at start-up
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Which payment gateway to talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayConfig {
    Simulated,
    Stripe { secret_key: String, api_base: String },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Absent means the in-memory store
    pub database_url: Option<String>,
    pub currency: String,
    pub shipping: ShippingPolicy,
    pub minimum_charge_amount: i64,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string());

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or("PORT", get("PORT"), 8080u16)?;
        let database_url = get("DATABASE_URL").filter(|v| !v.is_empty());
        let currency = get("CURRENCY")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "gbp".to_string())
            .to_lowercase();

        let flat_rate = parse_or("SHIPPING_FLAT_RATE", get("SHIPPING_FLAT_RATE"), Decimal::new(499, 2))?;
        // Empty string switches the threshold off
        let free_shipping_threshold = match get("FREE_SHIPPING_THRESHOLD") {
            None => Some(Decimal::from(50)),
            Some(v) if v.is_empty() => None,
            Some(v) => Some(parse("FREE_SHIPPING_THRESHOLD", &v)?),
        };
        if flat_rate < Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                name: "SHIPPING_FLAT_RATE",
                value: flat_rate.to_string(),
            });
        }

        let minimum_charge_amount =
            parse_or("MIN_CHARGE_MINOR_UNITS", get("MIN_CHARGE_MINOR_UNITS"), 50i64)?;

        let gateway = match get("PAYMENT_GATEWAY").as_deref() {
            None | Some("") | Some("simulated") => GatewayConfig::Simulated,
            Some("stripe") => GatewayConfig::Stripe {
                secret_key: get("STRIPE_SECRET_KEY")
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?,
                api_base: get("STRIPE_API_BASE")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "PAYMENT_GATEWAY",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            host,
            port,
            database_url,
            currency,
            shipping: ShippingPolicy {
                flat_rate,
                free_shipping_threshold,
            },
            minimum_charge_amount,
            gateway,
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            shipping: self.shipping,
            currency: self.currency.clone(),
            minimum_charge_amount: self.minimum_charge_amount,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_or<T: FromStr>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) if !v.is_empty() => parse(name, &v),
        _ => Ok(default),
    }
}
