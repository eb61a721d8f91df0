//! Payment creation request validation
//!
//! Field-level errors are collected rather than failing fast, so a client gets
//! every problem with its request in one response.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::payments::types::{Currency, NewPayment};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 254;
/// NUMERIC(10, 2)
const MAX_AMOUNT_DIGITS: u32 = 10;
const AMOUNT_DECIMAL_PLACES: u32 = 2;

/// Raw creation request as received from a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

/// Field name -> messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|m| m.as_slice())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("email pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

impl PaymentRequest {
    pub fn validate(self) -> Result<NewPayment, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let customer_name = match self.customer_name.map(|n| n.trim().to_string()) {
            None => {
                errors.add("customer_name", "This field is required.");
                None
            }
            Some(name) if name.is_empty() => {
                errors.add("customer_name", "This field may not be blank.");
                None
            }
            Some(name) if name.chars().count() > MAX_NAME_LEN => {
                errors.add(
                    "customer_name",
                    format!("Ensure this field has no more than {} characters.", MAX_NAME_LEN),
                );
                None
            }
            Some(name) => Some(name),
        };

        let customer_email = match self.customer_email.map(|e| e.trim().to_string()) {
            None => {
                errors.add("customer_email", "This field is required.");
                None
            }
            Some(email) if email.len() > MAX_EMAIL_LEN => {
                errors.add(
                    "customer_email",
                    format!("Ensure this field has no more than {} characters.", MAX_EMAIL_LEN),
                );
                None
            }
            Some(email) if !is_valid_email(&email) => {
                errors.add("customer_email", "Enter a valid email address.");
                None
            }
            Some(email) => Some(email),
        };

        let amount = match self.amount {
            None => {
                errors.add("amount", "This field is required.");
                None
            }
            Some(amount) => match validate_amount(amount) {
                Ok(amount) => Some(amount),
                Err(message) => {
                    errors.add("amount", message);
                    None
                }
            },
        };

        let currency = match self.currency {
            None => {
                errors.add("currency", "This field is required.");
                None
            }
            Some(code) => match code.parse::<Currency>() {
                Ok(currency) => Some(currency),
                Err(message) => {
                    errors.add("currency", message);
                    None
                }
            },
        };

        match (customer_name, customer_email, amount, currency) {
            (Some(customer_name), Some(customer_email), Some(amount), Some(currency))
                if errors.is_empty() =>
            {
                Ok(NewPayment {
                    customer_name,
                    customer_email,
                    amount,
                    currency,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Checks sign and precision, returning the amount rescaled to two decimal places.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, String> {
    if amount <= Decimal::ZERO {
        return Err("Amount must be greater than zero".to_string());
    }

    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_DECIMAL_PLACES {
        return Err(format!(
            "Ensure that there are no more than {} decimal places.",
            AMOUNT_DECIMAL_PLACES
        ));
    }

    let max_whole_digits = MAX_AMOUNT_DIGITS - AMOUNT_DECIMAL_PLACES;
    let whole = normalized.trunc();
    if whole.to_string().trim_start_matches('-').len() as u32 > max_whole_digits {
        return Err(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_whole_digits
        ));
    }

    let mut rescaled = normalized;
    rescaled.rescale(AMOUNT_DECIMAL_PLACES);
    Ok(rescaled)
}
