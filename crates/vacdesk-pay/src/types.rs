//! Provider wire types.

use serde::{Deserialize, Serialize};

/// Payment status as reported by the provider.
///
/// Only `Succeeded` ever triggers entitlement changes; everything else is
/// reported back verbatim. Unknown statuses are preserved in `Other` so a
/// provider-side addition never turns into a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Payment created, awaiting user action.
    Pending,
    /// Authorized but not yet captured.
    WaitingForCapture,
    /// Money received; safe to apply the purchase.
    Succeeded,
    /// Terminally canceled.
    Canceled,
    /// Any status this client does not know about.
    #[serde(untagged)]
    Other(String),
}

impl ProviderStatus {
    /// String form, for logs and user-facing messages.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::WaitingForCapture => "waiting_for_capture",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        }
    }
}

/// A money amount in the provider's decimal-string format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    /// Decimal string, e.g. `"49.00"`.
    pub value: String,
    /// ISO 4217 currency code.
    pub currency: String,
}

impl Amount {
    /// Build an amount from minor units (kopecks, cents).
    #[must_use]
    pub fn from_minor(minor: i64, currency: &str) -> Self {
        Self {
            value: format!("{}.{:02}", minor / 100, (minor % 100).abs()),
            currency: currency.to_string(),
        }
    }
}

/// Redirect confirmation block in a create-payment request.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    /// Always `"redirect"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Where the provider sends the user after payment.
    pub return_url: String,
}

/// Confirmation block in a create-payment response.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationResponse {
    /// The URL the user must visit to pay.
    pub confirmation_url: Option<String>,
}

/// Request body for creating a payment.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentRequest {
    /// Amount to charge.
    pub amount: Amount,
    /// Capture immediately on success.
    pub capture: bool,
    /// Redirect confirmation.
    pub confirmation: ConfirmationRequest,
    /// Human-readable description shown to the payer.
    pub description: String,
    /// Opaque metadata echoed back by the provider.
    pub metadata: serde_json::Value,
}

/// A payment object as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    /// Provider-assigned payment id.
    pub id: String,
    /// Current status.
    pub status: ProviderStatus,
    /// Whether money was actually received.
    #[serde(default)]
    pub paid: bool,
    /// Confirmation block, present on freshly created payments.
    pub confirmation: Option<ConfirmationResponse>,
}

/// Provider error body.
#[derive(Debug, Deserialize)]
pub struct ProviderErrorResponse {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_formats_minor_units() {
        assert_eq!(Amount::from_minor(49_00, "RUB").value, "49.00");
        assert_eq!(Amount::from_minor(1_299_00, "RUB").value, "1299.00");
        assert_eq!(Amount::from_minor(105, "RUB").value, "1.05");
    }

    #[test]
    fn status_parses_known_and_unknown() {
        let s: ProviderStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert_eq!(s, ProviderStatus::Succeeded);

        let s: ProviderStatus = serde_json::from_str("\"waiting_for_capture\"").unwrap();
        assert_eq!(s, ProviderStatus::WaitingForCapture);

        let s: ProviderStatus = serde_json::from_str("\"under_review\"").unwrap();
        assert_eq!(s, ProviderStatus::Other("under_review".to_string()));
        assert_eq!(s.as_str(), "under_review");
    }
}
