//! Billing API: invoice listing for the billing data source.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};

/// Client for the global Billing API.
#[derive(Clone, Debug)]
pub struct BillingApi {
    client: Arc<ApiClient>,
}

/// One invoice.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Invoice {
    /// Invoice identifier.
    pub id: String,
    /// Billing period start.
    pub start_date: Option<DateTime<Utc>>,
    /// Billing period end.
    pub stop_date: Option<DateTime<Utc>>,
    /// Invoice kind (`periodic`, `purchase`).
    #[serde(default)]
    pub invoice_type: String,
    /// Organisation billed.
    #[serde(default)]
    pub organization_id: String,
    /// Total including taxes, minor units.
    #[serde(default)]
    pub total_taxed: i64,
    /// Invoice number, assigned on issue.
    #[serde(default)]
    pub number: u64,
}

#[derive(Deserialize)]
struct InvoicesEnvelope {
    invoices: Vec<Invoice>,
}

/// Filter parameters for invoice listing; also the input to the synthetic
/// data-source identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InvoiceFilter {
    /// Only invoices whose period starts after this date.
    pub started_after: String,
    /// Only invoices whose period starts before this date.
    pub started_before: String,
    /// Only invoices of this kind.
    pub invoice_type: String,
    /// Only invoices billed to this organisation.
    pub organization_id: String,
}

impl BillingApi {
    /// Builds a client.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Lists invoices matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, ApiError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if !filter.started_after.is_empty() {
            query.push(("started_after", filter.started_after.clone()));
        }
        if !filter.started_before.is_empty() {
            query.push(("started_before", filter.started_before.clone()));
        }
        if !filter.invoice_type.is_empty() {
            query.push(("invoice_type", filter.invoice_type.clone()));
        }
        if !filter.organization_id.is_empty() {
            query.push(("organization_id", filter.organization_id.clone()));
        }
        let envelope: InvoicesEnvelope = self
            .client
            .get("/billing/v2beta1/invoices", &query)
            .await?;
        Ok(envelope.invoices)
    }
}
