//! Transactions: paged listing and note updates

use moneygraph_core::{validation_error, ErrorContext, MoneygraphError, MoneygraphResult};
use moneygraph_transport::GraphqlTransport;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const COMPONENT: &str = "transactions_client";

/// Largest page the upstream accepts
pub const MAX_PAGE_SIZE: u32 = 1000;

const GET_TRANSACTIONS: &str = r#"query GetTransactionsList($offset: Int, $limit: Int) {
  allTransactions {
    totalCount
    results(offset: $offset, limit: $limit) {
      id
      amount
      date
      pending
      notes
      merchant { id name }
      category { id name }
      account { id displayName }
    }
  }
}"#;

const UPDATE_TRANSACTION: &str = r#"mutation UpdateTransactionNotes($input: UpdateTransactionMutationInput!) {
  updateTransaction(input: $input) {
    transaction {
      id
      amount
      date
      pending
      notes
      merchant { id name }
      category { id name }
      account { id displayName }
    }
    errors {
      message
      fieldErrors { field messages }
    }
  }
}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReference {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub date: String,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub merchant: Option<Reference>,
    #[serde(default)]
    pub category: Option<Reference>,
    #[serde(default)]
    pub account: Option<AccountReference>,
}

/// One page of transactions plus the total across all pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub total_count: u64,
    pub results: Vec<Transaction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsData {
    all_transactions: TransactionPage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateData {
    update_transaction: UpdatePayload,
}

#[derive(Deserialize)]
struct UpdatePayload {
    transaction: Option<Transaction>,
    #[serde(default)]
    errors: Option<PayloadErrors>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadErrors {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    field_errors: Vec<FieldError>,
}

#[derive(Deserialize)]
struct FieldError {
    field: String,
    #[serde(default)]
    messages: Vec<String>,
}

impl PayloadErrors {
    fn describe(&self) -> Option<String> {
        let mut parts: Vec<String> = self.message.iter().cloned().collect();
        parts.extend(
            self.field_errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.messages.join(", "))),
        );
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

/// Core transaction data; failures always propagate
#[derive(Clone)]
pub struct TransactionsClient {
    transport: GraphqlTransport,
}

impl TransactionsClient {
    pub fn new(transport: GraphqlTransport) -> Self {
        Self { transport }
    }

    pub async fn list_transactions(
        &self,
        limit: u32,
        offset: u32,
    ) -> MoneygraphResult<TransactionPage> {
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(validation_error!(
                format!("limit must be between 1 and {}", MAX_PAGE_SIZE),
                "limit",
                COMPONENT
            ));
        }

        let data: TransactionsData = self
            .transport
            .query_as(
                GET_TRANSACTIONS,
                json!({ "limit": limit, "offset": offset }),
            )
            .await?;
        debug!(
            returned = data.all_transactions.results.len(),
            total = data.all_transactions.total_count,
            "Fetched transactions page"
        );
        Ok(data.all_transactions)
    }

    /// Replace the notes on a transaction; an empty string clears them
    pub async fn update_transaction_notes(
        &self,
        transaction_id: &str,
        notes: &str,
    ) -> MoneygraphResult<Transaction> {
        if transaction_id.trim().is_empty() {
            return Err(validation_error!(
                "Transaction id must not be empty",
                "transaction_id",
                COMPONENT
            ));
        }

        let data: UpdateData = self
            .transport
            .mutate_as(
                UPDATE_TRANSACTION,
                json!({ "input": { "id": transaction_id, "notes": notes } }),
            )
            .await?;
        let payload = data.update_transaction;

        if let Some(description) = payload.errors.as_ref().and_then(PayloadErrors::describe) {
            return Err(MoneygraphError::api(COMPONENT, description, Some(200)));
        }

        let transaction = payload.transaction.ok_or_else(|| MoneygraphError::EmptyResponse {
            message: "updateTransaction returned no transaction".to_string(),
            context: ErrorContext::new(COMPONENT)
                .with_operation("update_transaction_notes"),
        })?;
        info!(transaction_id = %transaction.id, "Updated transaction notes");
        Ok(transaction)
    }
}
