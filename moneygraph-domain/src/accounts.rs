//! Accounts

use moneygraph_core::MoneygraphResult;
use moneygraph_transport::GraphqlTransport;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const GET_ACCOUNTS: &str = r#"query GetAccounts {
  accounts {
    id
    displayName
    currentBalance
    displayBalance
    isAsset
    isHidden
    includeInNetWorth
    updatedAt
    type { name display }
    subtype { name display }
    institution { id name }
  }
}"#;

/// `{ name, display }` pair used for account type and subtype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub current_balance: Option<f64>,
    #[serde(default)]
    pub display_balance: Option<f64>,
    #[serde(default)]
    pub is_asset: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub include_in_net_worth: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<Label>,
    #[serde(default)]
    pub subtype: Option<Label>,
    #[serde(default)]
    pub institution: Option<Institution>,
}

#[derive(Deserialize)]
struct AccountsData {
    accounts: Vec<Account>,
}

/// Core account data; failures always propagate
#[derive(Clone)]
pub struct AccountsClient {
    transport: GraphqlTransport,
}

impl AccountsClient {
    pub fn new(transport: GraphqlTransport) -> Self {
        Self { transport }
    }

    pub async fn list_accounts(&self) -> MoneygraphResult<Vec<Account>> {
        let data: AccountsData = self.transport.query_as(GET_ACCOUNTS, json!({})).await?;
        debug!(count = data.accounts.len(), "Fetched accounts");
        Ok(data.accounts)
    }
}
