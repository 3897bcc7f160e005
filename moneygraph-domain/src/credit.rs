//! Credit score and bill-sync lookups
//!
//! Both features are only enabled for some accounts. They run under
//! [`QueryPolicy::BestEffort`], so an account without the feature gets
//! `None` instead of an error.

use moneygraph_core::MoneygraphResult;
use moneygraph_transport::GraphqlTransport;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::policy::QueryPolicy;

const GET_CREDIT_HISTORY: &str = r#"query GetCreditScoreSnapshots {
  creditScoreSnapshots {
    id
    score
    reportedDate
  }
}"#;

const GET_SPINWHEEL_USER: &str = r#"query GetSpinwheelUser {
  spinwheelUser {
    id
    onboardingStatus
    isBillSyncTrackingEnabled
  }
}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditScoreSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    pub score: u32,
    pub reported_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinwheelUser {
    pub id: String,
    #[serde(default)]
    pub onboarding_status: Option<String>,
    #[serde(default)]
    pub is_bill_sync_tracking_enabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreditData {
    #[serde(default)]
    credit_score_snapshots: Option<Vec<CreditScoreSnapshot>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpinwheelData {
    #[serde(default)]
    spinwheel_user: Option<SpinwheelUser>,
}

#[derive(Clone)]
pub struct CreditClient {
    transport: GraphqlTransport,
}

impl CreditClient {
    pub fn new(transport: GraphqlTransport) -> Self {
        Self { transport }
    }

    /// Credit score history, `None` when credit monitoring is not enabled
    pub async fn credit_history(&self) -> MoneygraphResult<Option<Vec<CreditScoreSnapshot>>> {
        let data = QueryPolicy::BestEffort.apply(
            self.transport
                .query_as::<CreditData>(GET_CREDIT_HISTORY, json!({}))
                .await,
        )?;
        Ok(data.and_then(|d| d.credit_score_snapshots))
    }

    /// Bill-sync user, `None` when the integration is not enabled
    pub async fn spinwheel_user(&self) -> MoneygraphResult<Option<SpinwheelUser>> {
        let data = QueryPolicy::BestEffort.apply(
            self.transport
                .query_as::<SpinwheelData>(GET_SPINWHEEL_USER, json!({}))
                .await,
        )?;
        Ok(data.and_then(|d| d.spinwheel_user))
    }
}
