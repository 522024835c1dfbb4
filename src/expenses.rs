//! Typed wrappers for the expense endpoints.
//!
//! Every call goes through the request pipeline, so each one participates
//! in token injection and the refresh protocol without doing anything
//! itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::form_urlencoded;

use crate::error::ApiResult;
use crate::pipeline::RequestPipeline;

/// Lifecycle state of an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Paid,
    Pending,
    Upcoming,
}

impl ExpenseStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Paid => "paid",
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Upcoming => "upcoming",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub date: DateTime<Utc>,
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    pub title: String,
    pub amount: f64,
    pub category: String,
    pub date: DateTime<Utc>,
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpenseRequest {
    pub id: i64,
    #[serde(flatten)]
    pub fields: CreateExpenseRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseStats {
    pub total_expenses: f64,
    pub monthly_total: f64,
    pub category_breakdown: HashMap<String, f64>,
    pub status_breakdown: HashMap<String, f64>,
    pub monthly_trend: Vec<MonthlyAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyAmount {
    pub month: String,
    pub amount: f64,
}

/// Client for `/expenses`.
#[derive(Clone)]
pub struct ExpenseClient {
    pipeline: Arc<RequestPipeline>,
}

impl ExpenseClient {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn list(&self) -> ApiResult<Vec<Expense>> {
        self.pipeline.get_json("/expenses").await
    }

    pub async fn get(&self, id: i64) -> ApiResult<Expense> {
        self.pipeline.get_json(&format!("/expenses/{}", id)).await
    }

    pub async fn create(&self, request: &CreateExpenseRequest) -> ApiResult<Expense> {
        self.pipeline.post_json("/expenses", request).await
    }

    pub async fn update(&self, request: &UpdateExpenseRequest) -> ApiResult<Expense> {
        self.pipeline
            .put_json(&format!("/expenses/{}", request.id), request)
            .await
    }

    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        self.pipeline.delete(&format!("/expenses/{}", id)).await
    }

    pub async fn by_status(&self, status: ExpenseStatus) -> ApiResult<Vec<Expense>> {
        self.pipeline
            .get_json(&with_query("/expenses", &[("status", status.as_str())]))
            .await
    }

    pub async fn by_category(&self, category: &str) -> ApiResult<Vec<Expense>> {
        self.pipeline
            .get_json(&with_query("/expenses", &[("category", category)]))
            .await
    }

    pub async fn search(&self, query: &str) -> ApiResult<Vec<Expense>> {
        self.pipeline
            .get_json(&with_query("/expenses/search", &[("q", query)]))
            .await
    }

    pub async fn stats(&self) -> ApiResult<ExpenseStats> {
        self.pipeline.get_json("/expenses/stats").await
    }

    pub async fn monthly(&self, year: i32, month: u32) -> ApiResult<Vec<Expense>> {
        let year = year.to_string();
        let month = month.to_string();
        self.pipeline
            .get_json(&with_query("/expenses/monthly", &[("year", &year), ("month", &month)]))
            .await
    }

    pub async fn bulk_delete(&self, ids: &[i64]) -> ApiResult<()> {
        let request = crate::pipeline::ApiRequest::post(
            "/expenses/bulk-delete",
            serde_json::json!({ "ids": ids }),
        );
        self.pipeline.execute(request).await.map(|_| ())
    }

    pub async fn set_status(&self, id: i64, status: ExpenseStatus) -> ApiResult<Expense> {
        self.pipeline
            .patch_json(
                &format!("/expenses/{}/status", id),
                &serde_json::json!({ "status": status.as_str() }),
            )
            .await
    }
}

/// Append an encoded query string to a path.
fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    format!("{}?{}", path, serializer.finish())
}
