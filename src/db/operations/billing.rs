use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::Row;

use crate::db::{flag, flag_value, DatabaseProxy};
use crate::time::now_ms;

/// Local mirror of the provider's subscription for one account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub status: String,
    pub price_id: Option<String>,
    pub plan_type: String,
    #[serde(serialize_with = "crate::time::serialize_ms_opt")]
    pub trial_end: Option<i64>,
    #[serde(serialize_with = "crate::time::serialize_ms_opt")]
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    #[serde(serialize_with = "crate::time::serialize_ms")]
    pub updated_at: i64,
}

impl SubscriptionRecord {
    pub fn free(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            customer_id: None,
            subscription_id: None,
            status: "none".to_string(),
            price_id: None,
            plan_type: "free".to_string(),
            trial_end: None,
            current_period_end: None,
            cancel_at_period_end: false,
            updated_at: now_ms(),
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str = "user_id, customer_id, subscription_id, status, price_id, \
     plan_type, trial_end, current_period_end, cancel_at_period_end, updated_at";

pub async fn find_subscription(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_subscription_row).transpose()
}

pub async fn find_by_customer(
    proxy: &DatabaseProxy,
    customer_id: &str,
) -> Result<Option<SubscriptionRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE customer_id = $1"
    ))
    .bind(customer_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_subscription_row).transpose()
}

/// Records the provider customer id before any subscription exists.
pub async fn attach_customer(
    proxy: &DatabaseProxy,
    user_id: &str,
    customer_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (user_id, customer_id, status, plan_type, cancel_at_period_end, updated_at)
        VALUES ($1, $2, 'none', 'free', 0, $3)
        ON CONFLICT (user_id) DO UPDATE SET customer_id = excluded.customer_id, updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(customer_id)
    .bind(now_ms())
    .execute(proxy.pool())
    .await?;
    Ok(())
}

pub async fn upsert_subscription(
    proxy: &DatabaseProxy,
    record: &SubscriptionRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions
          (user_id, customer_id, subscription_id, status, price_id, plan_type,
           trial_end, current_period_end, cancel_at_period_end, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (user_id) DO UPDATE SET
          customer_id = excluded.customer_id,
          subscription_id = excluded.subscription_id,
          status = excluded.status,
          price_id = excluded.price_id,
          plan_type = excluded.plan_type,
          trial_end = excluded.trial_end,
          current_period_end = excluded.current_period_end,
          cancel_at_period_end = excluded.cancel_at_period_end,
          updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.user_id)
    .bind(record.customer_id.as_deref())
    .bind(record.subscription_id.as_deref())
    .bind(&record.status)
    .bind(record.price_id.as_deref())
    .bind(&record.plan_type)
    .bind(record.trial_end)
    .bind(record.current_period_end)
    .bind(flag_value(record.cancel_at_period_end))
    .bind(record.updated_at)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

fn map_subscription_row(row: &AnyRow) -> Result<SubscriptionRecord, sqlx::Error> {
    Ok(SubscriptionRecord {
        user_id: row.try_get("user_id")?,
        customer_id: row.try_get("customer_id")?,
        subscription_id: row.try_get("subscription_id")?,
        status: row.try_get("status")?,
        price_id: row.try_get("price_id")?,
        plan_type: row.try_get("plan_type")?,
        trial_end: row.try_get("trial_end")?,
        current_period_end: row.try_get("current_period_end")?,
        cancel_at_period_end: flag(row, "cancel_at_period_end")?,
        updated_at: row.try_get("updated_at")?,
    })
}
