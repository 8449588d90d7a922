use primitives::ConversionRecord;

use crate::db::{DbPool, PoolError};

/// Inserts a conversion, relying on the `tracking_id` uniqueness
/// constraint for idempotency.
///
/// Returns the inserted record, or `None` when a record with the same
/// `tracking_id` already exists. `ON CONFLICT DO NOTHING` makes the
/// duplicate signal atomic even under concurrent posts.
pub async fn insert_conversion(
    pool: &DbPool,
    conversion: &ConversionRecord,
) -> Result<Option<ConversionRecord>, PoolError> {
    let client = pool.get().await?;
    let stmt = client
        .prepare(
            "INSERT INTO conversions (tracking_id, offer_id, payout, status, source_ip, user_agent, nonce, ts, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tracking_id) DO NOTHING
            RETURNING tracking_id, offer_id, payout, status, source_ip, user_agent, nonce, ts, notification_sent, notification_sent_at, notification_response, created",
        )
        .await?;

    let row = client
        .query_opt(
            &stmt,
            &[
                &conversion.tracking_id,
                &conversion.offer_id,
                &conversion.payout,
                &conversion.status,
                &conversion.source_ip,
                &conversion.user_agent,
                &conversion.nonce,
                &conversion.ts,
                &conversion.created,
            ],
        )
        .await?;

    Ok(row.as_ref().map(ConversionRecord::from))
}

/// ```text
/// SELECT .. FROM conversions
/// WHERE tracking_id = $1
/// ```
pub async fn fetch_conversion(
    pool: &DbPool,
    tracking_id: &str,
) -> Result<Option<ConversionRecord>, PoolError> {
    let client = pool.get().await?;
    let stmt = client
        .prepare(
            "SELECT tracking_id, offer_id, payout, status, source_ip, user_agent, nonce, ts, notification_sent, notification_sent_at, notification_response, created
            FROM conversions WHERE tracking_id = $1",
        )
        .await?;

    let row = client.query_opt(&stmt, &[&tracking_id]).await?;

    Ok(row.as_ref().map(ConversionRecord::from))
}

/// Attaches the forwarding audit trail to an already recorded
/// conversion. The response body is stored truncated by the caller.
pub async fn update_notification(
    pool: &DbPool,
    tracking_id: &str,
    sent: bool,
    response: &str,
) -> Result<bool, PoolError> {
    let client = pool.get().await?;
    let stmt = client
        .prepare(
            "UPDATE conversions
            SET notification_sent = $2, notification_sent_at = NOW(), notification_response = $3
            WHERE tracking_id = $1",
        )
        .await?;

    let updated = client
        .execute(&stmt, &[&tracking_id, &sent, &response])
        .await?;

    Ok(updated == 1)
}
