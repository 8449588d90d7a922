use primitives::ClickContext;

use crate::db::{DbPool, PoolError};

/// Stores click-time context, first click wins per `tracking_id`.
///
/// Returns `false` when context for the `tracking_id` already exists.
pub async fn insert_click(pool: &DbPool, click: &ClickContext) -> Result<bool, PoolError> {
    let client = pool.get().await?;
    let stmt = client
        .prepare(
            "INSERT INTO click_context (tracking_id, ttclid, ip, user_agent, landing_url, referrer, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tracking_id) DO NOTHING",
        )
        .await?;

    let inserted = client
        .execute(
            &stmt,
            &[
                &click.tracking_id,
                &click.ttclid,
                &click.ip,
                &click.user_agent,
                &click.landing_url,
                &click.referrer,
                &click.created,
            ],
        )
        .await?;

    Ok(inserted == 1)
}

pub async fn fetch_click(
    pool: &DbPool,
    tracking_id: &str,
) -> Result<Option<ClickContext>, PoolError> {
    let client = pool.get().await?;
    let stmt = client
        .prepare(
            "SELECT tracking_id, ttclid, ip, user_agent, landing_url, referrer, created
            FROM click_context WHERE tracking_id = $1",
        )
        .await?;

    let row = client.query_opt(&stmt, &[&tracking_id]).await?;

    Ok(row.as_ref().map(ClickContext::from))
}
