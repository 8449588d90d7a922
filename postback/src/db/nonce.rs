use primitives::NonceRecord;

use crate::db::{DbPool, PoolError};

/// Marks a nonce as used.
///
/// Returns `false` when the nonce was already present, i.e. the
/// request is a replay. The primary key on `nonce` makes the check
/// atomic under concurrent posts carrying the same nonce.
pub async fn insert_nonce(pool: &DbPool, nonce: &NonceRecord) -> Result<bool, PoolError> {
    let client = pool.get().await?;
    let stmt = client
        .prepare(
            "INSERT INTO used_nonces (nonce, tracking_id, ts, created)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (nonce) DO NOTHING",
        )
        .await?;

    let inserted = client
        .execute(
            &stmt,
            &[&nonce.nonce, &nonce.tracking_id, &nonce.ts, &nonce.created],
        )
        .await?;

    Ok(inserted == 1)
}
