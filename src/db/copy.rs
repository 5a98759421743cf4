//! Thin wrappers over sqlx's raw `COPY` protocol, used by the Exporter (`COPY ...
//! TO STDOUT`) and the Merge Engine (`COPY ... FROM STDIN`).

use futures_util::TryStreamExt;
use sqlx::postgres::PgConnection;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;

/// Run a `COPY (...) TO STDOUT` statement and stream its output into `dest`,
/// creating/truncating the file.
pub async fn copy_out_to_file(conn: &mut PgConnection, sql: &str, dest: &Path) -> Result<u64> {
    let mut stream = conn.copy_out_raw(sql).await?;
    let file = tokio::fs::File::create(dest).await?;
    let mut writer = BufWriter::new(file);

    let mut bytes_written = 0u64;
    while let Some(chunk) = stream.try_next().await? {
        writer.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(bytes_written)
}

/// Run a `COPY ... FROM STDIN` statement, feeding it the raw bytes of `src`.
pub async fn copy_in_from_file(conn: &mut PgConnection, sql: &str, src: &Path) -> Result<u64> {
    let data = tokio::fs::read(src).await?;
    let mut sink = conn.copy_in_raw(sql).await?;
    sink.send(data.as_slice()).await?;
    let rows = sink.finish().await?;
    Ok(rows)
}
