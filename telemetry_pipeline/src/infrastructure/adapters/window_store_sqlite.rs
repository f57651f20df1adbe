// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite-Backed Window Store
//!
//! One physical SQLite file per window slot, holding a single table
//! `entries(key BLOB PRIMARY KEY, value BLOB NOT NULL)` ordered by
//! SQLite's default byte-wise BLOB comparison. `get_iterator` streams
//! rows in key order and filters them in Rust by `shard_of(key) ==
//! shard_id`, rather than materializing the whole table, so it can be
//! called once per worker without the workers' memory use scaling with
//! table size.
//!
//! Rotation (`rename_to`) closes the current pool, renames the
//! underlying file on disk, and opens a fresh pool against the new
//! path — the pair of `(path, pool)` this type wraps is not itself
//! stable across a rotation, only the logical identity the caller
//! holds an `Arc` to is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;

use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::window_store::WindowStore;

pub struct SqliteWindowStore {
    pool: RwLock<SqlitePool>,
    path: RwLock<PathBuf>,
}

impl SqliteWindowStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let pool = Self::open_pool(&path).await?;
        Ok(Self {
            pool: RwLock::new(pool),
            path: RwLock::new(path),
        })
    }

    async fn open_pool(path: &Path) -> Result<SqlitePool, PipelineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let url = format!("sqlite://{}", path.display());
        if !sqlx::Sqlite::database_exists(&url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&url)
                .await
                .map_err(|e| PipelineError::database_error(format!("failed to create window database {}: {e}", path.display())))?;
        }
        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| PipelineError::database_error(format!("failed to connect to window database {}: {e}", path.display())))?;
        sqlx::query("CREATE TABLE IF NOT EXISTS entries (key BLOB PRIMARY KEY, value BLOB NOT NULL)")
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("failed to create entries table: {e}")))?;
        Ok(pool)
    }

    pub async fn path(&self) -> PathBuf {
        self.path.read().await.clone()
    }

    /// Closes the current pool, renames the backing file to `new_path`
    /// (a no-op if the file doesn't exist yet), and opens a fresh pool
    /// against it. Callers that also need the slot cleared should call
    /// `clear()` before calling this, so the rename carries an already-
    /// empty file.
    async fn rename_to(&self, new_path: impl Into<PathBuf>) -> Result<(), PipelineError> {
        let new_path = new_path.into();
        let old_path = { self.path.read().await.clone() };

        self.pool.write().await.close().await;

        if old_path.exists() {
            if let Some(parent) = new_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(&old_path, &new_path).await?;
        }

        let fresh_pool = Self::open_pool(&new_path).await?;
        *self.pool.write().await = fresh_pool;
        *self.path.write().await = new_path;
        Ok(())
    }

    fn shard_of(key: &[u8], total_shards: u32) -> u32 {
        crc32fast::hash(key) % total_shards.max(1)
    }
}

#[async_trait]
impl WindowStore for SqliteWindowStore {
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), PipelineError> {
        let pool = self.pool.read().await.clone();
        sqlx::query("INSERT INTO entries (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(value)
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("window store put failed: {e}")))?;
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), PipelineError> {
        let pool = self.pool.read().await.clone();
        let mut tx = pool.begin().await.map_err(|e| PipelineError::database_error(format!("failed to start transaction: {e}")))?;
        for (key, value) in entries {
            sqlx::query("INSERT INTO entries (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| PipelineError::database_error(format!("window store put_all failed: {e}")))?;
        }
        tx.commit().await.map_err(|e| PipelineError::database_error(format!("failed to commit transaction: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
        let pool = self.pool.read().await.clone();
        let row = sqlx::query("SELECT value FROM entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("window store get failed: {e}")))?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn size(&self) -> Result<u64, PipelineError> {
        let pool = self.pool.read().await.clone();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("window store size failed: {e}")))?;
        Ok(count as u64)
    }

    async fn size_in_bytes(&self) -> Result<u64, PipelineError> {
        let pool = self.pool.read().await.clone();
        let bytes: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM entries")
            .fetch_one(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("window store size_in_bytes failed: {e}")))?;
        Ok(bytes as u64)
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        let pool = self.pool.read().await.clone();
        sqlx::query("DELETE FROM entries")
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("window store clear failed: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), PipelineError> {
        let pool = self.pool.read().await.clone();
        sqlx::query("DELETE FROM entries WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("window store delete failed: {e}")))?;
        Ok(())
    }

    async fn get_iterator(&self, total_shards: u32, shard_id: u32) -> Result<Vec<(Vec<u8>, Vec<u8>)>, PipelineError> {
        let pool = self.pool.read().await.clone();
        let mut rows = sqlx::query("SELECT key, value FROM entries ORDER BY key").fetch(&pool);
        let mut out = Vec::new();
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| PipelineError::database_error(format!("window store get_iterator failed: {e}")))?
        {
            let key: Vec<u8> = row.get("key");
            if Self::shard_of(&key, total_shards) == shard_id {
                let value: Vec<u8> = row.get("value");
                out.push((key, value));
            }
        }
        Ok(out)
    }

    async fn rotate_generation(&self, label: &str) -> Result<(), PipelineError> {
        let dir = {
            let path = self.path.read().await;
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        self.rename_to(dir.join(label)).await
    }

    async fn unlink(&self) -> Result<(), PipelineError> {
        let path = { self.path.read().await.clone() };
        self.pool.write().await.close().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PipelineError::from(err)),
        }
    }
}
