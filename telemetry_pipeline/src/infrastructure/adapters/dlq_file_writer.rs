// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File-Backed Dead-Letter Queue Writer
//!
//! Appends newline-delimited JSON to one file per sink instance, opened
//! `O_CREATE | O_APPEND` at construction and held for the sink's lifetime.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use telemetry_pipeline_domain::error::PipelineError;
use telemetry_pipeline_domain::ports::dlq_writer::DlqWriter;

pub struct DlqFileWriter {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl DlqFileWriter {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl DlqWriter for DlqFileWriter {
    async fn write_line(&self, line: String) -> Result<(), PipelineError> {
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PipelineError> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_newline_delimited_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.jsonl");
        let writer = DlqFileWriter::open(&path).await.unwrap();

        writer.write_line(r#"{"document":{"id":1}}"#.to_string()).await.unwrap();
        writer.write_line(r#"{"document":{"id":2}}"#.to_string()).await.unwrap();
        writer.shutdown().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"id\":1"));
    }

    #[tokio::test]
    async fn reopening_the_same_path_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.jsonl");

        let first = DlqFileWriter::open(&path).await.unwrap();
        first.write_line("one".to_string()).await.unwrap();
        first.shutdown().await.unwrap();
        drop(first);

        let second = DlqFileWriter::open(&path).await.unwrap();
        second.write_line("two".to_string()).await.unwrap();
        second.shutdown().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dlq.jsonl");
        let writer = DlqFileWriter::open(&path).await.unwrap();
        writer.write_line("x".to_string()).await.unwrap();
        assert!(writer.path().exists());
    }
}
