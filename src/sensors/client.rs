// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! HTTP telemetry client

use async_trait::async_trait;
use tracing::debug;

use super::{Snapshot, TelemetrySource};
use crate::config::TelemetryConfig;
use crate::error::{Error, Result};

/// Fetches snapshots from a telemetry service over HTTP
pub struct HttpTelemetryClient {
    http: reqwest::Client,
    url: String,
}

impl HttpTelemetryClient {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::telemetry("*", e))?;

        Ok(Self {
            http,
            url: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.snapshot_path
            ),
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetryClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_snapshot(&self, machine_id: &str) -> Result<Snapshot> {
        debug!(machine_id, url = %self.url, "Fetching telemetry snapshot");

        let response = self
            .http
            .get(&self.url)
            .query(&[("machine_id", machine_id)])
            .send()
            .await
            .map_err(|e| Error::telemetry(machine_id, e))?
            .error_for_status()
            .map_err(|e| Error::telemetry(machine_id, e))?;

        let snapshot: Snapshot = response
            .json()
            .await
            .map_err(|e| Error::telemetry(machine_id, format!("invalid snapshot: {}", e)))?;

        match snapshot.machine_id() {
            Some(reported) if reported != machine_id => Err(Error::telemetry(
                machine_id,
                format!("source answered for machine {}", reported),
            )),
            _ => Ok(snapshot),
        }
    }
}
