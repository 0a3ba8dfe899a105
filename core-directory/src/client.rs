//! Station directory client.
//!
//! Every request goes to the pool's active server. A transport failure or a
//! 5xx reply marks that server failed and the request is repeated once on the
//! next server; a second failure is reported too and returned as
//! [`DirectoryError::Network`]. Client errors and undecodable bodies are
//! returned immediately.

use crate::error::{DirectoryError, Result};
use crate::models::{
    stations_from_raw, CountryInfo, LanguageInfo, RawStation, SearchFilters, ServerRecord,
    TagInfo, VoteReply,
};
use crate::server_pool::{Endpoint, ServerPool};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_library::models::Station;
use core_runtime::config::DirectorySettings;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Longest error body quoted back in [`DirectoryError::Application`].
const MAX_ERROR_BODY: usize = 200;

enum Attempt {
    Response(HttpResponse),
    Unreachable(String),
}

pub struct StationDirectoryClient {
    http: Arc<dyn HttpClient>,
    pool: Arc<ServerPool>,
    settings: DirectorySettings,
}

impl StationDirectoryClient {
    pub fn new(http: Arc<dyn HttpClient>, pool: Arc<ServerPool>, settings: DirectorySettings) -> Self {
        Self {
            http,
            pool,
            settings,
        }
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    #[instrument(skip(self), fields(name = ?filters.name))]
    pub async fn search(&self, filters: &SearchFilters) -> Result<Vec<Station>> {
        let query = filters.to_query(self.settings.default_limit, self.settings.hide_broken);
        let records: Vec<RawStation> = self.get_json("/json/stations/search", &query).await?;
        let stations = stations_from_raw(records);
        debug!(count = stations.len(), "Search completed");
        Ok(stations)
    }

    /// Most voted stations.
    pub async fn top_stations(&self, limit: u32) -> Result<Vec<Station>> {
        self.station_list(&format!("/json/stations/topvote/{}", limit))
            .await
    }

    /// Most clicked stations.
    pub async fn top_clicked(&self, limit: u32) -> Result<Vec<Station>> {
        self.station_list(&format!("/json/stations/topclick/{}", limit))
            .await
    }

    /// Look up one station; `Ok(None)` when the directory does not know it.
    pub async fn by_id(&self, station_id: &str) -> Result<Option<Station>> {
        let stations = self
            .station_list(&format!("/json/stations/byuuid/{}", station_id))
            .await?;
        Ok(stations.into_iter().find(|s| s.id == station_id))
    }

    pub async fn countries(&self) -> Result<Vec<CountryInfo>> {
        self.get_json("/json/countries", &hide_broken_query(&self.settings))
            .await
    }

    pub async fn languages(&self) -> Result<Vec<LanguageInfo>> {
        self.get_json("/json/languages", &hide_broken_query(&self.settings))
            .await
    }

    pub async fn tags(&self) -> Result<Vec<TagInfo>> {
        self.get_json("/json/tags", &hide_broken_query(&self.settings))
            .await
    }

    /// Count a listen in the directory's click statistics.
    pub async fn report_click(&self, station_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .get_json(&format!("/json/url/{}", station_id), &[])
            .await?;
        Ok(())
    }

    /// Vote for a station. The directory throttles votes per client and
    /// answers throttled votes with `ok: false`.
    pub async fn vote(&self, station_id: &str) -> Result<bool> {
        let reply: VoteReply = self
            .get_json(&format!("/json/vote/{}", station_id), &[])
            .await?;
        if !reply.ok {
            info!(station_id, message = %reply.message, "Vote not counted");
        }
        Ok(reply.ok)
    }

    /// Fetch the current mirror list and replace the pool with it.
    ///
    /// Returns the new pool size; an empty list leaves the pool unchanged.
    pub async fn refresh_servers(&self) -> Result<usize> {
        let records: Vec<ServerRecord> = self.get_json("/json/servers", &[]).await?;

        let mut endpoints: Vec<Endpoint> = records
            .into_iter()
            .map(|record| record.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .map(|name| Endpoint::new(format!("https://{}", name)))
            .collect();
        endpoints.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        if self.pool.replace_pool(endpoints) {
            info!(size = self.pool.len(), "Directory servers refreshed");
        }
        Ok(self.pool.len())
    }

    async fn station_list(&self, path: &str) -> Result<Vec<Station>> {
        let query = hide_broken_query(&self.settings);
        let records: Vec<RawStation> = self.get_json(path, &query).await?;
        Ok(stations_from_raw(records))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let response = self.fetch(path, query).await?;
        decode(response)
    }

    async fn fetch(&self, path: &str, query: &[(String, String)]) -> Result<HttpResponse> {
        let first = self.pool.active_endpoint()?;
        match self.attempt(&first, path, query).await? {
            Attempt::Response(response) => return Ok(response),
            Attempt::Unreachable(message) => {
                warn!(endpoint = %first, path, error = %message, "Directory request failed, retrying on another server");
                self.pool.report_failure(&first);
            }
        }

        let second = self.pool.active_endpoint()?;
        match self.attempt(&second, path, query).await? {
            Attempt::Response(response) => Ok(response),
            Attempt::Unreachable(message) => {
                warn!(endpoint = %second, path, error = %message, "Directory retry failed");
                self.pool.report_failure(&second);
                Err(DirectoryError::Network {
                    endpoint: second.to_string(),
                    message,
                })
            }
        }
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Attempt> {
        let mut request = HttpRequest::get(endpoint.join(path))
            .header("Accept", "application/json")
            .header("User-Agent", self.settings.user_agent.clone())
            .timeout(self.settings.request_timeout);
        for (key, value) in query {
            request = request.query(key.clone(), value.clone());
        }

        match self.http.execute(request).await {
            Ok(response) if response.is_server_error() => Ok(Attempt::Unreachable(format!(
                "server error {}",
                response.status
            ))),
            Ok(response) => Ok(Attempt::Response(response)),
            Err(error) if error.is_transport() => Ok(Attempt::Unreachable(error.to_string())),
            Err(error) => Err(DirectoryError::Bridge(error)),
        }
    }
}

fn hide_broken_query(settings: &DirectorySettings) -> Vec<(String, String)> {
    vec![("hidebroken".to_string(), settings.hide_broken.to_string())]
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    if !response.is_success() {
        let body = String::from_utf8_lossy(&response.body);
        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(DirectoryError::Application {
            status: response.status,
            message,
        });
    }

    serde_json::from_slice(&response.body).map_err(|e| DirectoryError::Decode(e.to_string()))
}
