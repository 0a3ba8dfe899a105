//! Directory wire records and request filters.

use core_library::models::{is_stream_url, Station};
use serde::{Deserialize, Serialize};

/// Station record as returned by `/json/stations/*`.
///
/// Every field is optional on the wire; mirrors disagree about nulls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStation {
    pub stationuuid: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub url_resolved: Option<String>,
    pub favicon: Option<String>,
    pub tags: Option<String>,
    pub countrycode: Option<String>,
    pub language: Option<String>,
    pub votes: Option<i64>,
    pub clickcount: Option<i64>,
    pub bitrate: Option<u32>,
    pub codec: Option<String>,
    pub lastcheckok: Option<u8>,
}

impl RawStation {
    /// Convert to a domain station, or `None` when the record is unusable
    /// (no id, blank name, or no http(s) stream URL).
    pub fn into_station(self) -> Option<Station> {
        let id = non_blank(self.stationuuid)?;
        let name = non_blank(self.name)?;
        let stream_url = non_blank(self.url_resolved)
            .filter(|url| is_stream_url(url))
            .or_else(|| non_blank(self.url).filter(|url| is_stream_url(url)))?;

        Some(Station {
            id,
            name,
            stream_url,
            icon_url: non_blank(self.favicon).filter(|url| is_stream_url(url)),
            genre: first_token(self.tags),
            country: non_blank(self.countrycode),
            language: first_token(self.language),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First non-empty token of a comma-separated list.
fn first_token(value: Option<String>) -> Option<String> {
    value?
        .split(',')
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Convert a page of wire records, dropping unusable ones.
pub fn stations_from_raw(records: Vec<RawStation>) -> Vec<Station> {
    records
        .into_iter()
        .filter_map(RawStation::into_station)
        .collect()
}

/// Sort keys understood by `/json/stations/search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Name,
    Votes,
    ClickCount,
    Bitrate,
    ChangeTimestamp,
    Random,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Name => "name",
            SortOrder::Votes => "votes",
            SortOrder::ClickCount => "clickcount",
            SortOrder::Bitrate => "bitrate",
            SortOrder::ChangeTimestamp => "changetimestamp",
            SortOrder::Random => "random",
        }
    }
}

/// Search parameters; unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub name: Option<String>,
    /// ISO 3166-1 alpha-2
    pub country_code: Option<String>,
    pub language: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order: Option<SortOrder>,
    pub reverse: bool,
    /// Overrides the configured hide-broken default when set.
    pub hide_broken: Option<bool>,
}

impl SearchFilters {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order: SortOrder, reverse: bool) -> Self {
        self.order = Some(order);
        self.reverse = reverse;
        self
    }

    pub fn hide_broken(mut self, hide: bool) -> Self {
        self.hide_broken = Some(hide);
        self
    }

    /// Query pairs for `/json/stations/search`.
    pub fn to_query(&self, default_limit: u32, default_hide_broken: bool) -> Vec<(String, String)> {
        let mut query = Vec::new();
        let mut push = |key: &str, value: String| query.push((key.to_string(), value));

        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            push("name", name.to_string());
        }
        if let Some(code) = &self.country_code {
            push("countrycode", code.to_uppercase());
        }
        if let Some(language) = &self.language {
            push("language", language.to_lowercase());
        }
        if let Some(tag) = &self.tag {
            push("tag", tag.to_lowercase());
        }
        push("limit", self.limit.unwrap_or(default_limit).to_string());
        if let Some(offset) = self.offset {
            push("offset", offset.to_string());
        }
        if let Some(order) = self.order {
            push("order", order.as_str().to_string());
            push("reverse", self.reverse.to_string());
        }
        push(
            "hidebroken",
            self.hide_broken.unwrap_or(default_hide_broken).to_string(),
        );

        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    pub name: String,
    #[serde(rename = "iso_3166_1", default)]
    pub code: String,
    #[serde(rename = "stationcount", default)]
    pub station_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    #[serde(rename = "stationcount", default)]
    pub station_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    #[serde(rename = "stationcount", default)]
    pub station_count: u32,
}

/// Entry of `/json/servers`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerRecord {
    pub name: String,
}

/// Reply of `/json/vote/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VoteReply {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawStation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn converts_full_record() {
        let station = raw(
            r#"{
                "stationuuid": "96062a7b-0601-11e8-ae97-52543be04c81",
                "name": " Jazz Radio ",
                "url": "http://jazz.example/stream.pls",
                "url_resolved": "https://jazz.example/live.mp3",
                "favicon": "https://jazz.example/icon.png",
                "tags": "jazz,smooth jazz",
                "countrycode": "FR",
                "language": "french,english",
                "votes": 1200,
                "bitrate": 128,
                "lastcheckok": 1
            }"#,
        )
        .into_station()
        .unwrap();

        assert_eq!(station.id, "96062a7b-0601-11e8-ae97-52543be04c81");
        assert_eq!(station.name, "Jazz Radio");
        assert_eq!(station.stream_url, "https://jazz.example/live.mp3");
        assert_eq!(station.genre.as_deref(), Some("jazz"));
        assert_eq!(station.language.as_deref(), Some("french"));
        assert_eq!(station.country.as_deref(), Some("FR"));
        assert_eq!(station.icon_url.as_deref(), Some("https://jazz.example/icon.png"));
    }

    #[test]
    fn falls_back_to_url_when_resolved_missing() {
        let station = raw(
            r#"{"stationuuid":"a","name":"A","url":"http://a.example/s","url_resolved":""}"#,
        )
        .into_station()
        .unwrap();
        assert_eq!(station.stream_url, "http://a.example/s");
    }

    #[test]
    fn drops_unusable_records() {
        let records: Vec<RawStation> = serde_json::from_str(
            r#"[
                {"stationuuid":"ok","name":"Fine","url_resolved":"https://ok.example"},
                {"stationuuid":"no-name","name":"  ","url_resolved":"https://x.example"},
                {"stationuuid":"no-url","name":"Silent"},
                {"stationuuid":"bad-url","name":"Legacy","url":"mms://legacy.example"},
                {"name":"No id","url_resolved":"https://y.example"}
            ]"#,
        )
        .unwrap();

        let stations = stations_from_raw(records);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "ok");
    }

    #[test]
    fn empty_tags_yield_no_genre() {
        let station = raw(r#"{"stationuuid":"a","name":"A","url":"https://a","tags":" , ","favicon":""}"#)
            .into_station()
            .unwrap();
        assert_eq!(station.genre, None);
        assert_eq!(station.icon_url, None);
    }

    #[test]
    fn search_query_applies_defaults() {
        let query = SearchFilters::by_name("jazz").to_query(50, true);
        assert!(query.contains(&("name".to_string(), "jazz".to_string())));
        assert!(query.contains(&("limit".to_string(), "50".to_string())));
        assert!(query.contains(&("hidebroken".to_string(), "true".to_string())));
        assert!(!query.iter().any(|(k, _)| k == "order"));
    }

    #[test]
    fn search_query_with_all_filters() {
        let query = SearchFilters::default()
            .country("de")
            .language("German")
            .tag("Rock")
            .limit(10)
            .offset(20)
            .order(SortOrder::Votes, true)
            .hide_broken(false)
            .to_query(100, true);

        let expect = [
            ("countrycode", "DE"),
            ("language", "german"),
            ("tag", "rock"),
            ("limit", "10"),
            ("offset", "20"),
            ("order", "votes"),
            ("reverse", "true"),
            ("hidebroken", "false"),
        ];
        for (key, value) in expect {
            assert!(
                query.contains(&(key.to_string(), value.to_string())),
                "missing {}={}",
                key,
                value
            );
        }
    }

    #[test]
    fn parses_listings() {
        let countries: Vec<CountryInfo> =
            serde_json::from_str(r#"[{"name":"Germany","iso_3166_1":"DE","stationcount":4200}]"#)
                .unwrap();
        assert_eq!(countries[0].code, "DE");
        assert_eq!(countries[0].station_count, 4200);

        let tags: Vec<TagInfo> = serde_json::from_str(r#"[{"name":"pop","stationcount":9}]"#).unwrap();
        assert_eq!(tags[0].station_count, 9);
    }
}
