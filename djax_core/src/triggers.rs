//! Behavioral triggers: request paths mapped to remote trigger calls.
//!
//! A trigger pattern is matched against the start of a path (leading `/` ignored).
//! Variables are literals or `$name` references to named capture groups.

use std::collections::BTreeMap;

use regex::Regex;

use crate::content::ContentRecords;
use crate::models::LocalRef;
use crate::remote::{TriggerApi, TriggerRequest};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerVar {
    Literal(String),
    Param(String),
}

impl TriggerVar {
    pub fn parse(value: &str) -> Self {
        match value.strip_prefix('$') {
            Some(name) => TriggerVar::Param(name.to_string()),
            None => TriggerVar::Literal(value.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct Affinity {
    local_type: String,
    param: String,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    regex: Regex,
    category: String,
    action: String,
    vars: BTreeMap<String, TriggerVar>,
    affinity: Option<Affinity>,
}

impl Trigger {
    pub fn new(pattern: &str, category: &str, action: &str) -> Result<Self> {
        if category.trim().is_empty() || action.trim().is_empty() {
            return Err(Error::InvalidInput(
                "trigger category and action are required".to_string(),
            ));
        }
        let regex = Regex::new(&format!("^(?:{pattern})"))
            .map_err(|e| Error::InvalidInput(format!("invalid trigger pattern {pattern:?}: {e}")))?;
        Ok(Self {
            regex,
            category: category.to_string(),
            action: action.to_string(),
            vars: BTreeMap::new(),
            affinity: None,
        })
    }

    /// Adds a variable; values starting with `$` name a capture group.
    pub fn var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), TriggerVar::parse(value));
        self
    }

    /// Turns this into an affinity trigger for rows of `local_type`, whose id is
    /// the capture group `param`.
    pub fn affinity(mut self, local_type: &str, param: &str) -> Self {
        self.affinity = Some(Affinity {
            local_type: local_type.to_string(),
            param: param.to_string(),
        });
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_affinity(&self) -> bool {
        self.affinity.is_some()
    }

    /// Named captures for `path`, or `None` when the pattern does not match.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let caps = self.regex.captures(path)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// Resolve the variable map against matched parameters.
    pub fn variables(&self, params: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        self.vars
            .iter()
            .map(|(name, var)| {
                let value = match var {
                    TriggerVar::Literal(v) => v.clone(),
                    TriggerVar::Param(p) => params.get(p).cloned().ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "trigger {}:{} references missing parameter ${p}",
                            self.category, self.action
                        ))
                    })?,
                };
                Ok((name.clone(), value))
            })
            .collect()
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category, self.action)
    }
}

#[derive(Debug)]
pub struct TriggerMatch<'a> {
    pub trigger: &'a Trigger,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerMap {
    triggers: Vec<Trigger>,
}

impl TriggerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn push(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn matching(&self, path: &str) -> Vec<TriggerMatch<'_>> {
        self.triggers
            .iter()
            .filter_map(|trigger| {
                trigger
                    .captures(path)
                    .map(|params| TriggerMatch { trigger, params })
            })
            .collect()
    }

    /// Fire every trigger matching `path`. Without a profile, a fresh one is
    /// requested from the remote side.
    ///
    /// A trigger that cannot be built or sent is logged and skipped; the
    /// returned requests are the ones that went out.
    #[tracing::instrument(level = "info", skip(self, api, records))]
    pub async fn fire(
        &self,
        path: &str,
        profile: Option<&str>,
        api: &dyn TriggerApi,
        records: &ContentRecords,
    ) -> Result<Vec<TriggerRequest>> {
        let matches = self.matching(path);
        if matches.is_empty() {
            return Ok(Vec::new());
        }
        let profile = match profile {
            Some(p) => p.to_string(),
            None => api.profile().await?,
        };

        let mut fired = Vec::with_capacity(matches.len());
        for m in matches {
            let request = match self.build_request(&m, &profile, records).await {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(trigger = %m.trigger, error = %err, "skipping trigger");
                    continue;
                }
            };
            match api.trigger(&request).await {
                Ok(()) => {
                    tracing::info!(trigger = %m.trigger, profile = %profile, "fired trigger");
                    fired.push(request);
                }
                Err(err) => tracing::warn!(trigger = %m.trigger, error = %err, "trigger failed"),
            }
        }
        Ok(fired)
    }

    async fn build_request(
        &self,
        m: &TriggerMatch<'_>,
        profile: &str,
        records: &ContentRecords,
    ) -> Result<Option<TriggerRequest>> {
        let mut request = TriggerRequest::new(m.trigger.category(), m.trigger.action())?;
        request.profile = Some(profile.to_string());
        request.variables = m.trigger.variables(&m.params)?;

        if let Some(affinity) = &m.trigger.affinity {
            let raw = m.params.get(&affinity.param).ok_or_else(|| {
                Error::InvalidInput(format!("missing affinity parameter ${}", affinity.param))
            })?;
            let local_id = raw.parse::<i64>().map_err(|_| {
                Error::InvalidInput(format!("affinity id {raw:?} is not an integer"))
            })?;
            let local = LocalRef::new(affinity.local_type.clone(), local_id);
            let Some(record) = records.find_record(&local).await? else {
                tracing::debug!(local = %local, "affinity target is not synced");
                return Ok(None);
            };
            request
                .variables
                .insert("content_type".to_string(), record.remote_type);
            request
                .variables
                .insert("content_key".to_string(), record.remote_key);
        }
        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Article, Harness};

    #[test]
    fn invalid_patterns_are_rejected() {
        let err = Trigger::new("topic/(", "affinity", "rtag").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(Trigger::new("x", "", "rtag").is_err());
    }

    #[test]
    fn matching_is_anchored_and_ignores_leading_slash() {
        let map = TriggerMap::new()
            .with(
                Trigger::new(r"topic/(?P<topic_slug>[\w-]+)/$", "affinity", "rtag")
                    .unwrap()
                    .var("tag", "$topic_slug")
                    .var("source", "web"),
            )
            .with(Trigger::new(r"about/$", "visit", "about").unwrap());

        let hits = map.matching("/topic/rust-lang/");
        assert_eq!(hits.len(), 1);
        let vars = hits[0].trigger.variables(&hits[0].params).unwrap();
        assert_eq!(vars.get("tag").map(String::as_str), Some("rust-lang"));
        assert_eq!(vars.get("source").map(String::as_str), Some("web"));

        assert!(map.matching("/news/topic/rust/").is_empty());
        assert_eq!(map.matching("about/").len(), 1);
    }

    #[test]
    fn unknown_param_is_an_error() {
        let trigger = Trigger::new(r"a/$", "c", "a").unwrap().var("x", "$missing");
        let params = trigger.captures("a/").unwrap();
        assert!(trigger.variables(&params).is_err());
    }

    #[tokio::test]
    async fn fire_sends_matches_with_profile() {
        let h = Harness::new().await;
        let map = TriggerMap::new().with(
            Trigger::new(r"topic/(?P<slug>\w+)/$", "affinity", "rtag")
                .unwrap()
                .var("tag", "$slug"),
        );

        let fired = map
            .fire("/topic/tokio/", Some("p-1"), &h.remote, &h.records)
            .await
            .unwrap();
        assert_eq!(fired.len(), 1);

        let sent = h.remote.fired_triggers().await;
        assert_eq!(sent, fired);
        assert_eq!(sent[0].profile.as_deref(), Some("p-1"));
        assert_eq!(sent[0].variables.get("tag").map(String::as_str), Some("tokio"));

        let none = map.fire("/other/", None, &h.remote, &h.records).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn affinity_trigger_carries_the_content_record() {
        let h = Harness::new().await;
        let row = h.records.insert_model(&Article::new("Hello", "World")).await.unwrap();
        let local = row.local_ref();
        let map = TriggerMap::new().with(
            Trigger::new(r"article/(?P<article_id>\d+)/$", "affinity", "article")
                .unwrap()
                .affinity(&local.local_type, "article_id"),
        );
        let path = format!("/article/{}/", local.local_id);

        // not pushed yet: nothing to point at
        let fired = map.fire(&path, None, &h.remote, &h.records).await.unwrap();
        assert!(fired.is_empty());

        h.records.push_to_library(&local).await.unwrap();
        let record = h.records.get_record(&local).await.unwrap();
        let fired = map.fire(&path, None, &h.remote, &h.records).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].variables.get("content_type"), Some(&record.remote_type));
        assert_eq!(fired[0].variables.get("content_key"), Some(&record.remote_key));
        assert!(fired[0].profile.is_some());
    }
}
