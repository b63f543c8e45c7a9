use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::browser::SearchPage;
use crate::config::{ExtractionRule, SiteConfig};
use crate::error::{ConfigError, PageError};
use crate::models::{Resolution, EMOJI_SEARCH, EMOJI_WARNING};
use crate::parsers::{clean_text, normalize_code, repair_mojibake};

/// Query-string encoding: everything but unreserved characters.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Slack on top of a page-level timeout before the engine gives up on its own.
const WAIT_GRACE: Duration = Duration::from_millis(500);
/// Bound on the empty-state probe, which never waits by itself.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of trying one extraction rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Found(String),
    NotFound,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutcome {
    pub text: Option<String>,
    pub resolution: Resolution,
}

impl LookupOutcome {
    fn resolved(text: Option<String>, resolution: Resolution) -> Self {
        Self { text, resolution }
    }

    pub fn found(&self) -> bool {
        self.text.is_some()
    }
}

#[derive(Debug)]
enum LookupState {
    Navigating,
    CheckRedirect,
    CheckEmptyState,
    TrySelectors,
    Resolved(LookupOutcome),
}

/// Builds the search URL for `query`, substituting `{query}` or appending.
pub fn build_search_url(template: &str, query: &str) -> String {
    let encoded = utf8_percent_encode(query, QUERY_ENCODE_SET).to_string();
    if template.contains("{query}") {
        template.replace("{query}", &encoded)
    } else {
        format!("{}{}", template, encoded)
    }
}

/// Drives one query through navigation, redirect and empty-state checks and
/// the rule chain of a site.
pub struct LookupEngine {
    site: Arc<SiteConfig>,
    redirect_pattern: Option<Regex>,
}

impl LookupEngine {
    pub fn new(site: Arc<SiteConfig>) -> Result<Self, ConfigError> {
        let redirect_pattern = match &site.redirect {
            Some(redirect) => Some(Regex::new(&redirect.url_pattern).map_err(|source| {
                ConfigError::Pattern {
                    site: site.name.clone(),
                    pattern: redirect.url_pattern.clone(),
                    source,
                }
            })?),
            None => None,
        };
        Ok(Self {
            site,
            redirect_pattern,
        })
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// The query as sent to the site. Bad dotted tokens fall back to the trimmed input.
    pub fn prepare_query(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if !self.site.normalize_codes {
            return trimmed.to_string();
        }
        match normalize_code(trimmed) {
            Ok(code) => code,
            Err(e) => {
                warn!("{} Keeping code as typed: {}", EMOJI_WARNING, e);
                trimmed.to_string()
            }
        }
    }

    /// Looks up `raw_query`, then each declared fallback query until one is found.
    pub async fn lookup(&self, page: &dyn SearchPage, raw_query: &str) -> LookupOutcome {
        let query = self.prepare_query(raw_query);
        let outcome = self.run(page, &query).await;
        if outcome.found() {
            return outcome;
        }

        for fallback in &self.site.fallbacks {
            let Some(alternative) = fallback.apply(&query) else {
                continue;
            };
            info!("{} Retrying {} as {}", EMOJI_SEARCH, query, alternative);
            let retry = self.run(page, &alternative).await;
            if let Some(text) = retry.text {
                return LookupOutcome::resolved(
                    Some(format!("{}{}", text, fallback.suffix())),
                    retry.resolution,
                );
            }
        }

        outcome
    }

    /// One pass of the state machine for an already prepared query.
    pub async fn run(&self, page: &dyn SearchPage, query: &str) -> LookupOutcome {
        let mut state = LookupState::Navigating;
        loop {
            state = match state {
                LookupState::Navigating => self.navigate(page, query).await,
                LookupState::CheckRedirect => self.check_redirect(page, query).await,
                LookupState::CheckEmptyState => self.check_empty_state(page, query).await,
                LookupState::TrySelectors => {
                    LookupState::Resolved(self.try_rules(page, query, &self.site.rules).await)
                }
                LookupState::Resolved(outcome) => return outcome,
            };
        }
    }

    async fn navigate(&self, page: &dyn SearchPage, query: &str) -> LookupState {
        let url = build_search_url(&self.site.search_url, query);
        let navigation = &self.site.navigation;
        debug!("Navigating to {}", url);

        let result = match timeout(
            navigation.timeout() + WAIT_GRACE,
            page.navigate(&url, navigation.readiness, navigation.timeout()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PageError::Timeout {
                operation: "navigation",
                after: navigation.timeout(),
            }),
        };

        if let Err(e) = result {
            warn!("{} Search for {} failed: {}", EMOJI_WARNING, query, e);
            return LookupState::Resolved(LookupOutcome::resolved(
                None,
                Resolution::NavigationFailed {
                    class: e.class().to_string(),
                },
            ));
        }

        if !navigation.settle().is_zero() {
            sleep(navigation.settle()).await;
        }
        LookupState::CheckRedirect
    }

    async fn check_redirect(&self, page: &dyn SearchPage, query: &str) -> LookupState {
        let (Some(pattern), Some(redirect)) = (&self.redirect_pattern, &self.site.redirect) else {
            return LookupState::CheckEmptyState;
        };

        let current = match page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not read current URL: {}", e);
                return LookupState::CheckEmptyState;
            }
        };
        if !pattern.is_match(&current) {
            return LookupState::CheckEmptyState;
        }

        info!("Redirected to product page {}", current);
        let outcome = self.try_rules(page, query, &redirect.rules).await;
        match outcome.resolution {
            Resolution::Matched { rule } => LookupState::Resolved(LookupOutcome::resolved(
                outcome.text,
                Resolution::Redirected { rule },
            )),
            _ => LookupState::CheckEmptyState,
        }
    }

    async fn check_empty_state(&self, page: &dyn SearchPage, query: &str) -> LookupState {
        let Some(selector) = &self.site.empty_state_selector else {
            return LookupState::TrySelectors;
        };

        match timeout(PROBE_TIMEOUT, page.has_element(selector)).await {
            Ok(Ok(true)) => {
                info!("Empty state reported for {}", query);
                LookupState::Resolved(LookupOutcome::resolved(None, Resolution::ConfirmedEmpty))
            }
            Ok(Ok(false)) => LookupState::TrySelectors,
            Ok(Err(e)) => {
                debug!("Empty-state probe failed: {}", e);
                LookupState::TrySelectors
            }
            Err(_) => {
                debug!("Empty-state probe timed out");
                LookupState::TrySelectors
            }
        }
    }

    async fn try_rules(
        &self,
        page: &dyn SearchPage,
        query: &str,
        rules: &[ExtractionRule],
    ) -> LookupOutcome {
        for rule in rules {
            match self.apply_rule(page, rule, query).await {
                RuleOutcome::Found(text) => {
                    return LookupOutcome::resolved(
                        Some(text),
                        Resolution::Matched {
                            rule: rule.name().to_string(),
                        },
                    );
                }
                RuleOutcome::NotFound => debug!("Rule '{}' found nothing", rule.name()),
                RuleOutcome::TimedOut => debug!("Rule '{}' timed out", rule.name()),
            }
        }
        LookupOutcome::resolved(None, Resolution::Exhausted)
    }

    /// Tries a single rule. Never fails: errors count as "nothing here".
    pub async fn apply_rule(
        &self,
        page: &dyn SearchPage,
        rule: &ExtractionRule,
        query: &str,
    ) -> RuleOutcome {
        let attempt = if rule.timeout_ms == 0 {
            page.text_of(&rule.selector)
        } else {
            page.wait_for_text(&rule.selector, rule.timeout())
        };

        let raw = match timeout(rule.timeout() + WAIT_GRACE, attempt).await {
            Err(_) => return RuleOutcome::TimedOut,
            Ok(Err(e)) if e.is_timeout() => return RuleOutcome::TimedOut,
            Ok(Err(e)) => {
                debug!("Rule '{}' failed: {}", rule.name(), e);
                return RuleOutcome::NotFound;
            }
            Ok(Ok(None)) => return RuleOutcome::NotFound,
            Ok(Ok(Some(raw))) => raw,
        };

        let text = self.clean(&raw);
        if text.is_empty() {
            return RuleOutcome::NotFound;
        }
        if self.site.reject_query_echo && text.contains(query) {
            debug!("Rule '{}' only echoed the query: {}", rule.name(), text);
            return RuleOutcome::NotFound;
        }
        RuleOutcome::Found(text)
    }

    fn clean(&self, raw: &str) -> String {
        let text = clean_text(raw);
        if self.site.repair_mojibake {
            repair_mojibake(&text)
        } else {
            text
        }
    }
}
