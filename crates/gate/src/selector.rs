// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account selection from free-form request text.
//!
//! Precedence: explicit reference (`alias: q`, `@alias q`, `[alias] q`) by
//! name, explicit role reference, role keyword anywhere in the text, then
//! the active account. Ties go to the earliest registered account.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::registry::Account;

/// Confidence at or below which a selection never switches accounts.
pub const DEFAULT_AUTO_SWITCH_THRESHOLD: f32 = 0.7;

const EXPLICIT_CONFIDENCE: f32 = 1.0;
const ROLE_REFERENCE_CONFIDENCE: f32 = 0.9;
const CONTENT_CONFIDENCE: f32 = 0.7;
const DEFAULT_CONFIDENCE: f32 = 0.3;

pub fn default_work_keywords() -> Vec<String> {
    ["work", "company", "job", "office", "meeting", "project", "仕事", "会社", "業務"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

pub fn default_personal_keywords() -> Vec<String> {
    ["personal", "private", "個人", "プライベート"].into_iter().map(str::to_owned).collect()
}

fn default_threshold() -> f32 {
    DEFAULT_AUTO_SWITCH_THRESHOLD
}

/// Selection configuration. The configured value applies to every tenant
/// without an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSettings {
    #[serde(default = "default_work_keywords")]
    pub work_keywords: Vec<String>,
    #[serde(default = "default_personal_keywords")]
    pub personal_keywords: Vec<String>,
    #[serde(default = "default_threshold")]
    pub auto_switch_threshold: f32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            work_keywords: default_work_keywords(),
            personal_keywords: default_personal_keywords(),
            auto_switch_threshold: DEFAULT_AUTO_SWITCH_THRESHOLD,
        }
    }
}

/// Why an account was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    ExplicitReference,
    WorkKeyword,
    PersonalKeyword,
    WorkContent,
    PersonalContent,
    DefaultActive,
}

/// Outcome of [`select`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub account_id: Option<String>,
    /// The text with any explicit account reference stripped.
    pub residual_query: String,
    pub confidence: f32,
    pub reason: SelectionReason,
}

impl Selection {
    pub fn should_auto_switch(&self, threshold: f32) -> bool {
        self.account_id.is_some() && self.confidence > threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Work,
    Personal,
}

impl Role {
    fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "work" | "company" => Some(Self::Work),
            "personal" | "private" => Some(Self::Personal),
            _ => None,
        }
    }

    fn keywords(self, settings: &SelectionSettings) -> &[String] {
        match self {
            Self::Work => &settings.work_keywords,
            Self::Personal => &settings.personal_keywords,
        }
    }

    fn keyword_reason(self) -> SelectionReason {
        match self {
            Self::Work => SelectionReason::WorkKeyword,
            Self::Personal => SelectionReason::PersonalKeyword,
        }
    }

    fn content_reason(self) -> SelectionReason {
        match self {
            Self::Work => SelectionReason::WorkContent,
            Self::Personal => SelectionReason::PersonalContent,
        }
    }
}

fn explicit_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"^(\w+):\s*(.+)$", r"^@(\w+)\s+(.+)$", r"^\[(\w+)\]\s*(.+)$"]
            .into_iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Split an explicit account reference into (alias, query).
fn parse_explicit(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    explicit_patterns().iter().find_map(|re| {
        let caps = re.captures(text)?;
        Some((caps.get(1)?.as_str(), caps.get(2)?.as_str().trim()))
    })
}

fn names_contain(account: &Account, needle: &str) -> bool {
    account.display_name.to_lowercase().contains(needle)
        || account.workspace_name.to_lowercase().contains(needle)
}

fn find_by_role<'a>(accounts: &'a [Account], keywords: &[String]) -> Option<&'a Account> {
    accounts.iter().find(|account| {
        keywords.iter().any(|kw| !kw.is_empty() && names_contain(account, &kw.to_lowercase()))
    })
}

fn selected(account: &Account, query: &str, confidence: f32, reason: SelectionReason) -> Selection {
    Selection {
        account_id: Some(account.id.clone()),
        residual_query: query.to_owned(),
        confidence,
        reason,
    }
}

/// Pick an account for `text` among `accounts` (registration order).
pub fn select(accounts: &[Account], text: &str, settings: &SelectionSettings) -> Selection {
    if let Some((alias, query)) = parse_explicit(text) {
        let alias = alias.to_lowercase();
        if let Some(account) = accounts.iter().find(|a| names_contain(a, &alias)) {
            return selected(account, query, EXPLICIT_CONFIDENCE, SelectionReason::ExplicitReference);
        }
        if let Some(role) = Role::from_alias(&alias) {
            if let Some(account) = find_by_role(accounts, role.keywords(settings)) {
                return selected(account, query, ROLE_REFERENCE_CONFIDENCE, role.keyword_reason());
            }
        }
    }

    let lower = text.to_lowercase();
    for role in [Role::Work, Role::Personal] {
        let mentioned =
            role.keywords(settings).iter().any(|kw| !kw.is_empty() && lower.contains(&kw.to_lowercase()));
        if !mentioned {
            continue;
        }
        if let Some(account) = find_by_role(accounts, role.keywords(settings)) {
            return selected(account, text, CONTENT_CONFIDENCE, role.content_reason());
        }
    }

    let fallback = accounts.iter().find(|a| a.is_active).or_else(|| accounts.first());
    Selection {
        account_id: fallback.map(|a| a.id.clone()),
        residual_query: text.to_owned(),
        confidence: DEFAULT_CONFIDENCE,
        reason: SelectionReason::DefaultActive,
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;
