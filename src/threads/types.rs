use serde::{Deserialize, Serialize};

/// Row in the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadSummary {
  pub id: String,
  pub title: Option<String>,
  pub preview: Option<String>,
  pub updated_at: Option<i64>,
  pub created_at: Option<i64>,
  pub archived: bool,
  pub source_kind: Option<String>,
}

impl ThreadSummary {
  /// Title, else preview, else a generic label.
  pub fn display_title(&self) -> &str {
    self
      .title
      .as_deref()
      .filter(|t| !t.trim().is_empty())
      .or_else(|| self.preview.as_deref().filter(|p| !p.trim().is_empty()))
      .unwrap_or("Conversation")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadPage {
  pub threads: Vec<ThreadSummary>,
  pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadRole {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadItem {
  pub role: ThreadRole,
  pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadDetail {
  pub id: String,
  pub title: Option<String>,
  pub preview: Option<String>,
  pub updated_at: Option<i64>,
  pub in_progress: Option<bool>,
  pub items: Vec<ThreadItem>,
}

impl ThreadDetail {
  /// Whether `fresh` should replace `self` on screen.
  ///
  /// Compares the timestamp and item count, plus the in-progress flag and the
  /// final item's text so a streamed edit of the last reply is not missed.
  pub fn should_replace_with(&self, fresh: &ThreadDetail) -> bool {
    self.id != fresh.id
      || self.updated_at != fresh.updated_at
      || self.items.len() != fresh.items.len()
      || self.in_progress != fresh.in_progress
      || self.items.last().map(|i| &i.text) != fresh.items.last().map(|i| &i.text)
  }
}
