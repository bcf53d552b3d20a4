use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Category assigned to documents created without one.
pub const DEFAULT_CATEGORY: &str = "General";

/// Creator attribution sent to the vector engine when a document has none.
pub const SYSTEM_CREATOR: &str = "System";

// =============================================================================
// Documents
// =============================================================================

/// A titled, categorised text document stored in the knowledge base.
///
/// The `id` is assigned once by [`Document::create`] and is the only key used
/// for lookup, update and deletion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl Document {
    /// Build a new document with a fresh identifier and the current time.
    ///
    /// A blank category is replaced with [`DEFAULT_CATEGORY`].
    pub fn create(
        title: impl Into<String>,
        content: impl Into<String>,
        category: Option<&str>,
        created_by: Option<String>,
    ) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            title,
            content,
            category,
            Utc::now(),
            created_by,
        )
    }

    /// Build a document with an existing identifier and timestamp.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        category: Option<&str>,
        created_at: DateTime<Utc>,
        created_by: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            category: normalize_category(category),
            created_at,
            created_by,
        }
    }

    /// Text submitted to the embedding model: title and content joined by a space.
    pub fn text_for_embedding(&self) -> String {
        format!("{} {}", self.title, self.content)
    }

    /// Creator attribution, falling back to [`SYSTEM_CREATOR`].
    pub fn creator_or_system(&self) -> &str {
        self.created_by.as_deref().unwrap_or(SYSTEM_CREATOR)
    }
}

/// Trim a category, substituting [`DEFAULT_CATEGORY`] when blank or absent.
pub fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

// =============================================================================
// Search
// =============================================================================

/// Convert an engine distance (lower is closer) into a similarity in [0, 1].
///
/// Uses `1 / (1 + distance)`. Negative distances clamp to 0 (similarity 1);
/// NaN and infinite distances yield 0.
pub fn similarity_from_distance(distance: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    1.0 / (1.0 + distance.max(0.0))
}

/// A document paired with its similarity to a query.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub document: Document,
    pub similarity_score: f64,
}

impl SearchResult {
    pub fn new(document: Document, similarity_score: f64) -> Self {
        Self {
            document,
            similarity_score,
        }
    }

    /// Build a result from a raw engine distance.
    pub fn from_distance(document: Document, distance: f64) -> Self {
        Self::new(document, similarity_from_distance(distance))
    }

    /// Similarity as a rounded percentage (0-100).
    pub fn score_percentage(&self) -> u32 {
        (self.similarity_score * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

impl Serialize for SearchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SearchResult", 3)?;
        s.serialize_field("document", &self.document)?;
        s.serialize_field("similarityScore", &self.similarity_score)?;
        s.serialize_field("scorePercentage", &self.score_percentage())?;
        s.end()
    }
}

/// Live knowledge base statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseStats {
    pub document_count: u64,
    pub embedding_dimension: usize,
}

// =============================================================================
// Access control
// =============================================================================

/// Access role of an authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full read/write access, including imports and delete-all.
    Admin,
    /// Read-only access: listing, detail, search, categories, stats.
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

/// The authenticated caller of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
