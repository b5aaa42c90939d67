use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Advisory category list offered to clients; the repository stores any value.
pub const CATEGORIES: &[&str] = &[
    "Matemática",
    "Física",
    "Química",
    "Biologia",
    "Informática",
    "Engenharia",
    "Economia",
    "Direito",
    "Medicina",
    "Letras",
    "História",
    "Outros",
];

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: i64,
}

/// A material row joined with its creator's name and, when a requester is
/// known, that requester's favorite id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaterialView {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub cover: Option<String>,
    pub file_path: String,
    pub category: String,
    pub tags: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub creator_name: String, // Joined from users table
    pub favorite_id: Option<i64>,
}

impl MaterialView {
    /// Tags are stored as free text delimited by spaces or commas.
    pub fn tag_list(&self) -> Vec<&str> {
        split_tags(&self.tags)
    }

    /// Whether the title or description contains `needle`, which must
    /// already be passed through [`fold_case`].
    pub fn matches_text(&self, needle: &str) -> bool {
        fold_case(&self.title).contains(needle) || fold_case(&self.description).contains(needle)
    }
}

/// Unicode lowercase, used for every case-insensitive comparison.
pub fn fold_case(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn split_tags(tags: &str) -> Vec<&str> {
    tags.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Fields for a new material; asset paths are already stored.
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: String,
    pub file_path: String,
    pub cover: Option<String>,
}

/// A partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct MaterialChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub file_path: Option<String>,
    pub cover: Option<String>,
}

/// Asset paths a material referenced before an update or delete.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct MaterialAssets {
    pub file_path: String,
    pub cover: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Favorite {
    pub id: i64,
    pub user_id: i64,
    pub material_id: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentView {
    pub id: i64,
    pub material_id: i64,
    pub user_id: i64,
    pub user_name: String, // Joined from users table
    pub content: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}
