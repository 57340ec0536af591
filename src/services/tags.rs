//! Tag display metadata and the tags directory.

use crate::db::{Database, DbError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Display metadata for a known tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMeta {
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

impl TagMeta {
    const fn new(description: &'static str, icon: &'static str, color: &'static str) -> Self {
        Self {
            description,
            icon,
            color,
        }
    }
}

pub const DEFAULT_ICON: &str = "🏷️";
pub const DEFAULT_COLOR: &str = "#6366f1";

static KNOWN_TAGS: &[(&str, TagMeta)] = &[
    ("python", TagMeta::new("A high-level, interpreted programming language known for its simplicity and readability.", "🐍", "#3776ab")),
    ("javascript", TagMeta::new("A versatile scripting language primarily used for web development and interactive content.", "📜", "#f7df1e")),
    ("java", TagMeta::new("An object-oriented programming language designed for platform independence.", "☕", "#007396")),
    ("c", TagMeta::new("A general-purpose programming language that provides low-level access to memory.", "©️", "#a8b9cc")),
    ("cpp", TagMeta::new("An extension of C with object-oriented features for system and application programming.", "⚙️", "#00599c")),
    ("c++", TagMeta::new("An extension of C with object-oriented features for system and application programming.", "⚙️", "#00599c")),
    ("csharp", TagMeta::new("A modern, object-oriented language developed by Microsoft for .NET framework.", "#️⃣", "#239120")),
    ("c#", TagMeta::new("A modern, object-oriented language developed by Microsoft for .NET framework.", "#️⃣", "#239120")),
    ("html", TagMeta::new("The standard markup language for creating web pages and web applications.", "🌐", "#e34f26")),
    ("css", TagMeta::new("A style sheet language used for describing the presentation of HTML documents.", "🎨", "#1572b6")),
    ("react", TagMeta::new("A JavaScript library for building user interfaces with reusable components.", "⚛️", "#61dafb")),
    ("angular", TagMeta::new("A TypeScript-based framework for building dynamic web applications.", "🅰️", "#dd0031")),
    ("vue", TagMeta::new("A progressive JavaScript framework for building user interfaces.", "💚", "#4fc08d")),
    ("nodejs", TagMeta::new("A JavaScript runtime built on Chrome's V8 engine for server-side development.", "🟢", "#339933")),
    ("node.js", TagMeta::new("A JavaScript runtime built on Chrome's V8 engine for server-side development.", "🟢", "#339933")),
    ("django", TagMeta::new("A high-level Python web framework that encourages rapid development.", "🎸", "#092e20")),
    ("flask", TagMeta::new("A lightweight Python web framework for building web applications.", "🧪", "#000000")),
    ("spring", TagMeta::new("A comprehensive framework for enterprise Java application development.", "🍃", "#6db33f")),
    ("laravel", TagMeta::new("An elegant PHP framework for web artisans with expressive syntax.", "🔺", "#ff2d20")),
    ("express", TagMeta::new("A minimal and flexible Node.js web application framework.", "🚂", "#000000")),
    ("sql", TagMeta::new("A standard language for managing and manipulating relational databases.", "🗄️", "#4479a1")),
    ("mysql", TagMeta::new("An open-source relational database management system.", "🐬", "#4479a1")),
    ("postgresql", TagMeta::new("A powerful, open-source object-relational database system.", "🐘", "#336791")),
    ("mongodb", TagMeta::new("A NoSQL document-oriented database for modern applications.", "🍃", "#47a248")),
    ("sqlite", TagMeta::new("A lightweight, serverless, self-contained SQL database engine.", "💾", "#003b57")),
    ("android", TagMeta::new("Google's mobile operating system and app development platform.", "🤖", "#3ddc84")),
    ("ios", TagMeta::new("Apple's mobile operating system for iPhone and iPad devices.", "🍎", "#000000")),
    ("flutter", TagMeta::new("Google's UI toolkit for building natively compiled mobile applications.", "🦋", "#02569b")),
    ("react-native", TagMeta::new("A framework for building native mobile apps using React.", "📱", "#61dafb")),
    ("machine-learning", TagMeta::new("Algorithms and statistical models that enable computers to learn from data.", "🤖", "#ff6f00")),
    ("artificial-intelligence", TagMeta::new("The simulation of human intelligence processes by computer systems.", "🧠", "#ff6f00")),
    ("data-science", TagMeta::new("Extracting insights and knowledge from structured and unstructured data.", "📊", "#ff6f00")),
    ("tensorflow", TagMeta::new("An open-source machine learning framework developed by Google.", "🔶", "#ff6f00")),
    ("pytorch", TagMeta::new("An open-source machine learning library for Python.", "🔥", "#ee4c2c")),
    ("git", TagMeta::new("A distributed version control system for tracking changes in source code.", "🌿", "#f05032")),
    ("docker", TagMeta::new("A platform for developing, shipping, and running applications in containers.", "🐳", "#2496ed")),
    ("kubernetes", TagMeta::new("An open-source system for automating deployment and management of containers.", "☸️", "#326ce5")),
    ("aws", TagMeta::new("Amazon Web Services cloud computing platform and services.", "☁️", "#ff9900")),
    ("azure", TagMeta::new("Microsoft's cloud computing service for building and managing applications.", "☁️", "#0078d4")),
    ("algorithm", TagMeta::new("Step-by-step procedures for solving problems and performing computations.", "🔢", "#5c7cfa")),
    ("data-structures", TagMeta::new("Ways of organizing and storing data for efficient access and modification.", "📦", "#5c7cfa")),
    ("api", TagMeta::new("Application Programming Interface for software component interaction.", "🔌", "#009688")),
    ("security", TagMeta::new("Protecting systems, networks, and data from digital attacks.", "🔒", "#d32f2f")),
    ("testing", TagMeta::new("Evaluating software to ensure it meets requirements and is bug-free.", "🧪", "#7cb342")),
    ("debugging", TagMeta::new("The process of finding and fixing errors or bugs in software.", "🐛", "#f44336")),
    ("performance", TagMeta::new("Optimizing software to run faster and use resources efficiently.", "⚡", "#ffc107")),
    ("networking", TagMeta::new("Communication between computers and devices over networks.", "🌐", "#2196f3")),
];

/// Metadata resolved for any tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub description: Cow<'static, str>,
    pub icon: &'static str,
    pub color: &'static str,
}

/// Look up a tag, case-insensitively; unknown tags get a generic entry.
pub fn tag_metadata(name: &str) -> TagInfo {
    let key = name.trim().to_lowercase();
    match KNOWN_TAGS.iter().find(|(tag, _)| *tag == key) {
        Some((_, meta)) => TagInfo {
            description: Cow::Borrowed(meta.description),
            icon: meta.icon,
            color: meta.color,
        },
        None => TagInfo {
            description: Cow::Owned(format!("Questions and discussions related to {name}.")),
            icon: DEFAULT_ICON,
            color: DEFAULT_COLOR,
        },
    }
}

/// Ordering of the tags directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSort {
    #[default]
    Popular,
    Name,
    New,
}

impl TagSort {
    /// Unknown values fall back to `Popular`.
    pub fn parse(s: &str) -> Self {
        match s {
            "name" => Self::Name,
            "new" => Self::New,
            _ => Self::Popular,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagEntry {
    pub tag_name: String,
    pub question_count: i64,
    #[serde(flatten)]
    pub meta: TagInfo,
    #[serde(skip)]
    first_question_id: i64,
}

async fn entries(db: &Database) -> Result<Vec<TagEntry>, DbError> {
    let rows = db.qa().tag_counts().await?;
    Ok(rows
        .into_iter()
        .filter(|(_, count, _)| *count > 0)
        .map(|(tag_name, question_count, first_question_id)| TagEntry {
            meta: tag_metadata(&tag_name),
            tag_name,
            question_count,
            first_question_id,
        })
        .collect())
}

/// Tags used by at least one live question.
pub async fn directory(db: &Database, sort: TagSort) -> Result<Vec<TagEntry>, DbError> {
    let mut tags = entries(db).await?;
    match sort {
        TagSort::Popular => tags.sort_by(|a, b| {
            b.question_count
                .cmp(&a.question_count)
                .then_with(|| a.tag_name.cmp(&b.tag_name))
        }),
        TagSort::Name => tags.sort_by(|a, b| a.tag_name.cmp(&b.tag_name)),
        TagSort::New => tags.sort_by(|a, b| b.first_question_id.cmp(&a.first_question_id)),
    }
    Ok(tags)
}

/// Tags whose name contains `w`, case-insensitively.
pub async fn search(db: &Database, w: &str) -> Result<Vec<TagEntry>, DbError> {
    let needle = w.trim().to_lowercase();
    let mut tags = entries(db).await?;
    tags.retain(|t| t.tag_name.to_lowercase().contains(&needle));
    tags.sort_by(|a, b| a.tag_name.cmp(&b.tag_name));
    Ok(tags)
}
