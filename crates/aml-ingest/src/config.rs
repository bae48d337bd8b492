//! Configuration management
//!
//! Everything is read from the environment (after loading `.env`), with the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{ArithmeticSkill, EntryKind, Requirement};

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/aml";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Ingest Configuration Constants
// ============================================================================

/// Default interval between sweeps for open processes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default number of processes run at the same time.
pub const DEFAULT_MAX_CONCURRENT_PROCESSES: usize = 4;

/// Default wall-clock budget for one process (15 minutes).
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 900;

/// Default lifetime of signed retrieval URLs.
pub const DEFAULT_RETRIEVAL_URL_TTL_MINS: u64 = 10;

/// Default lifetime of signed upload URLs.
pub const DEFAULT_UPLOAD_URL_TTL_SECS: u64 = 300;

/// Default timeout for one HTTP transfer.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_UPLOAD_FOLDER: &str = "upload";
pub const DEFAULT_TEMPLATE_FOLDER: &str = "template";
pub const DEFAULT_TEMPLATE_FILE_NAME: &str = "template.zip";
pub const DEFAULT_MEDIA_PREFIX: &str = "media";
pub const DEFAULT_TENANT_NAME: &str = "Ekstep";

pub const DEFAULT_QUESTIONS_FILE: &str = "questions.csv";
pub const DEFAULT_QUESTION_SETS_FILE: &str = "question_sets.csv";
pub const DEFAULT_CONTENTS_FILE: &str = "contents.csv";

pub const DEFAULT_GRID1_ADD_FIELDS: &[&str] = &["n1", "n2", "grid1_pre_fills_top", "grid1_pre_fills_result"];
pub const DEFAULT_GRID1_SUB_FIELDS: &[&str] = &["n1", "n2", "grid1_pre_fills_top", "grid1_pre_fills_result"];
pub const DEFAULT_GRID1_MULTIPLE_FIELDS: &[&str] = &[
    "n1",
    "n2",
    "grid1_multiply_intermediate_steps_prefills",
    "grid1_pre_fills_result",
];
pub const DEFAULT_GRID1_DIV_FIELDS: &[&str] = &[
    "n1",
    "n2",
    "grid1_div_intermediate_steps_prefills",
    "grid1_pre_fills_quotient",
    "grid1_pre_fills_remainder",
];
pub const DEFAULT_GRID2_FIELDS: &[&str] = &["n1", "n2"];
pub const DEFAULT_MCQ_FIELDS: &[&str] = &["mcq_option_1", "mcq_option_2", "mcq_correct_options"];
pub const DEFAULT_FIB_FIELDS: &[&str] = &["fib_type", "fib_answer"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Expected CSV entry name for each sheet kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetNames {
    pub questions: String,
    pub question_sets: String,
    pub contents: String,
}

impl SheetNames {
    pub fn kind_of(&self, entry_name: &str) -> Option<EntryKind> {
        if entry_name == self.questions {
            Some(EntryKind::Question)
        } else if entry_name == self.question_sets {
            Some(EntryKind::QuestionSet)
        } else if entry_name == self.contents {
            Some(EntryKind::Content)
        } else {
            None
        }
    }
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            questions: DEFAULT_QUESTIONS_FILE.to_string(),
            question_sets: DEFAULT_QUESTION_SETS_FILE.to_string(),
            contents: DEFAULT_CONTENTS_FILE.to_string(),
        }
    }
}

/// Body fields that must be filled for each question shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFields {
    pub grid1_add: Vec<String>,
    pub grid1_sub: Vec<String>,
    pub grid1_multiple: Vec<String>,
    pub grid1_div: Vec<String>,
    pub grid2: Vec<String>,
    pub mcq: Vec<String>,
    pub fib: Vec<String>,
}

impl RequiredFields {
    pub fn for_requirement(&self, requirement: Requirement) -> &[String] {
        match requirement {
            Requirement::Grid1(ArithmeticSkill::Add) => &self.grid1_add,
            Requirement::Grid1(ArithmeticSkill::Subtract) => &self.grid1_sub,
            Requirement::Grid1(ArithmeticSkill::Multiply) => &self.grid1_multiple,
            Requirement::Grid1(ArithmeticSkill::Divide) => &self.grid1_div,
            Requirement::Grid2 => &self.grid2,
            Requirement::Mcq => &self.mcq,
            Requirement::Fib => &self.fib,
        }
    }

    fn from_env() -> Self {
        Self {
            grid1_add: env_list("INGEST_GRID1_ADD_FIELDS", DEFAULT_GRID1_ADD_FIELDS),
            grid1_sub: env_list("INGEST_GRID1_SUB_FIELDS", DEFAULT_GRID1_SUB_FIELDS),
            grid1_multiple: env_list("INGEST_GRID1_MULTIPLE_FIELDS", DEFAULT_GRID1_MULTIPLE_FIELDS),
            grid1_div: env_list("INGEST_GRID1_DIV_FIELDS", DEFAULT_GRID1_DIV_FIELDS),
            grid2: env_list("INGEST_GRID2_FIELDS", DEFAULT_GRID2_FIELDS),
            mcq: env_list("INGEST_MCQ_FIELDS", DEFAULT_MCQ_FIELDS),
            fib: env_list("INGEST_FIB_FIELDS", DEFAULT_FIB_FIELDS),
        }
    }
}

impl Default for RequiredFields {
    fn default() -> Self {
        Self {
            grid1_add: owned(DEFAULT_GRID1_ADD_FIELDS),
            grid1_sub: owned(DEFAULT_GRID1_SUB_FIELDS),
            grid1_multiple: owned(DEFAULT_GRID1_MULTIPLE_FIELDS),
            grid1_div: owned(DEFAULT_GRID1_DIV_FIELDS),
            grid2: owned(DEFAULT_GRID2_FIELDS),
            mcq: owned(DEFAULT_MCQ_FIELDS),
            fib: owned(DEFAULT_FIB_FIELDS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub poll_interval_secs: u64,
    pub max_concurrent_processes: usize,
    pub process_timeout_secs: u64,
    pub retrieval_url_ttl_mins: u64,
    pub upload_url_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub upload_folder: String,
    pub template_folder: String,
    pub template_file_name: String,
    pub media_prefix: String,
    pub tenant_name: String,
    /// File names allowed at the archive root.
    pub csv_file_names: Vec<String>,
    pub sheets: SheetNames,
    pub required_fields: RequiredFields,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let sheets = SheetNames {
            questions: env_string("INGEST_QUESTIONS_FILE", DEFAULT_QUESTIONS_FILE),
            question_sets: env_string("INGEST_QUESTION_SETS_FILE", DEFAULT_QUESTION_SETS_FILE),
            contents: env_string("INGEST_CONTENTS_FILE", DEFAULT_CONTENTS_FILE),
        };
        let default_names = [
            sheets.questions.as_str(),
            sheets.question_sets.as_str(),
            sheets.contents.as_str(),
        ];

        Self {
            poll_interval_secs: env_or("INGEST_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            max_concurrent_processes: env_or(
                "INGEST_MAX_CONCURRENT_PROCESSES",
                DEFAULT_MAX_CONCURRENT_PROCESSES,
            ),
            process_timeout_secs: env_or("INGEST_PROCESS_TIMEOUT_SECS", DEFAULT_PROCESS_TIMEOUT_SECS),
            retrieval_url_ttl_mins: env_or("INGEST_RETRIEVAL_URL_TTL_MINS", DEFAULT_RETRIEVAL_URL_TTL_MINS),
            upload_url_ttl_secs: env_or("INGEST_UPLOAD_URL_TTL_SECS", DEFAULT_UPLOAD_URL_TTL_SECS),
            http_timeout_secs: env_or("INGEST_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            upload_folder: env_string("INGEST_UPLOAD_FOLDER", DEFAULT_UPLOAD_FOLDER),
            template_folder: env_string("INGEST_TEMPLATE_FOLDER", DEFAULT_TEMPLATE_FOLDER),
            template_file_name: env_string("INGEST_TEMPLATE_FILE", DEFAULT_TEMPLATE_FILE_NAME),
            media_prefix: env_string("INGEST_MEDIA_PREFIX", DEFAULT_MEDIA_PREFIX),
            tenant_name: env_string("INGEST_TENANT_NAME", DEFAULT_TENANT_NAME),
            csv_file_names: env_list("INGEST_CSV_FILE_NAMES", &default_names),
            sheets,
            required_fields: RequiredFields::from_env(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn retrieval_url_ttl(&self) -> Duration {
        Duration::from_secs(self.retrieval_url_ttl_mins * 60)
    }

    pub fn upload_url_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_url_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Storage folder holding one process's upload.
    pub fn upload_folder_for(&self, process_id: &str) -> String {
        format!("{}/{}", self.upload_folder.trim_end_matches('/'), process_id)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("Ingest poll interval must be greater than 0");
        }

        if self.max_concurrent_processes == 0 {
            anyhow::bail!("Ingest max_concurrent_processes must be greater than 0");
        }

        if self.process_timeout_secs == 0 {
            anyhow::bail!("Ingest process timeout must be greater than 0");
        }

        if self.csv_file_names.is_empty() {
            anyhow::bail!("At least one expected CSV file name must be configured");
        }

        for sheet in [&self.sheets.questions, &self.sheets.question_sets, &self.sheets.contents] {
            if !self.csv_file_names.contains(sheet) {
                tracing::warn!(sheet = %sheet, "Sheet name is not in the expected CSV file names");
            }
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        let sheets = SheetNames::default();
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_concurrent_processes: DEFAULT_MAX_CONCURRENT_PROCESSES,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            retrieval_url_ttl_mins: DEFAULT_RETRIEVAL_URL_TTL_MINS,
            upload_url_ttl_secs: DEFAULT_UPLOAD_URL_TTL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
            template_folder: DEFAULT_TEMPLATE_FOLDER.to_string(),
            template_file_name: DEFAULT_TEMPLATE_FILE_NAME.to_string(),
            media_prefix: DEFAULT_MEDIA_PREFIX.to_string(),
            tenant_name: DEFAULT_TENANT_NAME.to_string(),
            csv_file_names: vec![
                sheets.questions.clone(),
                sheets.question_sets.clone(),
                sheets.contents.clone(),
            ],
            sheets,
            required_fields: RequiredFields::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            ingest: IngestConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.ingest.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            ingest: IngestConfig::default(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(value) => parse_list(&value),
        Err(_) => owned(default),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
