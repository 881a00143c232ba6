use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AlmanacError, Result};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Identifies a space, the unit of ownership for sources and conversations.
    SpaceId
);
define_id!(SourceId);
define_id!(ConversationId);
define_id!(MessageId);
define_id!(SummaryModelId);

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Whole seconds elapsed since this timestamp (zero if in the future).
    pub fn age_secs(&self) -> u64 {
        let elapsed = Timestamp::now().0 - self.0;
        (elapsed.max(0) / 1000) as u64
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Classification of a knowledge artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Meeting,
    VoiceNote,
    Document,
    Upload,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Meeting => "meeting",
            Self::VoiceNote => "voice_note",
            Self::Document => "document",
            Self::Upload => "upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "meeting" => Some(Self::Meeting),
            "voice_note" => Some(Self::VoiceNote),
            "document" => Some(Self::Document),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }

    /// Whether sources of this type may carry an audio payload.
    pub fn accepts_audio(&self) -> bool {
        matches!(self, Self::Meeting | Self::VoiceNote | Self::Upload)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcription sub-state of a source.
///
/// Moves forward only: `pending -> processing -> done | error`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    /// Inline content, no transcription involved.
    #[default]
    None,
    Pending,
    Processing,
    Done,
    Error,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// `done` and `error` accept no further gateway events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// A job is outstanding with the transcription gateway.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload metadata, opaque to the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub key: String,
    pub size: u64,
    pub mime: String,
}

/// A knowledge artifact owned by a space.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub space_id: SpaceId,
    pub name: String,
    pub source_type: SourceType,
    /// Null until the source is ready.
    pub content: Option<String>,
    pub summary: Option<String>,
    pub summary_model_ref: Option<SummaryModelRef>,
    pub summary_tokens: Option<u32>,
    pub transcription_status: TranscriptionStatus,
    pub transcription_provider: Option<String>,
    pub transcription_job_id: Option<String>,
    /// When the current transcription job was submitted; drives the age ceiling.
    pub transcription_submitted_at: Option<Timestamp>,
    pub duration_seconds: Option<f64>,
    pub speakers: Vec<String>,
    pub file: Option<FileMetadata>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Source {
    /// A source is ready once its canonical content exists.
    pub fn is_ready(&self) -> bool {
        self.content.is_some()
    }

    pub fn has_transcript(&self) -> bool {
        self.transcription_status == TranscriptionStatus::Done && self.content.is_some()
    }

    pub fn word_count(&self) -> usize {
        self.content
            .as_deref()
            .map(|c| c.split_whitespace().count())
            .unwrap_or(0)
    }

    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

// =============================================================================
// Summary models
// =============================================================================

/// A section a generated summary may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SummarySection {
    KeyPoints,
    Decisions,
    ActionItems,
    Questions,
}

impl SummarySection {
    pub const ALL: [SummarySection; 4] = [
        SummarySection::KeyPoints,
        SummarySection::Decisions,
        SummarySection::ActionItems,
        SummarySection::Questions,
    ];

    /// JSON key used in the structured summary reply.
    pub fn json_key(&self) -> &'static str {
        match self {
            Self::KeyPoints => "keyPoints",
            Self::Decisions => "decisions",
            Self::ActionItems => "actionItems",
            Self::Questions => "questions",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::KeyPoints => "Key points",
            Self::Decisions => "Decisions",
            Self::ActionItems => "Action items",
            Self::Questions => "Open questions",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Professional,
    Neutral,
    Casual,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Neutral => "neutral",
            Self::Casual => "casual",
        }
    }
}

/// How much detail a summary carries, from 1 (brief) to 3 (thorough).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DetailLevel {
    Brief,
    #[default]
    Standard,
    Thorough,
}

impl DetailLevel {
    pub fn level(&self) -> u8 {
        match self {
            Self::Brief => 1,
            Self::Standard => 2,
            Self::Thorough => 3,
        }
    }

    /// Upper bound on bullet items per section at this level.
    pub fn max_items(&self) -> usize {
        match self {
            Self::Brief => 3,
            Self::Standard => 5,
            Self::Thorough => 10,
        }
    }
}

impl TryFrom<u8> for DetailLevel {
    type Error = AlmanacError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Brief),
            2 => Ok(Self::Standard),
            3 => Ok(Self::Thorough),
            other => Err(AlmanacError::Validation(format!(
                "detail level must be between 1 and 3, got {}",
                other
            ))),
        }
    }
}

impl From<DetailLevel> for u8 {
    fn from(level: DetailLevel) -> u8 {
        level.level()
    }
}

/// Immutable summary generation settings.
///
/// Fields are private so a configuration captured by a generated summary
/// cannot be edited afterwards; editing a model means building a new value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    sections: Vec<SummarySection>,
    tone: Tone,
    detail_level: DetailLevel,
    custom_instructions: Option<String>,
}

impl SummaryConfig {
    /// Build a configuration. Sections are de-duplicated in the canonical
    /// order; an empty section list is rejected.
    pub fn new(
        sections: &[SummarySection],
        tone: Tone,
        detail_level: DetailLevel,
        custom_instructions: Option<String>,
    ) -> Result<Self> {
        let sections: Vec<SummarySection> = SummarySection::ALL
            .iter()
            .copied()
            .filter(|s| sections.contains(s))
            .collect();
        if sections.is_empty() {
            return Err(AlmanacError::Validation(
                "a summary model needs at least one section".to_string(),
            ));
        }
        let custom_instructions = custom_instructions
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            sections,
            tone,
            detail_level,
            custom_instructions,
        })
    }

    pub fn sections(&self) -> &[SummarySection] {
        &self.sections
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
    }

    pub fn custom_instructions(&self) -> Option<&str> {
        self.custom_instructions.as_deref()
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            sections: SummarySection::ALL.to_vec(),
            tone: Tone::default(),
            detail_level: DetailLevel::default(),
            custom_instructions: None,
        }
    }
}

/// A named summary configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummaryModel {
    pub id: SummaryModelId,
    /// Owning space; shared models are visible from every space.
    pub space_id: SpaceId,
    pub name: String,
    pub config: SummaryConfig,
    pub is_default: bool,
    pub is_shared: bool,
    pub created_at: Timestamp,
}

impl SummaryModel {
    pub fn snapshot(&self) -> SummaryModelRef {
        SummaryModelRef {
            model_id: Some(self.id),
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}

/// What a generated summary was produced with, captured at generation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryModelRef {
    /// `None` for the built-in configuration.
    pub model_id: Option<SummaryModelId>,
    pub name: String,
    pub config: SummaryConfig,
}

impl SummaryModelRef {
    pub const BUILTIN_NAME: &'static str = "built-in";

    pub fn builtin() -> Self {
        Self {
            model_id: None,
            name: Self::BUILTIN_NAME.to_string(),
            config: SummaryConfig::default(),
        }
    }
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub space_id: SpaceId,
    /// Preview of the first user message, cached for listing.
    pub first_message: Option<String>,
    pub message_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Provenance of a chat answer: one source excerpt it was grounded on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    #[serde(rename = "sourceId")]
    pub source_id: SourceId,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(rename = "extrait")]
    pub excerpt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    /// Empty for user messages.
    pub sources_used: Vec<SourceReference>,
    pub tokens_used: Option<u32>,
    pub created_at: Timestamp,
}
