use serde::{Deserialize, Serialize};
use tidings::{Vote, VoteState};

use crate::{PayloadError, UserId};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient")]
    pub files: Option<Vec<RawFile>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFile {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVote {
    #[serde(default, deserialize_with = "crate::lenient")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: Option<UserId>,
    pub username: String,
    pub avatar: Option<String>,
}

impl Author {
    pub const UNKNOWN_USERNAME: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self {
            id: None,
            username: Self::UNKNOWN_USERNAME.to_string(),
            avatar: None,
        }
    }

    pub fn from_raw(raw: Option<RawUser>) -> Self {
        let Some(raw) = raw else {
            return Self::unknown();
        };
        Self {
            id: raw.id.map(UserId),
            username: raw
                .username
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| Self::UNKNOWN_USERNAME.to_string()),
            avatar: raw
                .files
                .and_then(|files| files.into_iter().find_map(|file| file.filename)),
        }
    }

    /// Letter shown in place of a missing avatar.
    pub fn initial(&self) -> char {
        self.username
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
}

impl Attachment {
    const IMAGE_EXTENSIONS: [&'static str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
    const PREVIEWABLE_EXTENSIONS: [&'static str; 2] = ["txt", "pdf"];

    fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn is_image(&self) -> bool {
        self.extension()
            .is_some_and(|ext| Self::IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    pub fn is_previewable(&self) -> bool {
        self.extension()
            .is_some_and(|ext| Self::PREVIEWABLE_EXTENSIONS.contains(&ext.as_str()))
    }
}

pub(crate) fn attachments(files: Option<Vec<RawFile>>) -> Vec<Attachment> {
    files
        .unwrap_or_default()
        .into_iter()
        .filter_map(|file| file.filename)
        .map(|filename| Attachment { filename })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteRecord {
    pub user_id: Option<UserId>,
    pub vote: Vote,
}

impl TryFrom<RawVote> for VoteRecord {
    type Error = PayloadError;

    fn try_from(raw: RawVote) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: raw.user_id.map(UserId),
            vote: Vote::try_from(raw.value)?,
        })
    }
}

pub(crate) fn vote_records(votes: Option<Vec<RawVote>>) -> Vec<VoteRecord> {
    votes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| {
            VoteRecord::try_from(raw)
                .inspect_err(|e| log::warn!("Skipping vote: {e}"))
                .ok()
        })
        .collect()
}

/// Initial state of a vote control for `me`.
pub fn vote_state(votes: &[VoteRecord], me: Option<UserId>) -> VoteState {
    let me = me.map(Some);
    VoteState::from_votes(votes.iter().map(|v| (v.user_id, v.vote)), me.as_ref())
}
